use actix_web::{FromRequest, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};
use serde_json::Value;
use sqlx::MySqlPool;

/// Caller network details captured once per request for audit and login rows.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_request(req: &HttpRequest) -> Self {
        let ip_address = req.connection_info().realip_remote_addr().map(|addr| {
            // strip the port from "ip:port" but leave bare IPv6 addresses alone
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host.to_string(),
                _ => addr.to_string(),
            }
        });
        let user_agent = req
            .headers()
            .get("User-Agent")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.chars().take(500).collect());

        Self { ip_address, user_agent }
    }
}

impl FromRequest for RequestMeta {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(RequestMeta::from_request(req)))
    }
}

/// One row of `audit_logs`, assembled with builder-style setters.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: Option<u64>,
    pub action: String,
    pub entity_name: String,
    pub entity_id: Option<u64>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub additional_info: Option<Value>,
    pub description: Option<String>,
    pub is_success: bool,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, entity_name: impl Into<String>) -> Self {
        Self {
            user_id: None,
            action: action.into(),
            entity_name: entity_name.into(),
            entity_id: None,
            old_values: None,
            new_values: None,
            additional_info: None,
            description: None,
            is_success: true,
        }
    }

    pub fn by(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn entity(mut self, entity_id: u64) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn old(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// `VIEW` record for a sensitive read.
pub fn view_entry(
    user_id: u64,
    entity_name: &str,
    entity_id: Option<u64>,
    description: impl Into<String>,
) -> AuditEntry {
    let mut entry = AuditEntry::new("VIEW", entity_name).by(user_id).describe(description);
    entry.entity_id = entity_id;
    entry
}

/// `LOGIN` becomes `LOGIN_FAILED`.
pub fn failed_action(action: &str) -> String {
    format!("{action}_FAILED")
}

/// Writes audit records. Failures are logged and swallowed so auditing never
/// breaks the operation being audited.
pub struct AuditHelper<'a> {
    pool: &'a MySqlPool,
    meta: &'a RequestMeta,
}

impl<'a> AuditHelper<'a> {
    pub fn new(pool: &'a MySqlPool, meta: &'a RequestMeta) -> Self {
        Self { pool, meta }
    }

    pub async fn log(&self, entry: AuditEntry) {
        write(self.pool, Some(self.meta), entry).await;
    }

    pub async fn log_detailed(&self, entry: AuditEntry, additional_info: Value) {
        let mut entry = entry;
        entry.additional_info = Some(additional_info);
        self.log(entry).await;
    }

    pub async fn log_failed_attempt(
        &self,
        user_id: Option<u64>,
        action: &str,
        entity_name: &str,
        reason: &str,
    ) {
        let mut entry = AuditEntry::new(failed_action(action), entity_name).describe(reason);
        entry.user_id = user_id;
        entry.is_success = false;
        self.log(entry).await;
    }

    pub async fn log_view(
        &self,
        user_id: u64,
        entity_name: &str,
        entity_id: Option<u64>,
        description: impl Into<String>,
    ) {
        self.log(view_entry(user_id, entity_name, entity_id, description)).await;
    }
}

/// Inserts an audit row; `meta` is `None` for background jobs.
pub async fn write(pool: &MySqlPool, meta: Option<&RequestMeta>, entry: AuditEntry) {
    let to_text = |v: &Option<Value>| v.as_ref().map(|v| v.to_string());

    let result = sqlx::query(
        r#"
        INSERT INTO audit_logs
            (user_id, action, entity_name, entity_id, old_values, new_values,
             additional_info, description, ip_address, user_agent, is_success, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NOW())
        "#,
    )
    .bind(entry.user_id)
    .bind(&entry.action)
    .bind(&entry.entity_name)
    .bind(entry.entity_id)
    .bind(to_text(&entry.old_values))
    .bind(to_text(&entry.new_values))
    .bind(to_text(&entry.additional_info))
    .bind(&entry.description)
    .bind(meta.and_then(|m| m.ip_address.clone()))
    .bind(meta.and_then(|m| m.user_agent.clone()))
    .bind(entry.is_success)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!(
            error = %e,
            action = %entry.action,
            entity = %entry.entity_name,
            "Failed to write audit log"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use serde_json::json;

    #[test]
    fn view_entries_carry_reader_and_target() {
        let entry = view_entry(1, "UserTask", Some(42), "Viewed tasks of user 42");
        assert_eq!(entry.action, "VIEW");
        assert_eq!(entry.entity_name, "UserTask");
        assert_eq!(entry.user_id, Some(1));
        assert_eq!(entry.entity_id, Some(42));
        assert!(entry.is_success);

        let listing = view_entry(1, "AuditLog", None, "Viewed audit logs");
        assert_eq!(listing.entity_id, None);
        assert_eq!(listing.description.as_deref(), Some("Viewed audit logs"));
    }

    #[test]
    fn failed_actions_are_suffixed() {
        assert_eq!(failed_action("LOGIN"), "LOGIN_FAILED");
    }

    #[test]
    fn builder_sets_fields() {
        let entry = AuditEntry::new("UPDATE", "Task")
            .by(3)
            .entity(11)
            .old(json!({"priority": "Low"}))
            .new_values(json!({"priority": "High"}))
            .describe("Priority raised");

        assert_eq!(entry.user_id, Some(3));
        assert_eq!(entry.entity_id, Some(11));
        assert_eq!(entry.new_values.unwrap()["priority"], "High");
        assert!(entry.is_success);
    }

    #[test]
    fn meta_strips_port_and_reads_user_agent() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.7:52100".parse().unwrap())
            .insert_header(("User-Agent", "curl/8.0"))
            .to_http_request();
        let meta = RequestMeta::from_request(&req);

        assert_eq!(meta.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
    }
}
