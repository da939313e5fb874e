use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::sync::broadcast;

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id")]
pub enum Target {
    User(u64),
    Department(u64),
    Admins,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
pub enum NotificationKind {
    TaskAssigned,
    RequestSubmitted,
    RequestApproved,
    RequestRejected,
    RequestAutoRejected,
    Announcement,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub target: Target,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub timestamp: NaiveDateTime,
}

impl Notification {
    pub fn new(
        target: Target,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target,
            kind,
            title: title.into(),
            message: message.into(),
            link: None,
            timestamp: Local::now().naive_local(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Identity of a connected listener.
#[derive(Debug, Clone, Copy)]
pub struct Recipient {
    pub user_id: u64,
    pub department_id: Option<u64>,
    pub is_admin: bool,
}

impl Recipient {
    pub fn accepts(&self, notification: &Notification) -> bool {
        match notification.target {
            Target::User(id) => id == self.user_id,
            Target::Department(id) => self.department_id == Some(id),
            Target::Admins => self.is_admin,
            Target::All => true,
        }
    }
}

/// In-process fan-out hub. Every subscriber sees every notification and
/// filters with [`Recipient::accepts`].
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notification: Notification) {
        tracing::debug!(
            kind = %notification.kind,
            target = ?notification.target,
            "Publishing notification"
        );
        // no listeners is not an error
        let _ = self.sender.send(notification);
    }

    pub fn notify_user(&self, user_id: u64, kind: NotificationKind, title: &str, message: impl Into<String>) {
        self.publish(Notification::new(Target::User(user_id), kind, title, message));
    }

    pub fn notify_department(
        &self,
        department_id: u64,
        kind: NotificationKind,
        title: &str,
        message: impl Into<String>,
    ) {
        self.publish(Notification::new(Target::Department(department_id), kind, title, message));
    }

    pub fn notify_admins(&self, kind: NotificationKind, title: &str, message: impl Into<String>) {
        self.publish(Notification::new(Target::Admins, kind, title, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff(user_id: u64, department_id: Option<u64>) -> Recipient {
        Recipient { user_id, department_id, is_admin: false }
    }

    #[test]
    fn routes_by_target() {
        let n = |t| Notification::new(t, NotificationKind::Announcement, "t", "m");
        let alice = staff(1, Some(10));
        let admin = Recipient { user_id: 2, department_id: None, is_admin: true };

        assert!(alice.accepts(&n(Target::User(1))));
        assert!(!alice.accepts(&n(Target::User(2))));
        assert!(alice.accepts(&n(Target::Department(10))));
        assert!(!admin.accepts(&n(Target::Department(10))));
        assert!(admin.accepts(&n(Target::Admins)));
        assert!(!alice.accepts(&n(Target::Admins)));
        assert!(alice.accepts(&n(Target::All)));
    }

    #[actix_web::test]
    async fn subscribers_receive_published_notifications() {
        let hub = NotificationHub::new(8);
        let mut rx = hub.subscribe();

        hub.notify_user(5, NotificationKind::RequestApproved, "Approved", "Your leave was approved");

        let got = rx.recv().await.unwrap();
        assert_eq!(got.target, Target::User(5));
        assert_eq!(got.kind, NotificationKind::RequestApproved);
        assert_eq!(got.message, "Your leave was approved");
    }

    #[test]
    fn publishing_without_listeners_is_fine() {
        let hub = NotificationHub::new(1);
        hub.notify_admins(NotificationKind::RequestSubmitted, "New request", "x");
    }

    #[test]
    fn target_serializes_tagged() {
        let v = serde_json::to_value(Target::Department(4)).unwrap();
        assert_eq!(v, serde_json::json!({"type": "Department", "id": 4}));
    }
}
