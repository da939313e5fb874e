use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::role::Role;
use crate::models::{Claims, TokenType};
use crate::services::notifier::Recipient;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
    pub department_id: Option<u64>,
}

/// Bearer token from the `Authorization` header, or the `access_token` query
/// parameter for clients (EventSource) that cannot set headers.
pub fn extract_token(req: &HttpRequest) -> Option<String> {
    if let Some(header) = req.headers().get("Authorization").and_then(|h| h.to_str().ok()) {
        return header.strip_prefix("Bearer ").map(|t| t.trim().to_string());
    }
    req.query_string()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == "access_token")
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> Result<Self, ApiError> {
        if claims.token_type != TokenType::Access {
            return Err(ApiError::Unauthorized("Access token required".into()));
        }
        let role = Role::from_id(claims.role).ok_or_else(|| ApiError::Unauthorized("Invalid role".into()))?;
        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            department_id: claims.department_id,
        })
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin only"))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn recipient(&self) -> Recipient {
        Recipient {
            user_id: self.user_id,
            department_id: self.department_id,
            is_admin: self.is_admin(),
        }
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let Some(token) = extract_token(req) else {
            return ready(Err(ApiError::Unauthorized("Missing token".into()).into()));
        };

        let Some(config) = req.app_data::<Data<Config>>() else {
            return ready(Err(ApiError::Internal.into()));
        };

        let result = verify_token(&token, &config.jwt_secret)
            .map_err(|_| ApiError::Unauthorized("Invalid token".into()))
            .and_then(AuthUser::from_claims)
            .map_err(actix_web::Error::from);

        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{TokenSubject, generate_access_token, generate_refresh_token};
    use actix_web::{App, HttpResponse, test, web};

    fn subject(role: u8) -> TokenSubject {
        TokenSubject { user_id: 5, username: "amy".into(), role, department_id: Some(2) }
    }

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(format!("{}:{}", user.username, user.role))
    }

    #[actix_web::test]
    async fn extracts_user_from_bearer_header() {
        let config = Config::for_tests();
        let token = generate_access_token(&subject(1), &config.jwt_secret, 60).unwrap();
        let app = test::init_service(
            App::new().app_data(Data::new(config)).route("/me", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "amy:Admin");
    }

    #[actix_web::test]
    async fn accepts_query_token_and_rejects_refresh_tokens() {
        let config = Config::for_tests();
        let access = generate_access_token(&subject(2), &config.jwt_secret, 60).unwrap();
        let (refresh, _) = generate_refresh_token(&subject(2), &config.jwt_secret, 60).unwrap();
        let app = test::init_service(
            App::new().app_data(Data::new(config)).route("/me", web::get().to(whoami)),
        )
        .await;

        let ok = test::TestRequest::get().uri(&format!("/me?access_token={access}")).to_request();
        assert!(test::call_service(&app, ok).await.status().is_success());

        let refused = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request();
        assert_eq!(test::call_service(&app, refused).await.status(), 401);

        let missing = test::TestRequest::get().uri("/me").to_request();
        assert_eq!(test::call_service(&app, missing).await.status(), 401);
    }

    #[::core::prelude::v1::test]
    fn admin_check() {
        let staff = AuthUser { user_id: 1, username: "s".into(), role: Role::Staff, department_id: None };
        assert!(staff.require_admin().is_err());
        assert!(!staff.recipient().is_admin);
    }
}
