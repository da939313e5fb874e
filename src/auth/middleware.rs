use crate::auth::auth::{AuthUser, extract_token};
use crate::auth::jwt::verify_token;
use crate::config::Config;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let token = match extract_token(req.request()) {
        Some(t) => t,
        None => {
            let resp = HttpResponse::Unauthorized().json(json!({"message": "Missing bearer token"}));
            return Ok(req.into_response(resp.map_into_boxed_body()));
        }
    };

    let claims = match verify_token(&token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, path = %req.path(), "Rejected token");
            let resp = HttpResponse::Unauthorized().json(json!({"message": "Invalid or expired token"}));
            return Ok(req.into_response(resp.map_into_boxed_body()));
        }
    };

    let auth_user = match AuthUser::from_claims(claims) {
        Ok(user) => user,
        Err(e) => {
            let resp = HttpResponse::Unauthorized().json(json!({"message": e.to_string()}));
            return Ok(req.into_response(resp.map_into_boxed_body()));
        }
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{TokenSubject, generate_access_token};
    use actix_web::{App, middleware::from_fn, test, web};

    async fn ok(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(user.username)
    }

    #[actix_web::test]
    async fn guards_scope() {
        let config = Config::for_tests();
        let token = generate_access_token(
            &TokenSubject { user_id: 1, username: "admin".into(), role: 1, department_id: None },
            &config.jwt_secret,
            60,
        )
        .unwrap();

        let app = test::init_service(
            App::new().app_data(Data::new(config)).service(
                web::scope("/api")
                    .wrap(from_fn(auth_middleware))
                    .route("/ping", web::get().to(ok)),
            ),
        )
        .await;

        let anonymous = test::TestRequest::get().uri("/api/ping").to_request();
        assert_eq!(test::call_service(&app, anonymous).await.status(), 401);

        let forged = test::TestRequest::get()
            .uri("/api/ping")
            .insert_header(("Authorization", "Bearer not.a.token"))
            .to_request();
        assert_eq!(test::call_service(&app, forged).await.status(), 401);

        let authed = test::TestRequest::get()
            .uri("/api/ping")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        assert_eq!(test::call_and_read_body(&app, authed).await, "admin");
    }
}
