use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::models::{Claims, TokenType};

/// Identity carried in both token kinds.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: u64,
    pub username: String,
    pub role: u8,
    pub department_id: Option<u64>,
}

impl From<&Claims> for TokenSubject {
    fn from(c: &Claims) -> Self {
        Self {
            user_id: c.user_id,
            username: c.sub.clone(),
            role: c.role,
            department_id: c.department_id,
        }
    }
}

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

fn generate(subject: &TokenSubject, token_type: TokenType, secret: &str, ttl: usize) -> Result<(String, Claims), Error> {
    let claims = Claims {
        user_id: subject.user_id,
        sub: subject.username.clone(),
        role: subject.role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        department_id: subject.department_id,
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?;
    Ok((token, claims))
}

pub fn generate_access_token(subject: &TokenSubject, secret: &str, ttl: usize) -> Result<String, Error> {
    generate(subject, TokenType::Access, secret, ttl).map(|(token, _)| token)
}

pub fn generate_refresh_token(subject: &TokenSubject, secret: &str, ttl: usize) -> Result<(String, Claims), Error> {
    generate(subject, TokenType::Refresh, secret, ttl)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| e.to_string())
}

/// Verifies `token` and insists on a refresh token.
pub fn verify_refresh_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = verify_token(token, secret)?;
    if claims.token_type != TokenType::Refresh {
        return Err("not a refresh token".into());
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: 42,
            username: "jdoe".into(),
            role: 2,
            department_id: Some(3),
        }
    }

    #[test]
    fn access_token_verifies() {
        let token = generate_access_token(&subject(), "secret", 60).unwrap();
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "jdoe");
        assert_eq!(claims.department_id, Some(3));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_tokens_have_unique_jti() {
        let (_, a) = generate_refresh_token(&subject(), "secret", 60).unwrap();
        let (_, b) = generate_refresh_token(&subject(), "secret", 60).unwrap();
        assert_eq!(a.token_type, TokenType::Refresh);
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn wrong_secret_fails() {
        let token = generate_access_token(&subject(), "secret", 60).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn rotation_issues_a_new_jti_for_the_same_subject() {
        let (token, first) = generate_refresh_token(&subject(), "secret", 60).unwrap();
        let verified = verify_refresh_token(&token, "secret").unwrap();
        assert_eq!(verified.jti, first.jti);

        let (rotated, second) = generate_refresh_token(&TokenSubject::from(&verified), "secret", 60).unwrap();
        assert_ne!(second.jti, first.jti);
        assert_eq!(verify_refresh_token(&rotated, "secret").unwrap().user_id, 42);
    }

    #[test]
    fn access_tokens_cannot_refresh() {
        let token = generate_access_token(&subject(), "secret", 60).unwrap();
        assert!(verify_refresh_token(&token, "secret").is_err());
    }
}
