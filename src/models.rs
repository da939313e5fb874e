use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "admin")]
    pub username: String,
    #[schema(example = "Admin@123")]
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Admin")]
    pub role: String,
    pub full_name: String,
    /// Landing page for the role.
    #[schema(example = "/admin/dashboard")]
    pub redirect: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshReqDto {
    pub refresh_token: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterReqDto {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "secret1")]
    pub password: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    #[schema(example = "john@tmd.local")]
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub department_id: Option<u64>,
    /// 1 = Admin, 2 = Staff
    #[schema(example = 2)]
    pub role_id: u8,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordReqDto {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    pub department_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
