use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
pub enum Role {
    Admin = 1,
    Staff = 2,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Staff),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Landing page for the role after a successful login.
    pub fn landing_path(self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Staff => "/staff/dashboard",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn ids_round_trip() {
        assert_eq!(Role::from_id(Role::Admin.id()), Some(Role::Admin));
        assert_eq!(Role::from_id(Role::Staff.id()), Some(Role::Staff));
        assert_eq!(Role::from_id(3), None);
    }

    #[test]
    fn parses_role_names() {
        assert_eq!(Role::from_str("Admin").unwrap(), Role::Admin);
        assert!(Role::from_str("Manager").is_err());
        assert_eq!(Role::Staff.to_string(), "Staff");
    }

    #[test]
    fn landing_paths_follow_role() {
        assert_eq!(Role::Admin.landing_path(), "/admin/dashboard");
        assert_eq!(Role::Staff.landing_path(), "/staff/dashboard");
    }
}
