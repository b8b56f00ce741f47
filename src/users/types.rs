use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display metadata delivered by the chat transport on first contact.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub joined_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_deserializes_with_optional_fields() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"user_id": 42, "username": "alice"}"#).unwrap();

        assert_eq!(profile.user_id, 42);
        assert_eq!(profile.username.as_deref(), Some("alice"));
        assert!(profile.first_name.is_none());
    }
}
