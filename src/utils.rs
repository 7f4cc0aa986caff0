//! Utility functions for the listening-room service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique lobby ID
pub fn generate_lobby_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique user ID for a live connection
pub fn generate_user_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_lobby_id();
        let id2 = generate_lobby_id();
        assert_ne!(id1, id2);

        let user1 = generate_user_id();
        let user2 = generate_user_id();
        assert_ne!(user1, user2);
    }
}
