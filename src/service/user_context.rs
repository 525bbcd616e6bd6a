//! Caller identity handed over by the authentication collaborator

use serde::{Deserialize, Serialize};

/// Request context of an authenticated caller
/// This struct makes it easy to add new fields without changing function signatures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserContext {
    /// User ID
    pub user_id: String,
}

impl UserContext {
    pub fn new(user_id: String) -> Self {
        Self { user_id }
    }
}
