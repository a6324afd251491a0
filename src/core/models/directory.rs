use serde::{Deserialize, Serialize};

use super::new_id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub code: String,
}

impl Organization {
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            code: code.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub org_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub role_id: Option<String>,
    /// Marks a mirror account: no fixed role, borrows the sender's.
    pub is_system_persona: bool,
}

impl User {
    pub fn new(org_id: &str, username: &str) -> Self {
        Self {
            id: new_id(),
            org_id: org_id.to_string(),
            username: username.to_string(),
            display_name: None,
            role_id: None,
            is_system_persona: false,
        }
    }

    pub fn with_role(mut self, role_id: &str) -> Self {
        self.role_id = Some(role_id.to_string());
        self
    }

    pub fn mirror(mut self) -> Self {
        self.is_system_persona = true;
        self
    }
}
