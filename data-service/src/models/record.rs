use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Record {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Record {
    pub fn new(name: String, email: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            role,
            created_at: Utc::now(),
        }
    }

    /// Key under which the email is indexed for uniqueness checks.
    pub fn email_key(&self) -> String {
        normalize_email(&self.email)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
