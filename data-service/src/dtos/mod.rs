use crate::models::{Record, Role};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRecordRequest {
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "not_blank"), email)]
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
}

fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("required"));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub data: Vec<Record>,
    pub total: usize,
}

impl From<Vec<Record>> for ListResponse {
    fn from(data: Vec<Record>) -> Self {
        Self {
            total: data.len(),
            data,
        }
    }
}
