mod builder;
mod service;

pub use builder::*;
pub use service::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{BadgeId, DepartmentId, UserId};

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
    /// `None` only for administrators.
    pub department_id: Option<DepartmentId>,
    #[serde(skip)]
    pub token: String,
    pub total_points: i64,
    pub total_co2_savings_points: f64,
    pub collected_badges: Vec<BadgeId>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Lower-case and trim a username or an email.
pub fn normalize(login: &str) -> String {
    login.trim().to_lowercase()
}
