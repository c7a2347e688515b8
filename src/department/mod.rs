mod service;

pub use service::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::DepartmentId;

/// Department as saved on database.
///
/// Totals are derived: they equal the sums over the members' totals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub total_points: i64,
    pub total_co2_savings_points: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Department {
    /// A new, inactive department with empty totals.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: DepartmentId::generate(),
            name: name.into(),
            total_points: 0,
            total_co2_savings_points: 0.0,
            is_active: false,
            created_at: Utc::now(),
        }
    }
}
