//! Challenge templates, their time-boxed plannings and comments.
mod catalog;
mod comment;

pub use catalog::*;
pub use comment::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{CommentId, PlanningId, TemplateId, UserId};

/// Recurrence tag of a planning.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "frequency", rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
}

/// Reusable definition of a challenge and its reward.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeTemplate {
    pub id: TemplateId,
    pub title: String,
    pub description: String,
    pub points: i64,
    pub co2_savings_points: f64,
    pub photo_required: bool,
    pub fun_fact: Option<String>,
    pub why_important: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A template activated for a time window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Planning {
    pub id: PlanningId,
    pub template_id: TemplateId,
    pub frequency: Frequency,
    pub created_at: DateTime<Utc>,
    /// `None` means open-ended.
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Planning {
    /// Active planning of `template`, starting at `now`.
    pub fn new(
        template_id: TemplateId,
        frequency: Frequency,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: PlanningId::generate(),
            template_id,
            frequency,
            created_at: now,
            expires_at,
            is_active: true,
        }
    }

    /// Active and not expired. The expiry instant itself is still live.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires_at| expires_at >= now)
    }
}

/// Comment left on a planning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub planning_id: PlanningId,
    pub user_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
