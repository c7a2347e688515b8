//! Template and planning lifecycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ServerError;
use crate::challenge::{ChallengeTemplate, Frequency, Planning};
use crate::clock::Clock;
use crate::config::Challenges;
use crate::database::Store;
use crate::error::Result;
use crate::id::{PlanningId, TemplateId, UserId};

pub const DEFAULT_POINTS: i64 = 100;
pub const DEFAULT_CO2_SAVINGS_POINTS: f64 = 0.5;
/// Upper bound of a template's `points`.
pub const MAX_POINTS: i64 = 1_000_000;
/// Upper bound of a template's `co2SavingsPoints`.
pub const MAX_CO2_SAVINGS_POINTS: f64 = 1_000_000.0;
/// Longest activation window of a planning.
pub const MAX_DURATION_DAYS: i64 = 3650;

/// `now + delta`, or [`ServerError::InvalidArgument`] when out of range.
fn shift(
    now: DateTime<Utc>,
    delta: Option<Duration>,
    what: &str,
) -> Result<DateTime<Utc>> {
    delta
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| ServerError::InvalidArgument(format!("{what} is out of range")))
}

/// Fields of a template to create. Absent rewards take fixed defaults.
#[derive(Debug, Clone, Default)]
pub struct NewTemplate {
    pub title: String,
    pub description: Option<String>,
    pub points: Option<i64>,
    pub co2_savings_points: Option<f64>,
    pub photo_required: Option<bool>,
    pub fun_fact: Option<String>,
    pub why_important: Option<String>,
}

/// A live planning joined with its template's display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChallenge {
    pub planning_id: PlanningId,
    pub frequency: Frequency,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub title: String,
    pub description: String,
    pub points: i64,
    pub co2: f64,
    pub photo_required: bool,
    pub fun_fact: Option<String>,
    pub why_important: Option<String>,
}

impl LiveChallenge {
    fn join(planning: &Planning, template: &ChallengeTemplate) -> Self {
        Self {
            planning_id: planning.id,
            frequency: planning.frequency,
            starts_at: planning.created_at,
            ends_at: planning.expires_at,
            title: template.title.clone(),
            description: template.description.clone(),
            points: template.points,
            co2: template.co2_savings_points,
            photo_required: template.photo_required,
            fun_fact: template.fun_fact.clone(),
            why_important: template.why_important.clone(),
        }
    }
}

/// [`LiveChallenge`] annotated for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChallenge {
    #[serde(flatten)]
    pub challenge: LiveChallenge,
    pub done: bool,
}

/// Challenge catalog.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    windows: Challenges,
}

impl Catalog {
    /// Create a new [`Catalog`].
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        windows: Challenges,
    ) -> Self {
        Self {
            store,
            clock,
            windows,
        }
    }

    /// Persist a template.
    pub async fn create_template(
        &self,
        fields: NewTemplate,
    ) -> Result<ChallengeTemplate> {
        let title = fields.title.trim();
        if title.is_empty() {
            return Err(ServerError::InvalidArgument("title is required".into()));
        }

        let points = fields.points.unwrap_or(DEFAULT_POINTS);
        let co2_savings_points = fields
            .co2_savings_points
            .unwrap_or(DEFAULT_CO2_SAVINGS_POINTS);
        if !(0..=MAX_POINTS).contains(&points)
            || !(0.0..=MAX_CO2_SAVINGS_POINTS).contains(&co2_savings_points)
        {
            return Err(ServerError::InvalidArgument(format!(
                "rewards must be between 0 and {MAX_POINTS}"
            )));
        }

        let template = ChallengeTemplate {
            id: TemplateId::generate(),
            title: title.to_owned(),
            description: fields.description.unwrap_or_default(),
            points,
            co2_savings_points,
            photo_required: fields.photo_required.unwrap_or(false),
            fun_fact: fields.fun_fact,
            why_important: fields.why_important,
            created_at: self.clock.now(),
        };
        self.store.insert_template(&template).await?;

        tracing::info!(template_id = %template.id, points, "challenge template created");
        Ok(template)
    }

    /// Activate `template` for `duration_days`, or open-ended.
    pub async fn activate_planning(
        &self,
        template: &TemplateId,
        frequency: Option<Frequency>,
        duration_days: Option<i64>,
    ) -> Result<Planning> {
        let frequency = frequency.ok_or_else(|| {
            ServerError::InvalidArgument("frequency is required".into())
        })?;
        if duration_days.is_some_and(|days| !(1..=MAX_DURATION_DAYS).contains(&days)) {
            return Err(ServerError::InvalidArgument(format!(
                "days must be between 1 and {MAX_DURATION_DAYS}"
            )));
        }

        if self.store.find_template(template).await?.is_none() {
            return Err(ServerError::not_found("challenge template"));
        }

        let now = self.clock.now();
        let expires_at = duration_days
            .map(|days| shift(now, Duration::try_days(days), "days"))
            .transpose()?;
        let planning = Planning::new(*template, frequency, now, expires_at);
        self.store.insert_plannings(std::slice::from_ref(&planning)).await?;

        tracing::info!(planning_id = %planning.id, template_id = %template, "planning activated");
        Ok(planning)
    }

    /// Fan every template out into one daily and one weekly planning.
    pub async fn generate_recurring(&self) -> Result<Vec<Planning>> {
        let templates = self.store.list_templates().await?;
        if templates.is_empty() {
            return Err(ServerError::EmptyCatalog);
        }

        let now = self.clock.now();
        let daily = shift(now, Duration::try_hours(self.windows.daily_hours), "daily window")?;
        let weekly = shift(now, Duration::try_days(self.windows.weekly_days), "weekly window")?;

        let plannings: Vec<Planning> = templates
            .iter()
            .flat_map(|template| {
                [
                    Planning::new(template.id, Frequency::Daily, now, Some(daily)),
                    Planning::new(template.id, Frequency::Weekly, now, Some(weekly)),
                ]
            })
            .collect();
        self.store.insert_plannings(&plannings).await?;

        tracing::info!(
            templates = templates.len(),
            plannings = plannings.len(),
            "recurring plannings generated"
        );
        Ok(plannings)
    }

    /// Live plannings, optionally of one frequency.
    pub async fn list_live(
        &self,
        frequency: Option<Frequency>,
    ) -> Result<Vec<LiveChallenge>> {
        let now = self.clock.now();
        let plannings: Vec<Planning> = self
            .store
            .list_active_plannings()
            .await?
            .into_iter()
            .filter(|planning| planning.is_live_at(now))
            .filter(|planning| frequency.is_none_or(|f| f == planning.frequency))
            .collect();
        if plannings.is_empty() {
            return Ok(Vec::new());
        }

        let templates: HashMap<TemplateId, ChallengeTemplate> = self
            .store
            .list_templates()
            .await?
            .into_iter()
            .map(|template| (template.id, template))
            .collect();

        plannings
            .iter()
            .map(|planning| match templates.get(&planning.template_id) {
                Some(template) => Ok(LiveChallenge::join(planning, template)),
                None => {
                    tracing::error!(
                        planning_id = %planning.id,
                        template_id = %planning.template_id,
                        "planning references a missing template"
                    );
                    Err(ServerError::not_found("challenge template"))
                },
            })
            .collect()
    }

    /// Live plannings with a `done` flag for `user`.
    pub async fn list_live_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<UserChallenge>> {
        let challenges = self.list_live(None).await?;
        let done: HashSet<PlanningId> = self
            .store
            .list_user_submissions(user)
            .await?
            .into_iter()
            .map(|submission| submission.planning_id)
            .collect();

        Ok(challenges
            .into_iter()
            .map(|challenge| UserChallenge {
                done: done.contains(&challenge.planning_id),
                challenge,
            })
            .collect())
    }
}
