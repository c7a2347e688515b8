//! Points reconciliation.
//!
//! A submission event moves the user's totals with an atomic in-store
//! increment, then rebuilds the owning department's totals from its members.
//! [`crate::department::Directory::recalculate_all`] runs the same recompute
//! for every department.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ServerError;
use crate::database::Store;
use crate::error::Result;
use crate::id::{PlanningId, UserId};
use crate::user::User;

/// Way a reward moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Credit => write!(f, "credit"),
            Direction::Debit => write!(f, "debit"),
        }
    }
}

/// Reward of a planning, read from its template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reward {
    pub points: i64,
    pub co2: f64,
    pub photo_required: bool,
}

impl Reward {
    /// Signed deltas for `direction`.
    pub fn delta(&self, direction: Direction) -> (i64, f64) {
        match direction {
            Direction::Credit => (self.points, self.co2),
            Direction::Debit => (-self.points, -self.co2),
        }
    }
}

/// Post-update snapshot returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(rename = "userPoints")]
    pub user_points: i64,
    #[serde(rename = "userCO2")]
    pub user_co2: f64,
    /// `None` for users without department.
    #[serde(rename = "deptPoints")]
    pub dept_points: Option<i64>,
    #[serde(rename = "deptCO2")]
    pub dept_co2: Option<f64>,
}

/// Points reconciliation engine.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
}

impl Reconciler {
    /// Create a new [`Reconciler`].
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve the reward behind a planning.
    ///
    /// A missing planning or template is a data-integrity fault.
    pub async fn reward(&self, planning: &PlanningId) -> Result<Reward> {
        let planning = self
            .store
            .find_planning(planning)
            .await?
            .ok_or(ServerError::not_found("planning"))?;

        let template = match self.store.find_template(&planning.template_id).await? {
            Some(template) => template,
            None => {
                tracing::error!(
                    planning_id = %planning.id,
                    template_id = %planning.template_id,
                    "planning references a missing template"
                );
                return Err(ServerError::not_found("challenge template"));
            },
        };

        Ok(Reward {
            points: template.points,
            co2: template.co2_savings_points,
            photo_required: template.photo_required,
        })
    }

    /// Propagate the reward of `planning` to `user` and their department.
    ///
    /// Nothing is mutated when the reward cannot be resolved.
    pub async fn apply(
        &self,
        user: &UserId,
        planning: &PlanningId,
        direction: Direction,
    ) -> Result<Totals> {
        let reward = self.reward(planning).await?;
        self.apply_reward(user, planning, &reward, direction).await
    }

    /// Same as [`Reconciler::apply`] with an already resolved reward.
    pub async fn apply_reward(
        &self,
        user: &UserId,
        planning: &PlanningId,
        reward: &Reward,
        direction: Direction,
    ) -> Result<Totals> {
        let updated = self.move_user(user, planning, reward, direction).await?;
        self.settle_department(&updated, planning, direction).await
    }

    /// First half: atomic increment of the user's totals.
    ///
    /// On error nothing was applied.
    pub async fn move_user(
        &self,
        user: &UserId,
        planning: &PlanningId,
        reward: &Reward,
        direction: Direction,
    ) -> Result<User> {
        let (points, co2) = reward.delta(direction);

        let failure = match self.store.increment_user_totals(user, points, co2).await {
            Ok(Some(updated)) => return Ok(updated),
            Ok(None) => ServerError::not_found("user"),
            Err(err) => err,
        };

        tracing::error!(
            user_id = %user,
            planning_id = %planning,
            %direction,
            stage = "user",
            error = %failure,
            "reconciliation failed, nothing applied"
        );
        metrics::counter!("reconciliation_failures_total", "stage" => "user").increment(1);

        Err(failure)
    }

    /// Second half: rebuild the department of an already moved user.
    pub async fn settle_department(
        &self,
        updated: &User,
        planning: &PlanningId,
        direction: Direction,
    ) -> Result<Totals> {
        let Some(department) = updated.department_id else {
            return Ok(Totals {
                user_points: updated.total_points,
                user_co2: updated.total_co2_savings_points,
                dept_points: None,
                dept_co2: None,
            });
        };

        // User totals are committed from here on: any failure leaves the
        // department stale until the repair path runs.
        let failure = match self.store.recompute_department(&department).await {
            Ok(Some(department)) => {
                return Ok(Totals {
                    user_points: updated.total_points,
                    user_co2: updated.total_co2_savings_points,
                    dept_points: Some(department.total_points),
                    dept_co2: Some(department.total_co2_savings_points),
                });
            },
            Ok(None) => ServerError::not_found("department"),
            Err(err) => err,
        };

        tracing::error!(
            user_id = %updated.id,
            planning_id = %planning,
            department_id = %department,
            %direction,
            stage = "department",
            error = %failure,
            "partial reconciliation: user totals updated, department totals stale"
        );
        metrics::counter!("reconciliation_failures_total", "stage" => "department")
            .increment(1);

        Err(failure)
    }
}
