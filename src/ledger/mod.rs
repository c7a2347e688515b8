//! Submission ledger: at most one submission per (user, planning).
mod reconciliation;

pub use reconciliation::*;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ServerError;
use crate::clock::Clock;
use crate::database::Store;
use crate::error::Result;
use crate::id::{DepartmentId, PlanningId, SubmissionId, UserId};
use crate::user::User;

/// Proof of completion of a planning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub user_id: UserId,
    /// Department of the user when submitting.
    pub department_id: Option<DepartmentId>,
    pub planning_id: PlanningId,
    pub photo_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Result of [`Ledger::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted {
        submission: Submission,
        totals: Totals,
    },
    /// The pair was already recorded; nothing changed.
    AlreadySubmitted,
}

/// Result of [`Ledger::revoke`].
#[derive(Debug, Clone, PartialEq)]
pub enum RevokeOutcome {
    Revoked { totals: Totals },
    /// No submission for the pair; nothing changed.
    NothingToRevoke,
}

/// Submission ledger.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    engine: Reconciler,
}

impl Ledger {
    /// Create a new [`Ledger`].
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: Reconciler::new(Arc::clone(&store)),
            store,
            clock,
        }
    }

    /// Record that `user` completed `planning` and credit the reward.
    ///
    /// The store rejects the second insert of a pair, so concurrent
    /// duplicates credit exactly once. A repeated submit reports
    /// [`SubmitOutcome::AlreadySubmitted`] before any other check.
    pub async fn submit(
        &self,
        user: &User,
        planning: PlanningId,
        photo_url: Option<String>,
    ) -> Result<SubmitOutcome> {
        let reward = self.engine.reward(&planning).await?;

        if self.store.find_submission(&user.id, &planning).await?.is_some() {
            return Ok(already_submitted(user, &planning));
        }

        let photo_url = photo_url.filter(|url| !url.trim().is_empty());
        if reward.photo_required && photo_url.is_none() {
            return Err(ServerError::InvalidArgument(
                "this challenge requires a photo".into(),
            ));
        }

        let submission = Submission {
            id: SubmissionId::generate(),
            user_id: user.id,
            department_id: user.department_id,
            planning_id: planning,
            photo_url,
            submitted_at: self.clock.now(),
        };

        if !self.store.insert_submission(&submission).await? {
            return Ok(already_submitted(user, &planning));
        }

        let updated = match self
            .engine
            .move_user(&user.id, &planning, &reward, Direction::Credit)
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                self.undo_insert(&submission).await;
                return Err(err);
            },
        };
        let totals = self
            .engine
            .settle_department(&updated, &planning, Direction::Credit)
            .await?;

        metrics::counter!("submissions_total", "outcome" => "submitted").increment(1);
        tracing::info!(
            user_id = %user.id,
            planning_id = %planning,
            points = reward.points,
            "submission recorded"
        );

        Ok(SubmitOutcome::Submitted { submission, totals })
    }

    /// Delete the submission of the pair and debit its reward.
    ///
    /// Deletion is atomic, so a reward is debited at most once per
    /// submission.
    pub async fn revoke(
        &self,
        user: &UserId,
        planning: PlanningId,
    ) -> Result<RevokeOutcome> {
        if self.store.find_submission(user, &planning).await?.is_none() {
            return Ok(RevokeOutcome::NothingToRevoke);
        }

        // Resolve before deleting so a dangling planning leaves the row.
        let reward = self.engine.reward(&planning).await?;

        let Some(removed) = self.store.delete_submission(user, &planning).await? else {
            return Ok(RevokeOutcome::NothingToRevoke);
        };

        let updated = match self
            .engine
            .move_user(user, &planning, &reward, Direction::Debit)
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                self.undo_delete(&removed).await;
                return Err(err);
            },
        };
        let totals = self
            .engine
            .settle_department(&updated, &planning, Direction::Debit)
            .await?;

        metrics::counter!("submissions_total", "outcome" => "revoked").increment(1);
        tracing::info!(user_id = %user, planning_id = %planning, "submission revoked");

        Ok(RevokeOutcome::Revoked { totals })
    }

    /// Drop a submission whose credit was never applied.
    async fn undo_insert(&self, submission: &Submission) {
        match self
            .store
            .delete_submission(&submission.user_id, &submission.planning_id)
            .await
        {
            Ok(_) => tracing::warn!(
                user_id = %submission.user_id,
                planning_id = %submission.planning_id,
                "submission rolled back after failed credit"
            ),
            Err(err) => tracing::error!(
                user_id = %submission.user_id,
                planning_id = %submission.planning_id,
                error = %err,
                "submission kept without its credit"
            ),
        }
    }

    /// Put back a submission whose debit was never applied.
    async fn undo_delete(&self, submission: &Submission) {
        match self.store.insert_submission(submission).await {
            Ok(_) => tracing::warn!(
                user_id = %submission.user_id,
                planning_id = %submission.planning_id,
                "submission restored after failed debit"
            ),
            Err(err) => tracing::error!(
                user_id = %submission.user_id,
                planning_id = %submission.planning_id,
                error = %err,
                "submission removed without its debit"
            ),
        }
    }
}

fn already_submitted(user: &User, planning: &PlanningId) -> SubmitOutcome {
    metrics::counter!("submissions_total", "outcome" => "duplicate").increment(1);
    tracing::debug!(user_id = %user.id, planning_id = %planning, "already submitted");
    SubmitOutcome::AlreadySubmitted
}
