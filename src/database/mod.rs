//! Entity store: persistence port and its adapters.
mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRef;

use crate::AppState;
use crate::challenge::{ChallengeTemplate, Comment, Planning};
use crate::department::Department;
use crate::error::Result;
use crate::id::{DepartmentId, PlanningId, TemplateId, UserId};
use crate::ledger::Submission;
use crate::user::User;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "greenpoints";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Persistence port over every collection.
///
/// References are logical: nothing cascades, and a dangling reference only
/// shows up as `None` on lookup.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a user. [`crate::ServerError::Conflict`] when username, email
    /// or token is already taken.
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn find_user(&self, id: &UserId) -> Result<Option<User>>;

    /// Batched lookup; unknown ids are skipped.
    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>>;

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>>;

    /// Lookup by username or email, both already lower-cased.
    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>>;

    async fn list_department_members(
        &self,
        department: &DepartmentId,
    ) -> Result<Vec<User>>;

    /// Atomically add both deltas to the user's totals.
    async fn increment_user_totals(
        &self,
        id: &UserId,
        points: i64,
        co2: f64,
    ) -> Result<Option<User>>;

    /// Insert a department. [`crate::ServerError::Conflict`] on duplicate
    /// name.
    async fn insert_department(&self, department: &Department) -> Result<()>;

    async fn find_department(
        &self,
        id: &DepartmentId,
    ) -> Result<Option<Department>>;

    async fn find_department_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Department>>;

    async fn list_departments(&self, active_only: bool)
    -> Result<Vec<Department>>;

    /// Overwrite department totals with the sum over its current members.
    ///
    /// The sum and the write are one unit of work, serialized per
    /// department.
    async fn recompute_department(
        &self,
        id: &DepartmentId,
    ) -> Result<Option<Department>>;

    async fn insert_template(&self, template: &ChallengeTemplate) -> Result<()>;

    async fn find_template(
        &self,
        id: &TemplateId,
    ) -> Result<Option<ChallengeTemplate>>;

    async fn list_templates(&self) -> Result<Vec<ChallengeTemplate>>;

    /// Insert every planning or none.
    async fn insert_plannings(&self, plannings: &[Planning]) -> Result<()>;

    async fn find_planning(&self, id: &PlanningId) -> Result<Option<Planning>>;

    /// Plannings flagged active, in creation order. Expiry is not checked.
    async fn list_active_plannings(&self) -> Result<Vec<Planning>>;

    /// Insert unless the (user, planning) pair already has a submission.
    ///
    /// Returns `false`, without writing, on duplicate. Check and insert are
    /// atomic.
    async fn insert_submission(&self, submission: &Submission) -> Result<bool>;

    async fn find_submission(
        &self,
        user: &UserId,
        planning: &PlanningId,
    ) -> Result<Option<Submission>>;

    /// Remove and return the submission of the pair, if any.
    async fn delete_submission(
        &self,
        user: &UserId,
        planning: &PlanningId,
    ) -> Result<Option<Submission>>;

    async fn list_user_submissions(&self, user: &UserId)
    -> Result<Vec<Submission>>;

    async fn insert_comment(&self, comment: &Comment) -> Result<()>;

    /// Comments of a planning, oldest first.
    async fn list_comments(&self, planning: &PlanningId) -> Result<Vec<Comment>>;
}

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub store: Arc<dyn Store>,
}

impl Database {
    /// Connect to PostgreSQL and run migrations.
    pub async fn postgres(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> Result<Self> {
        let store =
            PostgresStore::connect(hostname, username, password, db, pool)
                .await?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// Volatile store, lost on shutdown.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}
