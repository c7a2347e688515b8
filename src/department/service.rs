//! Department directory and the aggregate repair path.

use std::sync::Arc;

use futures_util::future::try_join_all;

use crate::ServerError;
use crate::database::Store;
use crate::department::Department;
use crate::error::Result;
use crate::id::DepartmentId;
use crate::user::User;

/// Department manager.
#[derive(Clone)]
pub struct Directory {
    store: Arc<dyn Store>,
}

impl Directory {
    /// Create a new [`Directory`].
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Register an inactive department. Activation happens out-of-band.
    pub async fn create(&self, name: &str) -> Result<Department> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServerError::InvalidArgument(
                "department name is required".into(),
            ));
        }

        let department = Department::new(name);
        self.store.insert_department(&department).await?;

        tracing::info!(department_id = %department.id, name, "department created");
        Ok(department)
    }

    /// Departments shown in listings.
    pub async fn list_active(&self) -> Result<Vec<Department>> {
        self.store.list_departments(true).await
    }

    /// Exact, case-sensitive lookup.
    pub async fn find_by_name(&self, name: &str) -> Result<Department> {
        self.store
            .find_department_by_name(name)
            .await?
            .ok_or(ServerError::not_found("department"))
    }

    pub async fn find(&self, id: &DepartmentId) -> Result<Department> {
        self.store
            .find_department(id)
            .await?
            .ok_or(ServerError::not_found("department"))
    }

    /// Department of `user`. Administrators have none.
    pub async fn stats(&self, user: &User) -> Result<Department> {
        let Some(id) = user.department_id else {
            return Err(ServerError::InvalidArgument(
                "user has no department".into(),
            ));
        };

        self.find(&id).await
    }

    /// Freshly recomputed department and its members, best first.
    pub async fn team(&self, id: &DepartmentId) -> Result<(Department, Vec<User>)> {
        let department = self
            .store
            .recompute_department(id)
            .await?
            .ok_or(ServerError::not_found("department"))?;

        let mut members = self.store.list_department_members(id).await?;
        members.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then_with(|| a.username.cmp(&b.username))
        });

        Ok((department, members))
    }

    /// Rebuild every department's totals from its members.
    ///
    /// Each recompute replaces state, so runs are idempotent and may overlap.
    pub async fn recalculate_all(&self) -> Result<usize> {
        let departments = self.store.list_departments(false).await?;

        let recomputed = try_join_all(
            departments
                .iter()
                .map(|department| self.store.recompute_department(&department.id)),
        )
        .await?;

        let count = recomputed.iter().flatten().count();
        metrics::counter!("department_recalculations_total").increment(count as u64);
        tracing::info!(count, "departments recalculated");

        Ok(count)
    }
}
