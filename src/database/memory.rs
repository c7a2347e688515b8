//! Volatile [`Store`] adapter.
//!
//! Every operation holds the table lock for its whole duration, so each one
//! is atomic with respect to the others.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use crate::ServerError;
use crate::challenge::{ChallengeTemplate, Comment, Planning};
use crate::department::Department;
use crate::error::Result;
use crate::id::{DepartmentId, PlanningId, TemplateId, UserId};
use crate::ledger::Submission;
use crate::user::User;

fn out_of_range(entity: &str) -> ServerError {
    ServerError::Internal {
        details: format!("{entity} totals out of range"),
        source: None,
    }
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    departments: Vec<Department>,
    templates: Vec<ChallengeTemplate>,
    plannings: Vec<Planning>,
    submissions: Vec<Submission>,
    comments: Vec<Comment>,
}

/// In-memory store, kept in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        for other in &tables.users {
            if other.username == user.username {
                return Err(ServerError::Conflict("username already taken".into()));
            }
            if other.email == user.email {
                return Err(ServerError::Conflict("email already used".into()));
            }
            if other.token == user.token {
                return Err(ServerError::Conflict("token already issued".into()));
            }
        }

        tables.users.push(user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &UserId) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == *id).cloned())
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.token == token).cloned())
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.username == login || u.email == login)
            .cloned())
    }

    async fn list_department_members(
        &self,
        department: &DepartmentId,
    ) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .filter(|u| u.department_id == Some(*department))
            .cloned()
            .collect())
    }

    async fn increment_user_totals(
        &self,
        id: &UserId,
        points: i64,
        co2: f64,
    ) -> Result<Option<User>> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables.users.iter_mut().find(|u| u.id == *id) else {
            return Ok(None);
        };

        let total_points = user
            .total_points
            .checked_add(points)
            .ok_or_else(|| out_of_range("user"))?;
        let total_co2 = user.total_co2_savings_points + co2;
        if !total_co2.is_finite() {
            return Err(out_of_range("user"));
        }

        user.total_points = total_points;
        user.total_co2_savings_points = total_co2;
        Ok(Some(user.clone()))
    }

    async fn insert_department(&self, department: &Department) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.departments.iter().any(|d| d.name == department.name) {
            return Err(ServerError::Conflict("department already exists".into()));
        }

        tables.departments.push(department.clone());
        Ok(())
    }

    async fn find_department(
        &self,
        id: &DepartmentId,
    ) -> Result<Option<Department>> {
        let tables = self.tables.read().await;
        Ok(tables.departments.iter().find(|d| d.id == *id).cloned())
    }

    async fn find_department_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Department>> {
        let tables = self.tables.read().await;
        Ok(tables.departments.iter().find(|d| d.name == name).cloned())
    }

    async fn list_departments(
        &self,
        active_only: bool,
    ) -> Result<Vec<Department>> {
        let tables = self.tables.read().await;
        Ok(tables
            .departments
            .iter()
            .filter(|d| !active_only || d.is_active)
            .cloned()
            .collect())
    }

    async fn recompute_department(
        &self,
        id: &DepartmentId,
    ) -> Result<Option<Department>> {
        let mut tables = self.tables.write().await;
        let (points, co2) = tables
            .users
            .iter()
            .filter(|u| u.department_id == Some(*id))
            .try_fold((0i64, 0.0), |(points, co2), u| {
                Some((
                    points.checked_add(u.total_points)?,
                    co2 + u.total_co2_savings_points,
                ))
            })
            .ok_or_else(|| out_of_range("department"))?;

        Ok(tables.departments.iter_mut().find(|d| d.id == *id).map(|department| {
            department.total_points = points;
            department.total_co2_savings_points = co2;
            department.clone()
        }))
    }

    async fn insert_template(&self, template: &ChallengeTemplate) -> Result<()> {
        self.tables.write().await.templates.push(template.clone());
        Ok(())
    }

    async fn find_template(
        &self,
        id: &TemplateId,
    ) -> Result<Option<ChallengeTemplate>> {
        let tables = self.tables.read().await;
        Ok(tables.templates.iter().find(|t| t.id == *id).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<ChallengeTemplate>> {
        Ok(self.tables.read().await.templates.clone())
    }

    async fn insert_plannings(&self, plannings: &[Planning]) -> Result<()> {
        self.tables
            .write()
            .await
            .plannings
            .extend_from_slice(plannings);
        Ok(())
    }

    async fn find_planning(&self, id: &PlanningId) -> Result<Option<Planning>> {
        let tables = self.tables.read().await;
        Ok(tables.plannings.iter().find(|p| p.id == *id).cloned())
    }

    async fn list_active_plannings(&self) -> Result<Vec<Planning>> {
        let tables = self.tables.read().await;
        Ok(tables
            .plannings
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect())
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.submissions.iter().any(|s| {
            s.user_id == submission.user_id && s.planning_id == submission.planning_id
        });
        if duplicate {
            return Ok(false);
        }

        tables.submissions.push(submission.clone());
        Ok(true)
    }

    async fn find_submission(
        &self,
        user: &UserId,
        planning: &PlanningId,
    ) -> Result<Option<Submission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .iter()
            .find(|s| s.user_id == *user && s.planning_id == *planning)
            .cloned())
    }

    async fn delete_submission(
        &self,
        user: &UserId,
        planning: &PlanningId,
    ) -> Result<Option<Submission>> {
        let mut tables = self.tables.write().await;
        let position = tables
            .submissions
            .iter()
            .position(|s| s.user_id == *user && s.planning_id == *planning);

        Ok(position.map(|index| tables.submissions.remove(index)))
    }

    async fn list_user_submissions(
        &self,
        user: &UserId,
    ) -> Result<Vec<Submission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .iter()
            .filter(|s| s.user_id == *user)
            .cloned()
            .collect())
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        self.tables.write().await.comments.push(comment.clone());
        Ok(())
    }

    async fn list_comments(&self, planning: &PlanningId) -> Result<Vec<Comment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .iter()
            .filter(|c| c.planning_id == *planning)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::id::SubmissionId;
    use crate::user::UserBuilder;

    fn submission(user: UserId, planning: PlanningId) -> Submission {
        Submission {
            id: SubmissionId::generate(),
            user_id: user,
            department_id: None,
            planning_id: planning,
            photo_url: None,
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_user_uniqueness() {
        let store = MemoryStore::default();
        let alice = UserBuilder::new()
            .username("Alice")
            .email("alice@corp.io")
            .department(DepartmentId::generate())
            .build("hash".into(), "t1".into());
        store.insert_user(&alice).await.unwrap();

        let twin = UserBuilder::new()
            .username("ALICE")
            .email("other@corp.io")
            .department(DepartmentId::generate())
            .build("hash".into(), "t2".into());
        assert!(matches!(
            store.insert_user(&twin).await,
            Err(ServerError::Conflict(msg)) if msg == "username already taken"
        ));

        assert_eq!(
            store.find_user_by_login("alice@corp.io").await.unwrap().map(|u| u.id),
            Some(alice.id)
        );
        assert_eq!(
            store.find_user_by_token("t1").await.unwrap().map(|u| u.id),
            Some(alice.id)
        );
    }

    #[tokio::test]
    async fn test_submission_pair_is_unique() {
        let store = MemoryStore::default();
        let (user, planning) = (UserId::generate(), PlanningId::generate());

        assert!(store.insert_submission(&submission(user, planning)).await.unwrap());
        assert!(!store.insert_submission(&submission(user, planning)).await.unwrap());
        assert!(
            store
                .insert_submission(&submission(user, PlanningId::generate()))
                .await
                .unwrap()
        );

        assert!(store.delete_submission(&user, &planning).await.unwrap().is_some());
        assert!(store.delete_submission(&user, &planning).await.unwrap().is_none());
        assert_eq!(store.list_user_submissions(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_increment_overflow_leaves_totals() {
        let store = MemoryStore::default();
        let department = Department::new("Ops");
        store.insert_department(&department).await.unwrap();
        let user = UserBuilder::new()
            .username("olga")
            .email("olga@corp.io")
            .department(department.id)
            .build("hash".into(), "t1".into());
        store.insert_user(&user).await.unwrap();

        store.increment_user_totals(&user.id, i64::MAX, 1.0).await.unwrap();
        assert!(matches!(
            store.increment_user_totals(&user.id, 1, 1.0).await,
            Err(ServerError::Internal { .. })
        ));

        let user = store.find_user(&user.id).await.unwrap().unwrap();
        assert_eq!(user.total_points, i64::MAX);
        assert_eq!(user.total_co2_savings_points, 1.0);
    }

    #[tokio::test]
    async fn test_recompute_overflow_is_reported() {
        let store = MemoryStore::default();
        let department = Department::new("Ops");
        store.insert_department(&department).await.unwrap();
        for name in ["pia", "quinn"] {
            let user = UserBuilder::new()
                .username(name)
                .email(format!("{name}@corp.io"))
                .department(department.id)
                .build("hash".into(), format!("token-{name}"));
            store.insert_user(&user).await.unwrap();
            store
                .increment_user_totals(&user.id, i64::MAX, 0.0)
                .await
                .unwrap();
        }

        assert!(matches!(
            store.recompute_department(&department.id).await,
            Err(ServerError::Internal { .. })
        ));
        let department = store.find_department(&department.id).await.unwrap().unwrap();
        assert_eq!(department.total_points, 0);
    }

    #[tokio::test]
    async fn test_recompute_unknown_department() {
        let store = MemoryStore::default();
        assert_eq!(
            store.recompute_department(&DepartmentId::generate()).await.unwrap(),
            None
        );
    }
}
