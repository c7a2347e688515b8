//! PostgreSQL [`Store`] adapter.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use super::Store;
use crate::ServerError;
use crate::challenge::{ChallengeTemplate, Comment, Planning};
use crate::department::Department;
use crate::error::Result;
use crate::id::{DepartmentId, PlanningId, TemplateId, UserId};
use crate::ledger::Submission;
use crate::user::User;

const USER_COLUMNS: &str = "id, username, email, password, department_id, token, total_points, \
     total_co2_savings_points, collected_badges, is_admin, created_at";
const DEPARTMENT_COLUMNS: &str =
    "id, name, total_points, total_co2_savings_points, is_active, created_at";
const TEMPLATE_COLUMNS: &str = "id, title, description, points, co2_savings_points, \
     photo_required, fun_fact, why_important, created_at";
const PLANNING_COLUMNS: &str =
    "id, template_id, frequency, created_at, expires_at, is_active";
const SUBMISSION_COLUMNS: &str =
    "id, user_id, department_id, planning_id, photo_url, submitted_at";

/// Map unique violations to [`ServerError::Conflict`].
fn conflict(err: sqlx::Error) -> ServerError {
    let message = err
        .as_database_error()
        .filter(|db| db.is_unique_violation())
        .map(|db| match db.constraint() {
            Some("users_username_key") => "username already taken",
            Some("users_email_key") => "email already used",
            Some("users_token_key") => "token already issued",
            Some("departments_name_key") => "department already exists",
            _ => "resource already exists",
        });

    match message {
        Some(message) => ServerError::Conflict(message.into()),
        None => ServerError::Sql(err),
    }
}

/// Store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect and run pending migrations.
    pub async fn connect(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> Result<Self> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let pool = pool.connect(&addr).await?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|err| ServerError::internal("database migration", err))?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.department_id)
        .bind(&user.token)
        .bind(user.total_points)
        .bind(user.total_co2_savings_points)
        .bind(&user.collected_badges)
        .bind(user.is_admin)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(conflict)?;

        Ok(())
    }

    async fn find_user(&self, id: &UserId) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1 LIMIT 1"
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_department_members(
        &self,
        department: &DepartmentId,
    ) -> Result<Vec<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE department_id = $1 ORDER BY created_at"
        ))
        .bind(department)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn increment_user_totals(
        &self,
        id: &UserId,
        points: i64,
        co2: f64,
    ) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            r#"UPDATE users
                SET total_points = total_points + $2,
                    total_co2_savings_points = total_co2_savings_points + $3
                WHERE id = $1
                RETURNING {USER_COLUMNS}"#
        ))
        .bind(id)
        .bind(points)
        .bind(co2)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_department(&self, department: &Department) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO departments ({DEPARTMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(department.id)
        .bind(&department.name)
        .bind(department.total_points)
        .bind(department.total_co2_savings_points)
        .bind(department.is_active)
        .bind(department.created_at)
        .execute(&self.pool)
        .await
        .map_err(conflict)?;

        Ok(())
    }

    async fn find_department(
        &self,
        id: &DepartmentId,
    ) -> Result<Option<Department>> {
        Ok(sqlx::query_as::<_, Department>(&format!(
            "SELECT {DEPARTMENT_COLUMNS} FROM departments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_department_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Department>> {
        Ok(sqlx::query_as::<_, Department>(&format!(
            "SELECT {DEPARTMENT_COLUMNS} FROM departments WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_departments(
        &self,
        active_only: bool,
    ) -> Result<Vec<Department>> {
        Ok(sqlx::query_as::<_, Department>(&format!(
            "SELECT {DEPARTMENT_COLUMNS} FROM departments \
             WHERE is_active OR NOT $1 ORDER BY created_at"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn recompute_department(
        &self,
        id: &DepartmentId,
    ) -> Result<Option<Department>> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes recomputes of one department.
        let locked = sqlx::query("SELECT id FROM departments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let department = sqlx::query_as::<_, Department>(
            r#"UPDATE departments d
                SET total_points = s.points, total_co2_savings_points = s.co2
                FROM (
                    SELECT COALESCE(SUM(total_points), 0)::BIGINT AS points,
                           COALESCE(SUM(total_co2_savings_points), 0)::DOUBLE PRECISION AS co2
                    FROM users WHERE department_id = $1
                ) s
                WHERE d.id = $1
                RETURNING d.id, d.name, d.total_points, d.total_co2_savings_points,
                    d.is_active, d.created_at"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(department)
    }

    async fn insert_template(&self, template: &ChallengeTemplate) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO challenge_templates ({TEMPLATE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(template.id)
        .bind(&template.title)
        .bind(&template.description)
        .bind(template.points)
        .bind(template.co2_savings_points)
        .bind(template.photo_required)
        .bind(&template.fun_fact)
        .bind(&template.why_important)
        .bind(template.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_template(
        &self,
        id: &TemplateId,
    ) -> Result<Option<ChallengeTemplate>> {
        Ok(sqlx::query_as::<_, ChallengeTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM challenge_templates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_templates(&self) -> Result<Vec<ChallengeTemplate>> {
        Ok(sqlx::query_as::<_, ChallengeTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM challenge_templates ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_plannings(&self, plannings: &[Planning]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "INSERT INTO challenge_plannings ({PLANNING_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        );

        for planning in plannings {
            sqlx::query(&query)
                .bind(planning.id)
                .bind(planning.template_id)
                .bind(planning.frequency)
                .bind(planning.created_at)
                .bind(planning.expires_at)
                .bind(planning.is_active)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_planning(&self, id: &PlanningId) -> Result<Option<Planning>> {
        Ok(sqlx::query_as::<_, Planning>(&format!(
            "SELECT {PLANNING_COLUMNS} FROM challenge_plannings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_active_plannings(&self) -> Result<Vec<Planning>> {
        Ok(sqlx::query_as::<_, Planning>(&format!(
            "SELECT {PLANNING_COLUMNS} FROM challenge_plannings \
             WHERE is_active ORDER BY created_at, frequency"
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO challenge_submissions ({SUBMISSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, planning_id) DO NOTHING"
        ))
        .bind(submission.id)
        .bind(submission.user_id)
        .bind(submission.department_id)
        .bind(submission.planning_id)
        .bind(&submission.photo_url)
        .bind(submission.submitted_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_submission(
        &self,
        user: &UserId,
        planning: &PlanningId,
    ) -> Result<Option<Submission>> {
        Ok(sqlx::query_as::<_, Submission>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM challenge_submissions \
             WHERE user_id = $1 AND planning_id = $2"
        ))
        .bind(user)
        .bind(planning)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_submission(
        &self,
        user: &UserId,
        planning: &PlanningId,
    ) -> Result<Option<Submission>> {
        Ok(sqlx::query_as::<_, Submission>(&format!(
            "DELETE FROM challenge_submissions \
             WHERE user_id = $1 AND planning_id = $2 \
             RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(user)
        .bind(planning)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_user_submissions(
        &self,
        user: &UserId,
    ) -> Result<Vec<Submission>> {
        Ok(sqlx::query_as::<_, Submission>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM challenge_submissions \
             WHERE user_id = $1 ORDER BY submitted_at"
        ))
        .bind(user)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO comments (id, planning_id, user_id, text, created_at)
                VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(comment.id)
        .bind(comment.planning_id)
        .bind(comment.user_id)
        .bind(&comment.text)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_comments(&self, planning: &PlanningId) -> Result<Vec<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"SELECT id, planning_id, user_id, text, created_at
                FROM comments WHERE planning_id = $1 ORDER BY created_at"#,
        )
        .bind(planning)
        .fetch_all(&self.pool)
        .await?)
    }
}
