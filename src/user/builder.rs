//! Typed builder for User.
//!
//! A regular member cannot be built without a department; only
//! [`UserBuilder::admin`] builds a user without one.

use chrono::Utc;

use crate::id::{DepartmentId, UserId};
use crate::user::{User, normalize};

/// [`User`] builder.
#[derive(Debug, Clone)]
pub struct UserBuilder<Department> {
    username: String,
    email: String,
    department: Department,
}

/// Value is missing on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

impl UserBuilder<Missing> {
    /// Create a new [`UserBuilder`].
    pub fn new() -> Self {
        Self {
            username: String::default(),
            email: String::default(),
            department: Missing,
        }
    }

    /// Update `department` field on [`UserBuilder`].
    pub fn department(
        self,
        department: DepartmentId,
    ) -> UserBuilder<Present<DepartmentId>> {
        UserBuilder {
            username: self.username,
            email: self.email,
            department: Present(department),
        }
    }

    /// Build an administrator, attached to no department.
    pub fn admin(self, password_hash: String, token: String) -> User {
        self.finish(None, true, password_hash, token)
    }
}

impl Default for UserBuilder<Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Department> UserBuilder<Department> {
    /// Update `username` field on [`UserBuilder`].
    pub fn username(mut self, username: impl AsRef<str>) -> Self {
        self.username = normalize(username.as_ref());
        self
    }

    /// Update `email` field on [`UserBuilder`].
    pub fn email(mut self, email: impl AsRef<str>) -> Self {
        self.email = normalize(email.as_ref());
        self
    }

    fn finish(
        self,
        department_id: Option<DepartmentId>,
        is_admin: bool,
        password_hash: String,
        token: String,
    ) -> User {
        User {
            id: UserId::generate(),
            username: self.username,
            email: self.email,
            password: password_hash,
            department_id,
            token,
            total_points: 0,
            total_co2_savings_points: 0.0,
            collected_badges: Vec::new(),
            is_admin,
            created_at: Utc::now(),
        }
    }
}

impl UserBuilder<Present<DepartmentId>> {
    /// Build a regular member of the department.
    pub fn build(self, password_hash: String, token: String) -> User {
        let department = self.department.0;
        self.finish(Some(department), false, password_hash, token)
    }
}
