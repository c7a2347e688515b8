//! Identity & session gateway.

use std::sync::Arc;

use crate::ServerError;
use crate::crypto::Crypto;
use crate::database::Store;
use crate::error::Result;
use crate::id::DepartmentId;
use crate::user::{User, UserBuilder, normalize};

/// Credentials submitted on signup.
#[derive(Debug, Clone)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// User manager.
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn Store>,
    crypto: Arc<Crypto>,
}

impl IdentityService {
    /// Create a new [`IdentityService`].
    pub fn new(store: Arc<dyn Store>, crypto: Arc<Crypto>) -> Self {
        Self { store, crypto }
    }

    fn hash(&self, password: &str) -> Result<String> {
        self.crypto
            .pwd
            .hash_password(password)
            .map_err(|err| ServerError::internal("password hashing", err))
    }

    /// Create a regular member of `department`.
    pub async fn signup(
        &self,
        credentials: Credentials<'_>,
        department: DepartmentId,
    ) -> Result<User> {
        if self.store.find_department(&department).await?.is_none() {
            return Err(ServerError::not_found("department"));
        }

        let user = UserBuilder::new()
            .username(credentials.username)
            .email(credentials.email)
            .department(department)
            .build(
                self.hash(credentials.password)?,
                self.crypto.session_token(),
            );
        self.store.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, %department, "user signed up");
        Ok(user)
    }

    /// Create an administrator. Callers gate access.
    pub async fn admin_signup(&self, credentials: Credentials<'_>) -> Result<User> {
        let user = UserBuilder::new()
            .username(credentials.username)
            .email(credentials.email)
            .admin(
                self.hash(credentials.password)?,
                self.crypto.session_token(),
            );
        self.store.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "administrator signed up");
        Ok(user)
    }

    /// Check credentials, `login` being a username or an email.
    ///
    /// Unknown login and wrong password are indistinguishable.
    pub async fn signin(&self, login: &str, password: &str) -> Result<User> {
        match self.store.find_user_by_login(&normalize(login)).await? {
            Some(user) if self.crypto.pwd.verify_password(password, &user.password) => {
                Ok(user)
            },
            Some(_) => Err(ServerError::InvalidCredentials),
            None => {
                self.crypto.pwd.verify_decoy(password);
                Err(ServerError::InvalidCredentials)
            },
        }
    }

    /// Map a bearer token to its user.
    pub async fn resolve_session(&self, token: &str) -> Result<User> {
        if token.is_empty() {
            return Err(ServerError::Unauthorized);
        }

        self.store
            .find_user_by_token(token)
            .await?
            .ok_or(ServerError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cheap;
    use crate::database::MemoryStore;
    use crate::department::Department;

    async fn setup() -> (IdentityService, DepartmentId) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        let department = Department::new("Marketing");
        store.insert_department(&department).await.unwrap();
        let crypto = Arc::new(Crypto::new(Some(cheap())).unwrap());

        (IdentityService::new(store, crypto), department.id)
    }

    fn credentials<'a>(username: &'a str, email: &'a str) -> Credentials<'a> {
        Credentials {
            username,
            email,
            password: "P4ssw0rd!",
        }
    }

    #[tokio::test]
    async fn test_signup_then_signin() {
        let (identity, department) = setup().await;
        let user = identity
            .signup(credentials("Alice", "Alice@Corp.io"), department)
            .await
            .unwrap();
        assert_eq!(user.department_id, Some(department));

        let by_name = identity.signin("ALICE", "P4ssw0rd!").await.unwrap();
        let by_email = identity.signin("alice@corp.io", "P4ssw0rd!").await.unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_email.id, user.id);

        let session = identity.resolve_session(&user.token).await.unwrap();
        assert_eq!(session.id, user.id);
    }

    #[tokio::test]
    async fn test_duplicates_are_case_insensitive() {
        let (identity, department) = setup().await;
        identity
            .signup(credentials("alice", "alice@corp.io"), department)
            .await
            .unwrap();

        let same_name = identity
            .signup(credentials("ALICE", "other@corp.io"), department)
            .await;
        assert!(matches!(same_name, Err(ServerError::Conflict(_))));

        let same_email = identity
            .signup(credentials("bob", "Alice@CORP.io"), department)
            .await;
        assert!(matches!(same_email, Err(ServerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_signup_requires_existing_department() {
        let (identity, _) = setup().await;
        let result = identity
            .signup(credentials("carol", "carol@corp.io"), DepartmentId::generate())
            .await;
        assert!(matches!(result, Err(ServerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_signin_does_not_leak_existence() {
        let (identity, department) = setup().await;
        identity
            .signup(credentials("dave", "dave@corp.io"), department)
            .await
            .unwrap();

        let wrong_password = identity.signin("dave", "nope").await;
        let unknown = identity.signin("nobody", "P4ssw0rd!").await;
        assert!(matches!(wrong_password, Err(ServerError::InvalidCredentials)));
        assert!(matches!(unknown, Err(ServerError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_admin_has_no_department() {
        let (identity, _) = setup().await;
        let admin = identity
            .admin_signup(credentials("root", "root@corp.io"))
            .await
            .unwrap();
        assert!(admin.is_admin);
        assert!(admin.department_id.is_none());
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (identity, _) = setup().await;
        assert!(matches!(
            identity.resolve_session("deadbeef").await,
            Err(ServerError::Unauthorized)
        ));
        assert!(matches!(
            identity.resolve_session("").await,
            Err(ServerError::Unauthorized)
        ));
    }
}
