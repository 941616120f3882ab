//! User service
//!
//! Registration (the first account becomes an admin), login and logout,
//! session validation and profile editing.

use crate::db::is_unique_violation;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{NewUser, ProfileInput, Session, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use std::sync::Arc;

const MAX_USERNAME_LEN: usize = 150;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Invalid input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
        }
    }

    /// Register a new user.
    ///
    /// The first registered user is an admin, everyone after is an author.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for empty or malformed fields
    /// - `UserExists` if the username or email is taken
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        validate_username(&username)?;
        validate_email(&email)?;
        if input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        self.ensure_unique(&username, &email, None).await?;

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let new_user = NewUser {
            username,
            email,
            password_hash,
            role: UserRole::Author,
        };
        let user = match self.user_repo.create_registered(&new_user).await {
            Ok(user) => user,
            Err(e) => {
                return Err(self
                    .write_failed(e, &new_user.username, &new_user.email, None)
                    .await);
            }
        };

        tracing::info!("Registered user {} as {}", user.username, user.role);
        Ok(user)
    }

    /// Check credentials and open a new session.
    ///
    /// `username_or_email` is matched against usernames first.
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .find_user_by_username_or_email(input.username_or_email.trim())
            .await?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            tracing::debug!("Rejected login for {}", user.username);
            return Err(invalid());
        }

        let session = self
            .session_repo
            .create(&Session::issue(user.id))
            .await
            .context("Failed to create session")?;

        Ok(session)
    }

    /// Invalidate a session. Unknown tokens are ignored.
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Unknown and expired tokens resolve to `None`; expired ones are deleted.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?;
        Ok(user)
    }

    /// Update the profile of `user`, keeping usernames and emails unique
    pub async fn update_profile(
        &self,
        user: &User,
        input: ProfileInput,
    ) -> Result<User, UserServiceError> {
        let profile = ProfileInput {
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            username: input.username.trim().to_string(),
            email: input.email.trim().to_string(),
        };
        validate_username(&profile.username)?;
        validate_email(&profile.email)?;
        for name in [&profile.first_name, &profile.last_name] {
            if name.chars().count() > MAX_USERNAME_LEN {
                return Err(UserServiceError::ValidationError(format!(
                    "Names are limited to {} characters",
                    MAX_USERNAME_LEN
                )));
            }
        }

        self.ensure_unique(&profile.username, &profile.email, Some(user.id))
            .await?;

        match self.user_repo.update_profile(user.id, &profile).await {
            Ok(updated) => Ok(updated),
            Err(e) => Err(self
                .write_failed(e, &profile.username, &profile.email, Some(user.id))
                .await),
        }
    }

    /// Delete every expired session, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    /// Fail if `username` or `email` belongs to anyone other than `except`
    async fn ensure_unique(
        &self,
        username: &str,
        email: &str,
        except: Option<i64>,
    ) -> Result<(), UserServiceError> {
        let taken_by_other = |found: Option<User>| found.map_or(false, |u| Some(u.id) != except);

        let by_username = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to check username")?;
        if taken_by_other(by_username) {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let by_email = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to check email")?;
        if taken_by_other(by_email) {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        Ok(())
    }

    /// Classify a failed user write. A UNIQUE rejection means another
    /// request claimed the username or email after `ensure_unique` ran.
    async fn write_failed(
        &self,
        err: anyhow::Error,
        username: &str,
        email: &str,
        except: Option<i64>,
    ) -> UserServiceError {
        if !is_unique_violation(&err) {
            return UserServiceError::InternalError(err.context("Failed to save user"));
        }
        match self.ensure_unique(username, email, except).await {
            Err(e) => e,
            Ok(()) => {
                UserServiceError::UserExists("Username or email is already taken".to_string())
            }
        }
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        let user = self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?;
        Ok(user)
    }
}

fn validate_username(username: &str) -> Result<(), UserServiceError> {
    if username.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Username is limited to {} characters",
            MAX_USERNAME_LEN
        )));
    }
    // Usernames appear in profile URLs. No '@', so a login identifier
    // can never be both a username and someone's email.
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '+' | '-' | '_'))
    {
        return Err(UserServiceError::ValidationError(
            "Username may contain only letters, digits and ./+/-/_".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if email.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Email cannot be empty".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(())
}

/// Input for user registration
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub username_or_email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}
