//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! cravecart-cli admin create -e admin@example.com -n "Admin Name" -p 'S3cure-pass'
//! ```
//!
//! # Environment Variables
//!
//! - `CRAVECART_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

use cravecart_core::{Email, Role, UserId};
use cravecart_server::db::{self, PgStore, RepositoryError, UserRepository};
use cravecart_server::models::NewUser;
use cravecart_server::services::auth::{AuthError, hash_password, validate_password};
use thiserror::Error;

use super::MissingEnvVar;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    MissingEnvVar(#[from] MissingEnvVar),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Password rejected or could not be hashed.
    #[error("{0}")]
    Password(#[from] AuthError),

    /// User already exists.
    #[error("User already exists with email: {0}")]
    UserExists(String),

    #[error("Store error: {0}")]
    Store(RepositoryError),
}

/// Check the inputs and build the user row.
fn new_admin(email: &str, name: &str, password: &str) -> Result<NewUser, AdminError> {
    let email = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    validate_password(password)?;

    Ok(NewUser {
        email,
        name: name.trim().to_owned(),
        role: Role::Admin,
        password_hash: hash_password(password)?,
    })
}

/// Create a new admin user.
///
/// # Arguments
///
/// * `email` - Admin's email address
/// * `name` - Admin's display name
/// * `password` - Initial password, checked against the sign-up rules
///
/// # Returns
///
/// The ID of the created user.
pub async fn create_user(email: &str, name: &str, password: &str) -> Result<UserId, AdminError> {
    let user = new_admin(email, name, password)?;
    let database_url = super::database_url()?;

    tracing::info!("Connecting to database...");
    let store = PgStore::new(db::create_pool(&database_url).await?);

    tracing::info!("Creating admin user: {}", user.email);
    let created = store.create_user(&user).await.map_err(|e| match e {
        RepositoryError::Conflict(_) => AdminError::UserExists(user.email.to_string()),
        other => AdminError::Store(other),
    })?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Email: {}",
        created.id,
        created.email
    );
    Ok(created.id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builds_an_admin_with_a_hashed_password() {
        let user = new_admin("Chef@Example.com", " Head Chef ", "Kitchen42").unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.name, "Head Chef");
        assert_ne!(user.password_hash, "Kitchen42");
        assert!(user.password_hash.starts_with("$argon2"));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            new_admin("not-an-email", "x", "Kitchen42"),
            Err(AdminError::InvalidEmail(_))
        ));
        assert!(matches!(
            new_admin("chef@example.com", "x", "short"),
            Err(AdminError::Password(AuthError::WeakPassword(_)))
        ));
    }
}
