//! Registration, login and bearer tokens.

mod password;
mod token;

pub use password::{MIN_PASSWORD_LENGTH, hash_password, verify_password};
pub use token::{Claims, DEFAULT_TOKEN_TTL_HOURS, MAX_TOKEN_TTL_HOURS, TokenIssuer};

use common::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use store::{CommerceStore, NewUser, Role, StoreError, User, error::USERS_EMAIL_KEY};

use crate::error::CommerceError;
use crate::guest_cart::{GuestCartMerger, MergeReport};

/// Sign-up form.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Login form. `guest_cart` carries the anonymous cart kept by the client.
///
/// It is taken as raw JSON so that a missing, `null` or malformed guest cart
/// never rejects the login itself.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub guest_cart: Value,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("guest_cart", &!self.guest_cart.is_null())
            .finish_non_exhaustive()
    }
}

/// A user together with a freshly issued access token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    /// Present when a guest cart was submitted at login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_cart: Option<MergeReport>,
}

/// Account management and authentication.
pub struct AuthService<S: CommerceStore> {
    store: S,
    tokens: TokenIssuer,
    merger: GuestCartMerger<S>,
}

impl<S: CommerceStore + Clone> AuthService<S> {
    pub fn new(store: S, tokens: TokenIssuer) -> Self {
        Self {
            merger: GuestCartMerger::new(store.clone()),
            store,
            tokens,
        }
    }
}

impl<S: CommerceStore> AuthService<S> {
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Creates a customer account and signs it in.
    #[tracing::instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: Registration) -> Result<AuthResponse, CommerceError> {
        let email = normalize_email(&registration.email);
        validate_registration(&registration, &email)?;

        let password_hash = hash_password(&registration.password)?;
        let user = self
            .store
            .insert_user(NewUser {
                first_name: registration.first_name.trim().to_string(),
                last_name: registration.last_name.trim().to_string(),
                email,
                password_hash,
                phone: registration.phone.filter(|p| !p.trim().is_empty()),
                role: Role::User,
                is_active: true,
            })
            .await
            .map_err(email_conflict)?;

        tracing::info!(user_id = %user.id, "user registered");
        let token = self.tokens.issue(&user)?;
        Ok(AuthResponse {
            user,
            token,
            guest_cart: None,
        })
    }

    /// Checks credentials, merges the guest cart and issues a token.
    ///
    /// The merge never fails the login; its per-entry outcome is returned
    /// alongside the token.
    #[tracing::instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: Credentials) -> Result<AuthResponse, CommerceError> {
        let email = normalize_email(&credentials.email);
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .filter(|user| verify_password(&credentials.password, &user.password_hash))
            .ok_or_else(|| CommerceError::Unauthorized("Invalid email or password".to_string()))?;

        if !user.is_active {
            tracing::info!(user_id = %user.id, "login refused for inactive account");
            return Err(CommerceError::Unauthorized(
                "Account is deactivated".to_string(),
            ));
        }

        let guest_cart = self
            .merger
            .merge_submitted(user.id, &credentials.guest_cart)
            .await;

        tracing::info!(user_id = %user.id, "user logged in");
        let token = self.tokens.issue(&user)?;
        Ok(AuthResponse {
            user,
            token,
            guest_cart,
        })
    }

    /// Verifies a bearer token.
    pub fn authenticate(&self, token: &str) -> Result<Claims, CommerceError> {
        self.tokens.verify(token)
    }

    /// Loads the signed-in user's profile.
    #[tracing::instrument(skip(self))]
    pub async fn profile(&self, user_id: UserId) -> Result<User, CommerceError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound(format!("User not found: {user_id}")))
    }

    /// Creates an administrator account unless the email is already taken.
    ///
    /// Returns the existing user untouched when it is.
    #[tracing::instrument(skip(self, password))]
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<User, CommerceError> {
        let email = normalize_email(email);
        if let Some(existing) = self.store.find_user_by_email(&email).await? {
            if existing.role != Role::Admin {
                tracing::warn!(user_id = %existing.id, "bootstrap admin email belongs to a customer");
            }
            return Ok(existing);
        }

        let user = self
            .store
            .insert_user(NewUser {
                first_name: "Admin".to_string(),
                last_name: String::new(),
                email,
                password_hash: hash_password(password)?,
                phone: None,
                role: Role::Admin,
                is_active: true,
            })
            .await?;
        tracing::info!(user_id = %user.id, "bootstrap admin created");
        Ok(user)
    }
}

/// Reports a taken email as a conflict.
pub(crate) fn email_conflict(e: StoreError) -> CommerceError {
    if e.is_unique_violation(USERS_EMAIL_KEY) {
        return CommerceError::Conflict("Email already registered".to_string());
    }
    e.into()
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn validate_names(first_name: &str, last_name: &str) -> Result<(), CommerceError> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(CommerceError::validation(
            "First name and last name are required",
        ));
    }
    Ok(())
}

/// Expects an already normalized address.
pub(crate) fn validate_email(email: &str) -> Result<(), CommerceError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(CommerceError::validation("Email address is invalid"));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), CommerceError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CommerceError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_registration(registration: &Registration, email: &str) -> Result<(), CommerceError> {
    validate_names(&registration.first_name, &registration.last_name)?;
    validate_email(email)?;
    validate_password(&registration.password)
}
