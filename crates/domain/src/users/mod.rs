//! Back-office management of user accounts.

mod service;

pub use service::UserService;

use serde::{Deserialize, Serialize};
use store::{Role, User};

use crate::pagination::{self, Pagination};

/// Query parameters of the user listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Matched against first name, last name and email.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl UserFilter {
    pub fn paging(&self) -> (usize, usize) {
        pagination::resolve(self.page, self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserListing {
    pub users: Vec<User>,
    pub pagination: Pagination,
}

/// Account created by an administrator. Unlike self-registration it may
/// pick the role and start out deactivated.
#[derive(Clone, Deserialize)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl std::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccount")
            .field("email", &self.email)
            .field("role", &self.role)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

/// Partial account update. An absent or empty password keeps the current
/// one.
#[derive(Clone, Default, Deserialize)]
pub struct AccountUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl std::fmt::Debug for AccountUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountUpdate")
            .field("email", &self.email)
            .field("role", &self.role)
            .field("is_active", &self.is_active)
            .field(
                "password_changed",
                &self.password.as_ref().is_some_and(|p| !p.is_empty()),
            )
            .finish_non_exhaustive()
    }
}

fn default_true() -> bool {
    true
}
