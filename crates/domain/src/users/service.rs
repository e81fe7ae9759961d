//! User administration service.

use common::UserId;
use store::{CommerceStore, NewUser, Role, User, UserQuery, UserUpdate};

use crate::auth::{
    email_conflict, hash_password, normalize_email, validate_email, validate_names,
    validate_password,
};
use crate::error::CommerceError;
use crate::pagination::Pagination;

use super::{AccountUpdate, NewAccount, UserFilter, UserListing};

/// Service behind the back-office user endpoints.
///
/// Accounts are never deleted: orders and carts keep referring to them, so
/// removal deactivates the account, which blocks further logins.
pub struct UserService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> UserService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filter: UserFilter) -> Result<UserListing, CommerceError> {
        let (page, limit) = filter.paging();

        let mut query = UserQuery::new().page(page, limit);
        if let Some(role) = filter.role {
            query = query.role(role);
        }
        if let Some(is_active) = filter.is_active {
            query = query.is_active(is_active);
        }
        if let Some(search) = filter.search {
            query = query.search(search);
        }

        let result = self.store.list_users(query).await?;
        Ok(UserListing {
            users: result.users,
            pagination: Pagination::new(page, limit, result.total),
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: UserId) -> Result<User, CommerceError> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, account: NewAccount) -> Result<User, CommerceError> {
        let email = normalize_email(&account.email);
        validate_names(&account.first_name, &account.last_name)?;
        validate_email(&email)?;
        validate_password(&account.password)?;

        let user = self
            .store
            .insert_user(NewUser {
                first_name: account.first_name.trim().to_string(),
                last_name: account.last_name.trim().to_string(),
                email,
                password_hash: hash_password(&account.password)?,
                phone: account.phone.filter(|p| !p.trim().is_empty()),
                role: account.role,
                is_active: account.is_active,
            })
            .await
            .map_err(email_conflict)?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), "user created by admin");
        Ok(user)
    }

    /// Applies a partial update on behalf of the administrator `acting`.
    ///
    /// Administrators cannot demote or deactivate their own account.
    #[tracing::instrument(skip(self))]
    pub async fn update(
        &self,
        acting: UserId,
        id: UserId,
        update: AccountUpdate,
    ) -> Result<User, CommerceError> {
        if id == acting && (update.role == Some(Role::User) || update.is_active == Some(false)) {
            return Err(self_lockout());
        }

        let first_name = update.first_name.map(|n| n.trim().to_string());
        let last_name = update.last_name.map(|n| n.trim().to_string());
        if first_name.as_deref().is_some_and(str::is_empty)
            || last_name.as_deref().is_some_and(str::is_empty)
        {
            return Err(CommerceError::validation(
                "First name and last name are required",
            ));
        }

        let email = update.email.as_deref().map(normalize_email);
        if let Some(ref email) = email {
            validate_email(email)?;
        }

        let password_hash = match update.password.as_deref() {
            Some(password) if !password.is_empty() => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            _ => None,
        };

        let user = self
            .store
            .update_user(
                id,
                UserUpdate {
                    first_name,
                    last_name,
                    email,
                    password_hash,
                    phone: update.phone,
                    role: update.role,
                    is_active: update.is_active,
                },
            )
            .await
            .map_err(email_conflict)?;

        tracing::info!(user_id = %id, admin_id = %acting, "user updated by admin");
        Ok(user)
    }

    /// Deactivates an account. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, acting: UserId, id: UserId) -> Result<User, CommerceError> {
        if id == acting {
            return Err(self_lockout());
        }

        let user = self
            .store
            .update_user(
                id,
                UserUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        tracing::info!(user_id = %id, admin_id = %acting, "user deactivated");
        Ok(user)
    }
}

fn not_found(id: UserId) -> CommerceError {
    CommerceError::NotFound(format!("User not found: {id}"))
}

fn self_lockout() -> CommerceError {
    CommerceError::Forbidden("Administrators cannot demote or deactivate themselves".to_string())
}

#[cfg(test)]
mod tests {
    use store::InMemoryStore;

    use super::*;
    use crate::auth::{AuthService, Credentials, TokenIssuer};

    fn account(email: &str) -> NewAccount {
        NewAccount {
            first_name: "Rina".to_string(),
            last_name: "Wati".to_string(),
            email: email.to_string(),
            password: "secret123".to_string(),
            phone: None,
            role: Role::User,
            is_active: true,
        }
    }

    fn auth(store: &InMemoryStore) -> AuthService<InMemoryStore> {
        AuthService::new(
            store.clone(),
            TokenIssuer::new("test-secret", chrono::Duration::hours(1)),
        )
    }

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: password.to_string(),
            guest_cart: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn create_hashes_password_and_keeps_role() {
        let store = InMemoryStore::new();
        let users = UserService::new(store.clone());

        let user = users
            .create(NewAccount {
                role: Role::Admin,
                ..account(" Rina@Example.com ")
            })
            .await
            .unwrap();
        assert_eq!(user.email, "rina@example.com");
        assert_eq!(user.role, Role::Admin);
        assert_ne!(user.password_hash, "secret123");

        let err = users.create(account("rina@example.com")).await.unwrap_err();
        assert_eq!(err.code(), "conflict");

        let err = users
            .create(NewAccount {
                password: "123".to_string(),
                ..account("other@example.com")
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[tokio::test]
    async fn deactivated_account_cannot_log_in() {
        let store = InMemoryStore::new();
        let users = UserService::new(store.clone());
        let admin = users
            .create(NewAccount {
                role: Role::Admin,
                ..account("admin@example.com")
            })
            .await
            .unwrap();
        let rina = users.create(account("rina@example.com")).await.unwrap();

        let rina = users.deactivate(admin.id, rina.id).await.unwrap();
        assert!(!rina.is_active);

        let err = auth(&store)
            .login(credentials("rina@example.com", "secret123"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[tokio::test]
    async fn admins_cannot_lock_themselves_out() {
        let store = InMemoryStore::new();
        let users = UserService::new(store.clone());
        let admin = users
            .create(NewAccount {
                role: Role::Admin,
                ..account("admin@example.com")
            })
            .await
            .unwrap();

        let err = users.deactivate(admin.id, admin.id).await.unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let err = users
            .update(
                admin.id,
                admin.id,
                AccountUpdate {
                    role: Some(Role::User),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        // Other fields of one's own account stay editable
        let updated = users
            .update(
                admin.id,
                admin.id,
                AccountUpdate {
                    first_name: Some("Kepala".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Kepala");
        assert_eq!(updated.role, Role::Admin);
    }

    #[tokio::test]
    async fn empty_password_keeps_the_current_one() {
        let store = InMemoryStore::new();
        let users = UserService::new(store.clone());
        let rina = users.create(account("rina@example.com")).await.unwrap();

        users
            .update(
                UserId::new(999),
                rina.id,
                AccountUpdate {
                    password: Some(String::new()),
                    phone: Some("0813555000".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        auth(&store)
            .login(credentials("rina@example.com", "secret123"))
            .await
            .unwrap();

        users
            .update(
                UserId::new(999),
                rina.id,
                AccountUpdate {
                    password: Some("new-secret".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        auth(&store)
            .login(credentials("rina@example.com", "new-secret"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_to_taken_email_is_conflict() {
        let store = InMemoryStore::new();
        let users = UserService::new(store.clone());
        let rina = users.create(account("rina@example.com")).await.unwrap();
        users.create(account("budi@example.com")).await.unwrap();

        let err = users
            .update(
                UserId::new(999),
                rina.id,
                AccountUpdate {
                    email: Some("BUDI@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn list_filters_by_role_and_search() {
        let store = InMemoryStore::new();
        let users = UserService::new(store.clone());
        users.create(account("rina@example.com")).await.unwrap();
        users.create(account("budi@example.com")).await.unwrap();
        users
            .create(NewAccount {
                role: Role::Admin,
                ..account("admin@example.com")
            })
            .await
            .unwrap();

        let listing = users
            .list(UserFilter {
                role: Some(Role::User),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listing.pagination.total, 2);

        let listing = users
            .list(UserFilter {
                search: Some("budi".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listing.users.len(), 1);
        assert_eq!(listing.users[0].email, "budi@example.com");

        let missing = users.get(UserId::new(404)).await;
        assert!(matches!(missing, Err(CommerceError::NotFound(_))));
    }
}
