//! Command handling infrastructure for the cart aggregate.

use common::UserId;
use store::{
    Cart, CartChange, CommerceStore, CommerceStoreExt, StoreError,
    error::CART_ITEMS_CART_PRODUCT_KEY,
};

use crate::cart::{CartAggregate, CartError};
use crate::error::CommerceError;

/// Number of times a command is attempted when it loses a concurrent write.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// The cart after applying the changes.
    pub cart: Cart,

    /// The changes that were persisted. Empty if the command was a no-op.
    pub changes: Vec<CartChange>,
}

/// Handler for executing commands against a user's active cart.
///
/// The handler is responsible for:
/// 1. Loading (or lazily creating) the active cart with its version
/// 2. Executing the command to produce changes
/// 3. Applying the changes with optimistic concurrency
/// 4. Reloading and re-running the command when another writer won
pub struct CommandHandler<S: CommerceStore> {
    store: S,
    max_attempts: usize,
}

impl<S: CommerceStore> CommandHandler<S> {
    /// Creates a new command handler with the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Overrides the number of attempts per command.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads the user's active cart, creating it if absent.
    pub async fn load(&self, user_id: UserId) -> Result<CartAggregate, CommerceError> {
        let cart = self.store.find_or_create_active_cart(user_id).await?;
        Ok(CartAggregate::new(cart))
    }

    /// Executes a command and persists the resulting changes.
    ///
    /// The command function receives the current aggregate and returns the
    /// changes to apply, or an error. It may run more than once.
    pub async fn execute<F>(
        &self,
        user_id: UserId,
        command_fn: F,
    ) -> Result<CommandResult, CommerceError>
    where
        F: Fn(&CartAggregate) -> Result<Vec<CartChange>, CartError>,
    {
        let mut attempt = 1;
        loop {
            let aggregate = self.load(user_id).await?;
            let changes = command_fn(&aggregate)?;

            if changes.is_empty() {
                return Ok(CommandResult {
                    cart: aggregate.into_cart(),
                    changes,
                });
            }

            match self
                .store
                .apply_cart_changes(aggregate.id(), changes.clone(), aggregate.version())
                .await
            {
                Ok(cart) => return Ok(CommandResult { cart, changes }),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    metrics::counter!("cart_conflict_retries_total").increment(1);
                    tracing::debug!(%user_id, attempt, error = %e, "cart write lost a race, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Errors caused by a concurrent writer rather than by the command itself.
fn is_retryable(e: &StoreError) -> bool {
    matches!(
        e,
        StoreError::ConcurrencyConflict { .. } | StoreError::CartInactive(_)
    ) || e.is_unique_violation(CART_ITEMS_CART_PRODUCT_KEY)
}
