//! Shared application state.

use domain::{
    AuthService, CartService, CatalogService, CheckoutService, OrderService, TokenIssuer,
    UserService,
};
use store::CommerceStore;

use crate::config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CommerceStore> {
    pub auth: AuthService<S>,
    pub carts: CartService<S>,
    pub checkout: CheckoutService<S>,
    pub orders: OrderService<S>,
    pub catalog: CatalogService<S>,
    pub users: UserService<S>,
}

impl<S: CommerceStore + Clone> AppState<S> {
    /// Wires every service to `store` using the pricing and token settings
    /// from `config`.
    pub fn new(store: S, config: &Config) -> Self {
        let tokens = TokenIssuer::new(&config.jwt_secret, config.token_ttl());
        Self {
            auth: AuthService::new(store.clone(), tokens),
            carts: CartService::with_pricing(store.clone(), config.summary_pricing()),
            checkout: CheckoutService::with_pricing(store.clone(), config.checkout_pricing()),
            orders: OrderService::new(store.clone()),
            catalog: CatalogService::new(store.clone()),
            users: UserService::new(store),
        }
    }
}
