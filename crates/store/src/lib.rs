pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    Address, Cart, CartChange, CartItem, CartItemRef, Category, NewCategory, NewOrder,
    NewOrderItem, NewProduct, NewUser, Order, OrderItem, OrderUpdate, Product, ProductUpdate,
    Role, ShippingAddress, User, UserUpdate, Version,
};
pub use postgres::PostgresStore;
pub use query::{OrderPage, OrderQuery, ProductPage, ProductQuery, UserPage, UserQuery};
pub use store::{CommerceStore, CommerceStoreExt};
