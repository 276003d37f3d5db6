//! Client data core for the gestor business-management suite.
//!
//! Every domain entity lives as a row in the hosted platform's relational
//! store; this crate mirrors those rows into observable local state and owns
//! the write paths the UI calls. There is no embedded database and no server
//! surface here: the platform provides storage, auth, realtime change feeds
//! and serverless functions, and this crate consumes them.

pub mod auth;
pub mod clients;
pub mod config;
pub mod finance;
pub mod invoicing;
pub mod platform;
pub mod products;
pub mod profiles;
pub mod sales;
pub mod shared;
pub mod store;
pub mod support;

pub use crate::config::AppConfig;
pub use crate::shared::error::StoreError;
pub use crate::shared::state::AppState;
