pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
pub use handlers::{register_routes, AppState};
pub use services::{Dispatcher, SubscriptionStore};
