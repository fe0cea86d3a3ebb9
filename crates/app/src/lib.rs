pub mod config;
pub mod models;
pub mod service;

pub use config::{ConfigError, ConfigLoader, Settings};
pub use models::{ImportResult, MonthlySummary};
pub use service::{ServiceError, TransactionService};
