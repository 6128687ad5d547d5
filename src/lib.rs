pub mod catalog;
pub mod clients;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod sync;

pub use config::Config;
pub use models::{Result, SyncError};
