pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http_client;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{AppError, AppResult};
