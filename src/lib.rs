//! EcoTrack client: report, follow and resolve civic issues from the terminal.
pub mod activity;
pub mod admin;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod forms;
pub mod local_store;
pub mod map;
mod metrics;
mod middleware;
pub mod models;
pub mod notify;
pub mod report_view;
pub mod routes;
pub mod session;
mod shell;

pub use error::Error;
pub use shell::run;

/// Result of every fallible client operation.
pub type Result<T> = std::result::Result<T, Error>;
