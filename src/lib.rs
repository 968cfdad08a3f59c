pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ipfs;
pub mod jobs;
pub mod ledger;
pub mod mailer;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod telemetry;
pub mod validation;
pub mod workers;

pub use workers::{default_handlers, Worker};
