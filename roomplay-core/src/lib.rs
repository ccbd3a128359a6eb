pub mod config;
pub mod controller;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod registry;
pub mod repository;
pub mod service;

pub use config::Config;
pub use error::{Error, Result};
