pub mod config;

pub use config::{AdapterConfig, DATABASE_ENV, URI_ENV};
