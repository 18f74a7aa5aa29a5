pub mod aggregate;
pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod lookup;
pub mod model;
pub mod selector;
pub mod service;
