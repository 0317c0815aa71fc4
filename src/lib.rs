pub mod api;
pub mod clock;
pub mod config;
pub mod filter;
pub mod humanize;
pub mod ingest;
pub mod observability;
pub mod quota;
pub mod record;
pub mod service;
pub mod session;
pub mod store;
