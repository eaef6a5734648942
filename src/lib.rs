pub mod chain;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod ingest;
pub mod model;
pub mod resolve;
pub mod store;
pub mod util;
