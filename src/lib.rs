pub mod app;
pub mod cli;
pub mod config;
pub mod constituents;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod records;
pub mod report;
pub mod utils;

pub use error::{AppError, Result};
