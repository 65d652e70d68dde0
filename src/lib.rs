#![recursion_limit = "256"]

pub mod application;
pub mod cli;
pub mod config;
pub mod data;
pub mod distributed;
pub mod error;
pub mod infra;
pub mod ml;

pub use config::Config;
pub use error::{Error, Result};
