#![forbid(unsafe_code)]

pub mod baseline;
pub mod cli;
pub mod decoder;
pub mod error;
pub mod logging;
pub mod merge;
pub mod model;
pub mod reconcile;
pub mod scanner;
pub mod summary;
pub mod util;

pub use cli::run_from_env;
pub use error::{Result, StateError};
