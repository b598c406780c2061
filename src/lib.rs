pub mod artifact;
pub mod cli;
pub mod client;
pub mod config;
pub mod contract;
pub mod error;
pub mod ignore_chain;
pub mod load_config;
pub mod path_safety;
pub mod planner;
pub mod prompt;
pub mod scanner;
pub mod synchronise;

pub use error::{Error, Result};
