pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod grouper;
pub mod hasher;
pub mod plan;
pub mod progress;
pub mod resolver;
pub mod scanner;

pub use config::RunConfig;
pub use engine::OrganizeEngine;
pub use error::Error;
pub use executor::{ExecutionMode, ExecutionReport};
pub use plan::{Plan, PlanOperation};
pub use progress::{ProgressReporter, SilentReporter};
