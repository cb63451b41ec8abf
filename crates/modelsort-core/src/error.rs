use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors only. Anything scoped to a single file or a single group is
/// reported as a warning or a per-operation outcome instead of escalating.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot scan '{}': {reason}", .path.display())]
    Scan { path: PathBuf, reason: String },

    #[error("refusing to operate on protected path '{}'", .0.display())]
    ProtectedPath(PathBuf),

    #[error("plan file is malformed or stale: {0}")]
    PlanIntegrity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plan serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
