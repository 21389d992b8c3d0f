use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
