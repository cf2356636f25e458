use std::path::PathBuf;

use thiserror::Error;

use crate::CollectiveFunction;

#[derive(Debug, Error)]
pub enum Error {
    #[error("fail to load tuner plugin {path:?}: {reason}")]
    PluginLoad { path: PathBuf, reason: String },
    #[error("tuner plugin init returned status {0}")]
    PluginInit(i32),
    #[error("tuner plugin getCollInfo({function}, {message_size}) returned status {code}")]
    PluginQuery {
        function: CollectiveFunction,
        message_size: usize,
        code: i32,
    },
    #[error("tuner plugin destroy returned status {0}")]
    PluginDestroy(i32),
    #[error("tuner plugin is not initialized")]
    NotInitialized,
    #[error("invalid cluster shape: {0} ranks per node, {1} nodes")]
    InvalidShape(usize, usize),
    #[error("invalid message size range: [{0}, {1}]")]
    InvalidRange(usize, usize),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
