use hostgraph_core::{PluginId, ProcessMode};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Routing graph has not been created")]
    NotCreated,

    #[error("Routing graph is already created")]
    AlreadyCreated,

    #[error("Routing graph was destroyed")]
    Destroyed,

    #[error("Rack mode needs 2 audio inputs and 2 audio outputs, got {0}/{1}")]
    InvalidRackShape(usize, usize),

    #[error("Plugin {0} not found")]
    PluginNotFound(PluginId),

    #[error("Plugin limit ({0}) reached")]
    TooManyPlugins(usize),

    #[error("Plugin '{name}' cannot be used in {mode:?} mode: {reason}")]
    UnsupportedPlugin {
        name: String,
        mode: ProcessMode,
        reason: &'static str,
    },

    #[error("Audio thread did not stop within {0:?}")]
    RunnerTimeout(Duration),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Buffer size {0} is invalid")]
    InvalidBufferSize(usize),

    #[error("Plugin name must not be empty")]
    EmptyName,
}

pub type Result<T> = core::result::Result<T, Error>;
