use thiserror::Error;

pub type SimulatorResult<T> = Result<T, SimulatorError>;

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("simulator command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation not supported by driver: {0}")]
    Unsupported(String),
    #[error("unexpected command output: {0}")]
    Output(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("launch of {bundle_id} aborted: {reason}")]
    LaunchAborted { bundle_id: String, reason: String },
}

impl SimulatorError {
    pub fn is_launch_abort(&self) -> bool {
        matches!(self, SimulatorError::LaunchAborted { .. })
    }
}
