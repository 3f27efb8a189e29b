use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Device link error: {0}")]
    Device(#[from] DeviceError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Transcription error: {0}")]
    Stt(#[from] SttError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Component failed health check: {component}")]
    HealthCheckFailed { component: String },

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device not found: {name:?}")]
    NotFound { name: Option<String> },

    #[error("No Bluetooth adapter available")]
    NoAdapter,

    #[error("Audio characteristic {uuid} not exposed by device")]
    CharacteristicMissing { uuid: String },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Fatal device error: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection closed")]
    Closed,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Send failed: {0}")]
    Send(String),
}

#[derive(Error, Debug)]
pub enum SttError {
    #[error("Failed to open provider connection: {0}")]
    Connect(String),

    #[error("Provider connection closed")]
    Closed,

    #[error("Provider rejected request: {0}")]
    Provider(String),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Intent classification failed: {0}")]
    Classification(String),

    #[error("Action logging failed: {0}")]
    Logging(String),
}

/// How the runtime should react to a given failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Drop the offending unit of work and keep going.
    Ignore,
    /// Tear down the session that observed the failure.
    Teardown,
    /// Unrecoverable: stop the process.
    Fatal,
}

impl AppError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            // Collaborator failures never take the audio pipeline down.
            AppError::Dispatch(_) => RecoveryStrategy::Ignore,
            // Connection-level failures end exactly one session.
            AppError::Transport(_) => RecoveryStrategy::Teardown,
            AppError::Stt(SttError::Connect(_)) => RecoveryStrategy::Teardown,
            AppError::Stt(_) => RecoveryStrategy::Teardown,
            AppError::Device(DeviceError::Disconnected) => RecoveryStrategy::Teardown,
            AppError::Device(_) => RecoveryStrategy::Teardown,
            AppError::Config(_) | AppError::Fatal(_) | AppError::ShutdownRequested => {
                RecoveryStrategy::Fatal
            }
            AppError::HealthCheckFailed { .. } => RecoveryStrategy::Teardown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_failures_are_absorbed() {
        let err = AppError::Dispatch(DispatchError::Classification("503".into()));
        assert_eq!(err.recovery_strategy(), RecoveryStrategy::Ignore);
    }

    #[test]
    fn transport_failures_tear_down_the_session() {
        let err = AppError::Transport(TransportError::Closed);
        assert_eq!(err.recovery_strategy(), RecoveryStrategy::Teardown);
    }

    #[test]
    fn startup_failures_escalate() {
        let err = AppError::Fatal("no config".into());
        assert_eq!(err.recovery_strategy(), RecoveryStrategy::Fatal);
    }
}
