use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReminderError {
    /// Prayer times could not be produced for the requested date.
    #[error("COMPUTATION_FAILED: {0}")]
    Computation(String),
    /// A single schedule, cancel or listing call was rejected by the platform.
    #[error("PLATFORM_SCHEDULE_FAILED: {0}")]
    PlatformSchedule(String),
    #[error("PERSISTENCE_FAILED: {0}")]
    Persistence(String),
    #[error("INVALID_ACTION: {0}")]
    InvalidAction(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
}

impl From<std::io::Error> for ReminderError {
    fn from(value: std::io::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<serde_json::Error> for ReminderError {
    fn from(value: serde_json::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

pub type ReminderResult<T> = Result<T, ReminderError>;
