//! Domain error types.

/// Top-level error type for botsim.
#[derive(Debug, thiserror::Error)]
pub enum BotsimError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("market data error: {reason}")]
    MarketData { reason: String, retryable: bool },

    #[error("position already open for {instrument}")]
    DuplicatePosition { instrument: String },

    #[error("no open position for {instrument}")]
    NoOpenPosition { instrument: String },

    #[error("no observed price for {instrument}")]
    NoPrice { instrument: String },

    #[error("insufficient cash: need {needed:.6}, have {available:.6}")]
    InsufficientCash { needed: f64, available: f64 },

    #[error("invalid cash movement: {amount}")]
    InvalidCashMovement { amount: f64 },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BotsimError {
    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        BotsimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(section: &str, key: &str) -> Self {
        BotsimError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    /// Only transient market-data failures are worth retrying by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BotsimError::MarketData {
                retryable: true,
                ..
            }
        )
    }

    /// Programming-contract failures of the position state machine.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            BotsimError::DuplicatePosition { .. }
                | BotsimError::NoOpenPosition { .. }
                | BotsimError::NoPrice { .. }
                | BotsimError::InsufficientCash { .. }
                | BotsimError::InvalidCashMovement { .. }
        )
    }
}

impl From<&BotsimError> for std::process::ExitCode {
    fn from(err: &BotsimError) -> Self {
        let code: u8 = match err {
            BotsimError::Io(_) => 1,
            BotsimError::ConfigParse { .. }
            | BotsimError::ConfigMissing { .. }
            | BotsimError::ConfigInvalid { .. }
            | BotsimError::UnknownStrategy { .. } => 2,
            BotsimError::MarketData { .. } => 3,
            BotsimError::DuplicatePosition { .. }
            | BotsimError::NoOpenPosition { .. }
            | BotsimError::NoPrice { .. }
            | BotsimError::InsufficientCash { .. }
            | BotsimError::InvalidCashMovement { .. } => 4,
            BotsimError::Report { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
