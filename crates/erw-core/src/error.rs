//! Error types for erwstat

use std::fmt;
use thiserror::Error;

/// erwstat error type
#[derive(Error, Debug)]
pub enum Error {
    /// The lab observation sequence was empty.
    #[error("no lab records")]
    NoObservations,

    /// The optimizer stopped without meeting its convergence criteria.
    #[error("optimizer did not converge: {0}")]
    OptimizerDidNotConverge(String),

    /// Application rate or chemistry factor missing from the configuration.
    #[error("missing configuration parameter: {0}")]
    MissingConfigurationParameter(String),

    /// Posterior absent, or one of its fields null / unusable.
    #[error("missing or incomplete posterior: {0}")]
    MissingOrIncompletePosterior(String),

    /// Risk profile id not known to the caller's profile set.
    #[error("unknown risk profile: {0}")]
    UnknownRiskProfile(String),

    /// Summary requested over zero usable totals.
    #[error("no valid results")]
    EmptyEnsemble,

    /// Caller-supplied time or iteration budget exhausted.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable, machine-readable error kind.
///
/// Collaborators map these onto transport-level responses; the string codes
/// returned by [`ErrorKind::as_str`] never change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::NoObservations`].
    NoObservations,
    /// See [`Error::OptimizerDidNotConverge`].
    OptimizerDidNotConverge,
    /// See [`Error::MissingConfigurationParameter`].
    MissingConfigurationParameter,
    /// See [`Error::MissingOrIncompletePosterior`].
    MissingOrIncompletePosterior,
    /// See [`Error::UnknownRiskProfile`].
    UnknownRiskProfile,
    /// See [`Error::EmptyEnsemble`].
    EmptyEnsemble,
    /// See [`Error::BudgetExceeded`].
    BudgetExceeded,
    /// See [`Error::Validation`].
    Validation,
    /// See [`Error::Computation`].
    Computation,
    /// See [`Error::Io`].
    Io,
    /// See [`Error::Json`].
    Json,
}

impl ErrorKind {
    /// Snake-case code for logs and wire formats.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoObservations => "no_observations",
            ErrorKind::OptimizerDidNotConverge => "optimizer_did_not_converge",
            ErrorKind::MissingConfigurationParameter => "missing_configuration_parameter",
            ErrorKind::MissingOrIncompletePosterior => "missing_or_incomplete_posterior",
            ErrorKind::UnknownRiskProfile => "unknown_risk_profile",
            ErrorKind::EmptyEnsemble => "empty_ensemble",
            ErrorKind::BudgetExceeded => "budget_exceeded",
            ErrorKind::Validation => "validation",
            ErrorKind::Computation => "computation",
            ErrorKind::Io => "io",
            ErrorKind::Json => "json",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoObservations => ErrorKind::NoObservations,
            Error::OptimizerDidNotConverge(_) => ErrorKind::OptimizerDidNotConverge,
            Error::MissingConfigurationParameter(_) => ErrorKind::MissingConfigurationParameter,
            Error::MissingOrIncompletePosterior(_) => ErrorKind::MissingOrIncompletePosterior,
            Error::UnknownRiskProfile(_) => ErrorKind::UnknownRiskProfile,
            Error::EmptyEnsemble => ErrorKind::EmptyEnsemble,
            Error::BudgetExceeded(_) => ErrorKind::BudgetExceeded,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Computation(_) => ErrorKind::Computation,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
