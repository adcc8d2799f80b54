//! Error taxonomy for console workflows.
//!
//! Collaborator adapters speak `anyhow`; workflows translate those failures
//! into one of these variants so the dispatcher can report them uniformly.
use std::fmt;
use thiserror::Error;

/// Stage of the HIT creation transaction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    Validating,
    AdRegistering,
    HitCreating,
    Binding,
}

impl CreateStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreateStage::Validating => "validating",
            CreateStage::AdRegistering => "ad registration",
            CreateStage::HitCreating => "hit creation",
            CreateStage::Binding => "ad binding",
        }
    }
}

impl fmt::Display for CreateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Operator input rejected on a non-interactive path.
    #[error("{0}")]
    Invalid(String),

    /// Prompting gave up; nothing outside the prompt loop was touched.
    #[error("{reason} No changes made.")]
    Aborted { reason: String },

    /// The request conflicts with current remote or ledger state.
    #[error("{0}")]
    Refused(String),

    #[error("{context}: {detail}")]
    Remote { context: String, detail: String },

    #[error("sorry, there was an error creating hit and registering ad ({stage} failed: {detail})")]
    Transaction { stage: CreateStage, detail: String },

    #[error("`{0}` needs network mode (restart without --offline)")]
    Unavailable(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConsoleError {
    /// Wrap a collaborator failure, flattening its context chain.
    pub fn remote(context: impl Into<String>, err: anyhow::Error) -> Self {
        ConsoleError::Remote {
            context: context.into(),
            detail: format!("{err:#}"),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        ConsoleError::Aborted {
            reason: reason.into(),
        }
    }
}

pub type ConsoleResult<T> = std::result::Result<T, ConsoleError>;
