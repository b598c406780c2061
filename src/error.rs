//! Crate-level error with stable codes.

use crate::artifact::ArtifactError;
use crate::client::{ClientBuildError, GenerateError};
use crate::planner::PlanError;
use crate::prompt::{PromptError, TemplateError};
use crate::scanner::ScanError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("prompt could not be rendered: {0}")]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Prompt(PromptError),
    #[error(transparent)]
    Generation(#[from] GenerateError),
    #[error(transparent)]
    Client(#[from] ClientBuildError),
}

impl From<PromptError> for Error {
    fn from(e: PromptError) -> Self {
        match e {
            PromptError::Template(t) => Error::Template(t),
            other => Error::Prompt(other),
        }
    }
}

impl Error {
    /// Stable identifier for callers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Scan(_) => "scan_failed",
            Error::Plan(_) => "plan_failed",
            Error::Artifact(ArtifactError::Unsafe(_)) => "unsafe_path",
            Error::Artifact(_) => "artifact_io",
            Error::Template(_) => "template_render",
            Error::Prompt(_) => "prompt_io",
            Error::Generation(e) => e.code(),
            Error::Client(_) => "client_config",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Generation(e) if e.is_cancelled())
    }
}
