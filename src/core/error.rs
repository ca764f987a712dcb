use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {}: {reason}", path.display())]
    Ingest { path: PathBuf, reason: String },

    #[error("unexpected data shape: {0}")]
    DataShape(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Config,
    Ingest,
    DataShape,
    Unexpected,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Config => "configuration",
            ErrorClass::Ingest => "ingestion",
            ErrorClass::DataShape => "data-shape",
            ErrorClass::Unexpected => "unexpected",
        }
    }

    /// Walks the context chain and returns the class of the first
    /// `PipelineError` found, `Unexpected` when there is none.
    pub fn of(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|e| e.downcast_ref::<PipelineError>())
            .map(|e| match e {
                PipelineError::Config(_) => ErrorClass::Config,
                PipelineError::Ingest { .. } => ErrorClass::Ingest,
                PipelineError::DataShape(_) => ErrorClass::DataShape,
            })
            .unwrap_or(ErrorClass::Unexpected)
    }
}

pub fn ingest_error(path: impl Into<PathBuf>, reason: impl Into<String>) -> PipelineError {
    PipelineError::Ingest {
        path: path.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn class_is_found_through_context() {
        let err: anyhow::Result<()> =
            Err(PipelineError::DataShape("no reads".into())).context("stage stats failed");
        let err = err.unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::DataShape);
    }

    #[test]
    fn plain_errors_are_unexpected() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(ErrorClass::of(&err), ErrorClass::Unexpected);
        assert_eq!(ErrorClass::of(&err).as_str(), "unexpected");
    }

    #[test]
    fn ingest_message_names_the_file() {
        let err = ingest_error("reads.fastq", "truncated record");
        assert_eq!(err.to_string(), "failed to read reads.fastq: truncated record");
    }
}
