//! Typed failures of the story pipeline.
//!
//! Every kind maps to one containment scope: configuration errors stop the
//! process, story errors abandon one summary, mapping errors abandon one
//! language, task and download errors skip one image.

/// Specific error conditions raised by the pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum StoryErrorKind {
    /// Missing or placeholder credentials / endpoints
    #[display("Configuration error: {}", _0)]
    Configuration(String),
    /// The remote queue never handed out a task id
    #[display("Image task creation failed after {} attempt(s): {}", attempts, detail)]
    TaskCreationFailed {
        /// Attempts spent
        attempts: u32,
        /// Last failure detail (includes the prompt for rejected prompts)
        detail: String,
    },
    /// The task never reached a terminal state within the poll budget
    #[display("Task {} did not finish after {} poll(s)", task_id, attempts)]
    PollingExhausted {
        /// Remote task id
        task_id: String,
        /// Polls spent
        attempts: u32,
    },
    /// The task completed but exposed no usable URL
    #[display("Task {} completed without result URLs", task_id)]
    NoResultsFound {
        /// Remote task id
        task_id: String,
    },
    /// The remote service declared the task dead (or answered an unknown state)
    #[display("Task {} ended in state '{}': {}", task_id, status, message)]
    RemoteTaskFailed {
        /// Remote task id
        task_id: String,
        /// Status string as reported
        status: String,
        /// Remote error message
        message: String,
    },
    /// No chapter title could be recovered from the planning answer
    #[display("No chapter titles could be extracted for '{}'", _0)]
    TitleGenerationFailed(String),
    /// One chapter answer was rejected, the whole story is abandoned
    #[display("Chapter {} ('{}') was rejected: {}", index, title, reason)]
    ChapterGenerationFailed {
        /// 1-based chapter index
        index: usize,
        /// Chapter title
        title: String,
        /// Why the answer was rejected
        reason: String,
    },
    /// The name mapping answer is not a parseable record
    #[display("Name mapping for {} could not be parsed: {}", language, detail)]
    NameMappingParse {
        /// Target language display name
        language: String,
        /// Parser detail
        detail: String,
    },
    /// One result URL could not be saved
    #[display("Download of {} failed after {} attempt(s): {}", url, attempts, detail)]
    DownloadFailed {
        /// Result URL
        url: String,
        /// Attempts spent
        attempts: u32,
        /// Last failure cause
        detail: String,
    },
}

/// Pipeline error with the source location where it was raised.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("{}", kind)]
pub struct StoryError {
    /// The specific error condition
    pub kind: StoryErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl StoryError {
    #[track_caller]
    pub fn new(kind: StoryErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    #[track_caller]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(StoryErrorKind::Configuration(message.into()))
    }

    pub fn kind(&self) -> &StoryErrorKind {
        &self.kind
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.kind, StoryErrorKind::Configuration(_))
    }
}

/// Finds the typed pipeline error inside an `anyhow` chain, if any.
pub fn story_error_kind(err: &anyhow::Error) -> Option<&StoryErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<StoryError>())
        .map(StoryError::kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_display_uses_kind_message() {
        let err = StoryError::new(StoryErrorKind::NoResultsFound {
            task_id: "abc".to_string(),
        });
        assert_eq!(err.to_string(), "Task abc completed without result URLs");
        assert!(err.file.ends_with("error.rs"));
    }

    #[test]
    fn test_kind_survives_anyhow_context() {
        let result: anyhow::Result<()> = Err(StoryError::configuration("missing key"))
            .context("while submitting");
        let err = result.unwrap_err();
        assert!(matches!(
            story_error_kind(&err),
            Some(StoryErrorKind::Configuration(_))
        ));
    }

    #[test]
    fn test_plain_anyhow_has_no_kind() {
        let err = anyhow::anyhow!("io failure");
        assert!(story_error_kind(&err).is_none());
    }
}
