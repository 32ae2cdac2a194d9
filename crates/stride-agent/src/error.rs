//! Error types for stride-agent

use thiserror::Error;

/// Result type alias using stride-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during agent operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the provider layer
    #[error(transparent)]
    Ai(#[from] stride_ai::Error),

    /// The reasoning step produced nothing the loop can act on
    #[error("Reasoning failure: {0}")]
    Reasoning(String),

    /// No eviction set exists for this window shape
    #[error(
        "Invalid history window: preserve_first ({preserve_first}) + preserve_last ({preserve_last}) exceeds max_trajectories ({max_trajectories})"
    )]
    WindowConfiguration {
        max_trajectories: usize,
        preserve_first: usize,
        preserve_last: usize,
    },

    /// Answer synthesis or batch summarization failed
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// An append would break a trajectory invariant
    #[error("Trajectory error: {0}")]
    Trajectory(String),

    /// A generic agent error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error is a configuration problem that retrying cannot fix
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::WindowConfiguration { .. } | Error::Ai(stride_ai::Error::InvalidConfig(_))
        )
    }
}
