use thiserror::Error;

/// Everything that can end a generation cycle in the `Failed` phase.
///
/// The `Display` text is what the user sees, so `Upstream` renders the raw
/// response body and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("No scenarios found for \"{term}\".")]
    NoScenarios { term: String },

    #[error("Pick a term first.")]
    NoTermSelected,

    #[error("{body}")]
    Upstream { status: u16, body: String },

    #[error("{0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Transport(String),
}

impl GenerateError {
    pub fn no_image_data() -> Self {
        Self::MalformedResponse("No image data".to_string())
    }

    /// Short machine-readable tag, used in logs and API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoScenarios { .. } => "no_scenarios",
            Self::NoTermSelected => "no_term_selected",
            Self::Upstream { .. } => "upstream",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Transport(_) => "transport",
        }
    }
}

impl From<reqwest::Error> for GenerateError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.without_url().to_string())
    }
}
