//! Error types for Mockpit

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MockError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not expected: {0}")]
    NotExpected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    RegexError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Control protocol error: {0}")]
    Control(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    Server(String),
}

impl MockError {
    /// HTTP status a control or dispatch route answers with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            MockError::InvalidInput(_) | MockError::NotExpected(_) => 400,
            MockError::NotFound(_) | MockError::ContainerNotFound(_) => 404,
            MockError::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// True for lookups that found nothing, including a Stop without a container
    pub fn is_not_found(&self) -> bool {
        matches!(self, MockError::NotFound(_) | MockError::ContainerNotFound(_))
    }
}

impl From<regex::Error> for MockError {
    fn from(err: regex::Error) -> Self {
        MockError::RegexError(err.to_string())
    }
}

impl From<bollard::errors::Error> for MockError {
    fn from(err: bollard::errors::Error) -> Self {
        MockError::Runtime(err.to_string())
    }
}

impl From<walkdir::Error> for MockError {
    fn from(err: walkdir::Error) -> Self {
        MockError::Parse(format!("Failed to walk examples: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, MockError>;
