use std::path::PathBuf;

/// Everything that can stop a build, a cache read, or a categorization run.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unrecognised publication date {value:?}")]
    InvalidDate { value: String },

    #[error("year {year} appears in both {first} and {second}")]
    DuplicateYear {
        year: i32,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("themes error: {0}")]
    Themes(String),

    #[error("categorization error: {0}")]
    Categorization(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
}

impl ReportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        ReportError::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
