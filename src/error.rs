use thiserror::Error;

/// Failure to retrieve a remote resource (feed page or forecast payload).
#[derive(Debug, Error)]
pub enum FetchError {
    /// The resource does not exist. For the feed this means we ran past the last page.
    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Bad response fetching {url}: {status}")]
    Status { url: String, status: u16 },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::NotFound { .. } => Some(404),
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed feed: {0}")]
    Xml(#[from] quick_xml::de::DeError),

    #[error("Post is missing <{field}>")]
    MissingField { field: &'static str },

    #[error("Unable to parse guid from url {0:?}")]
    Guid(String),

    #[error("Unable to parse timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum SnatchError {
    #[error("Bad response snatching photo: {0}")]
    Status(u16),

    #[error("Photo request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Photo write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Refusing to write photo to {0:?}")]
    InvalidFilename(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Could not encode/decode column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bad stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Everything that can sink a single-page ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, IngestError::Fetch(e) if e.is_not_found())
    }
}
