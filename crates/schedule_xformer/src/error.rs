use std::io;

use thiserror::Error;

use crate::logging::LoggingError;

#[derive(Debug, Error)]
pub enum XformerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("guidebook API request for {collection} failed with status {status}: {body}")]
    Status {
        collection: String,
        status: u16,
        body: String,
    },
    #[error("guidebook API rate limited {collection} without a usable Retry-After")]
    RateLimited { collection: String },
    #[error("failed to decode {resource}: {source}")]
    Decode {
        resource: String,
        payload: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("session {session_id} has unparseable {field} {value:?}: {source}")]
    Timestamp {
        session_id: i64,
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error("failed to load {stage} from Guidebook: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<XformerError>,
    },
}

impl XformerError {
    pub fn config<T: Into<String>>(message: T) -> Self {
        XformerError::Config(message.into())
    }

    pub fn in_stage(self, stage: &'static str) -> Self {
        XformerError::Stage {
            stage,
            source: Box::new(self),
        }
    }
}
