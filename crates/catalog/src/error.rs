use common::error::diagnostics::DiagnosticMessage;
use shared_clients::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid database identifier: {context}")]
    InvalidName { context: DiagnosticMessage },
    #[error("schema extraction failed: {context}")]
    Extraction {
        context: DiagnosticMessage,
        #[source]
        source: Option<StoreError>,
    },
    #[error("serde error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    #[track_caller]
    pub fn invalid_name(message: impl Into<String>) -> Self {
        Self::InvalidName {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            context: DiagnosticMessage::new(message.into()),
            source: None,
        }
    }
}

impl From<StoreError> for CatalogError {
    #[track_caller]
    fn from(err: StoreError) -> Self {
        Self::Extraction {
            context: DiagnosticMessage::new(err.message().to_string()),
            source: Some(err),
        }
    }
}
