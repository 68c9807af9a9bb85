use thiserror::Error;

/// Errors that stop the chat router from starting or serving
#[derive(Error, Debug)]
pub enum ChatRouterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] crate::config::ValidationError),

    #[error("Bots document {key} not found in the store")]
    BotsNotFound { key: String },

    #[error("Invalid bots document {key}: {source}")]
    InvalidBotsDocument {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
