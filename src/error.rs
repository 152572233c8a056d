/// Error taxonomy for cluster lifecycle operations
use thiserror::Error;

use crate::api::API_GROUP;

/// Result type for yap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the decoder, the backend admins and the controller
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Backend CLI is not resolvable on PATH
    #[error("{tool} not installed. Please install {tool} with these instructions: {install_url}")]
    NotInstalled {
        tool: &'static str,
        install_url: &'static str,
    },

    /// Object does not exist in the backend
    #[error("{resource}.{group} \"{name}\" not found", group = API_GROUP)]
    NotFound { resource: String, name: String },

    /// A backend command ran and failed
    #[error("{operation}: {cause}")]
    Backend {
        operation: String,
        cause: Box<Error>,
    },

    /// Malformed or schema-mismatched configuration
    #[error("decoding {discriminator}: {message}")]
    Decode {
        discriminator: String,
        message: String,
    },

    /// Jointly invalid arguments or objects
    #[error("{0}")]
    Validation(String),

    /// External command exited unsuccessfully
    #[error("{program}: {message}")]
    Command { program: String, message: String },

    /// External command was cancelled before it completed
    #[error("{program}: cancelled")]
    Cancelled { program: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Not-found error for a cluster
    pub fn cluster_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "clusters".to_string(),
            name: name.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Wrap a failure with the backend operation that was attempted
    pub fn backend(operation: impl Into<String>, cause: Error) -> Self {
        Self::Backend {
            operation: operation.into(),
            cause: Box::new(cause),
        }
    }

    /// Whether this error, or the backend failure it wraps, means "no such object"
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Backend { cause, .. } => cause.is_not_found(),
            _ => false,
        }
    }
}
