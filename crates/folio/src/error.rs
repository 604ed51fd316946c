use std::path::PathBuf;

use thiserror::Error;

/// Substring the provider uses when the selected key has no access to a model.
pub const ENTITY_NOT_FOUND: &str = "Requested entity was not found";

/// Failure of one capability call, or of the local checks in front of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Required local input is missing. Never reaches the provider.
    #[error("{0}")]
    Validation(String),
    /// The provider call failed: network, quota, rejected input, bad response.
    #[error("{message}")]
    Service {
        status: Option<u16>,
        /// Structured status from the provider's error body, e.g. `NOT_FOUND`.
        code: Option<String>,
        message: String,
    },
    /// No usable credential for the requested capability.
    #[error("{0}")]
    CredentialMissing(String),
}

impl CapabilityError {
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when the provider reported the entity-not-found condition.
    /// The structured code wins; the message match covers providers that omit it.
    pub fn is_entity_not_found(&self) -> bool {
        match self {
            Self::Service { code, message, .. } => {
                code.as_deref() == Some("NOT_FOUND") || message.contains(ENTITY_NOT_FOUND)
            }
            _ => false,
        }
    }

    pub fn is_credential_missing(&self) -> bool {
        matches!(self, Self::CredentialMissing(_))
    }
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported file type for {name}")]
    Unsupported { name: String },
    #[error("{name} is {size} bytes; the limit is {limit} bytes")]
    TooLarge { name: String, size: usize, limit: usize },
    #[error("{name} is empty")]
    Empty { name: String },
}

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("preference file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("preference file {} is not valid toml: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("could not encode preferences: {0}")]
    Serialize(#[from] toml::ser::Error),
}
