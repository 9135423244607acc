use canopy_layout::LayoutError;
use thiserror::Error;

/// Errors raised by document operations.
///
/// [`ModelError::code`] gives the stable code clients switch on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("{0}")]
    Validation(String),

    #[error("Cannot connect: {0}")]
    ConnectFailed(String),

    #[error("Cannot delete: {0}")]
    DeleteFailed(String),

    #[error("Corrupt {kind} entry {id}: {reason}")]
    Corrupt {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("Replication error: {0}")]
    Replication(String),

    #[error("Document lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl ModelError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn already_exists(kind: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "MISSING_FIELD",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ConnectFailed(_) => "CONNECT_FAILED",
            Self::DeleteFailed(_) => "DELETE_FAILED",
            Self::Layout(LayoutError::UnknownNode(_)) => "NOT_FOUND",
            Self::Layout(LayoutError::InvalidParameter(_)) => "VALIDATION_ERROR",
            Self::Corrupt { .. } | Self::Replication(_) | Self::Poisoned => "INTERNAL_ERROR",
        }
    }

    /// Map a request body that failed to decode onto the taxonomy.
    pub fn invalid_body(e: serde_json::Error) -> Self {
        let msg = e.to_string();
        match msg.strip_prefix("missing field `") {
            Some(rest) => Self::MissingField(rest.split('`').next().unwrap_or_default().to_string()),
            None => Self::Validation(msg),
        }
    }

    /// Whether the message is safe to show to API clients.
    pub fn is_internal(&self) -> bool {
        self.code() == "INTERNAL_ERROR"
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        Self::Replication(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
