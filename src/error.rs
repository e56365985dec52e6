use crate::lifecycle::LifecycleError;
use axum::http::StatusCode;
use strum_macros::Display;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConductorError>;

/// Kind of identifier that failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IdentifierKind {
    #[strum(serialize = "function identifier")]
    Function,
    #[strum(serialize = "tenant token")]
    TenantToken,
    #[strum(serialize = "service instance")]
    ServiceInstance,
}

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("Invalid {kind}: {value}")]
    InvalidIdentifier { kind: IdentifierKind, value: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Unable to acquire management channel for {target}: {source}")]
    LeaseAcquisition {
        target: String,
        #[source]
        source: LifecycleError,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConductorError {
    pub fn invalid_identifier(kind: IdentifierKind, value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            kind,
            value: value.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// `true` for errors a caller should report as "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::InvalidIdentifier { .. })
    }

    /// HTTP status an outer routing layer should surface
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidIdentifier { .. } | Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::LeaseAcquisition { .. } => StatusCode::BAD_GATEWAY,
            Self::Lifecycle(_)
            | Self::Configuration(_)
            | Self::Storage(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for ConductorError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}
