//! Error taxonomy for stub resolution and the surrounding CRUD surface.

/// Domain errors, mapped to HTTP status codes at the router boundary.
#[derive(Debug, thiserror::Error)]
pub enum StubError {
    /// Malformed create/update payload. Produces 400, no state change.
    #[error("{0}")]
    Validation(String),

    /// Lookup against a key that does not exist. Produces 404, no state change.
    #[error("not found: {0}")]
    NotFound(String),

    /// A pending callback already exists for this request id. Produces 409.
    #[error("request_id already exists: {0}")]
    Duplicate(String),

    /// Default dispatch found neither a static nor a pattern stub.
    /// Produces 404 with a diagnostic body; history has already been written.
    #[error("no stub matched {method} {path}")]
    NoStubMatched { method: String, path: String },

    /// Storage or synthesis failure. Produces 500; never downgraded to a
    /// default response, so a broken store cannot fabricate stub behavior.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StubError {
    pub fn status_code(&self) -> u16 {
        match self {
            StubError::Validation(_) => 400,
            StubError::NotFound(_) => 404,
            StubError::Duplicate(_) => 409,
            StubError::NoStubMatched { .. } => 404,
            StubError::Internal(_) => 500,
        }
    }
}
