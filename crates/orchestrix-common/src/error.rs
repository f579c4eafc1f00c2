/// Domain error taxonomy shared by every crate in the workspace.
///
/// Each variant carries a stable machine-readable code (see [`Error::code`])
/// that the HTTP layer maps to a status and serializes into error bodies.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The referenced workflow belongs to a different tenant.
    #[error("workflow belongs to a different tenant")]
    TenantMismatch,

    #[error("alert is already acknowledged")]
    AlreadyAcknowledged,

    #[error("alert is already resolved")]
    AlreadyResolved,

    #[error("rule is on cooldown")]
    Cooldown,

    #[error("batch exceeds {max} samples (got {got})")]
    BatchTooLarge { max: usize, got: usize },

    #[error("workflow cannot be executed")]
    CannotExecute,

    #[error("execution cannot be cancelled")]
    CannotCancel,

    #[error("template error: {0}")]
    Template(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable error code surfaced in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Unauthorized => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::TenantMismatch => "tenant_mismatch",
            Error::AlreadyAcknowledged => "already_acknowledged",
            Error::AlreadyResolved => "already_resolved",
            Error::Cooldown => "cooldown",
            Error::BatchTooLarge { .. } => "batch_too_large",
            Error::CannotExecute => "cannot_execute",
            Error::CannotCancel => "cannot_cancel",
            Error::Template(_) => "template",
            Error::Store(_) => "store_unavailable",
            Error::Engine(_) => "engine_unavailable",
            Error::Internal(_) => "internal",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
