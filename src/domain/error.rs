use {super::store::StoreError, thiserror::Error};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("webhook secret is not configured")]
    NotConfigured,

    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("signature does not match payload")]
    InvalidSignature,

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfRange,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("webhook signature: {0}")]
    Verification(#[from] VerificationError),

    #[error("payload: {0}")]
    Payload(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} webhook is not configured")]
    NotConfigured(&'static str),

    #[error("no checkout session for payment intent {0}")]
    SessionNotFound(String),

    #[error("checkout session {session_id} has no purchaseId metadata")]
    SessionMetadataMissing { session_id: String },

    #[error("purchase {0} not found")]
    PurchaseNotFound(String),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("course {0} not found")]
    CourseNotFound(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("provider: {0}")]
    Provider(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether redelivering the same event could succeed.
    ///
    /// Missing purchase/user/course rows are retryable: the checkout flow may
    /// not have committed them yet. A payment intent with no usable checkout
    /// session will never resolve, so retrying it only feeds a retry storm.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PurchaseNotFound(_)
            | Self::UserNotFound(_)
            | Self::CourseNotFound(_)
            | Self::Store(_)
            | Self::Provider(_)
            | Self::Internal(_)
            | Self::NotConfigured(_) => true,
            Self::Validation(_)
            | Self::Verification(_)
            | Self::Payload(_)
            | Self::Serialization(_)
            | Self::SessionNotFound(_)
            | Self::SessionMetadataMissing { .. } => false,
        }
    }
}
