//! Structured error handling for restore downloads.

use hipstr::HipStr;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use thiserror::Error;
use uuid::Uuid;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with our custom Error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Categories of errors that can occur while staging restore objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// The restore job carries no secrets and can never be authenticated.
    MissingSecrets,
    /// No active credentials for the job (never authenticated or revoked).
    CredentialsNotFound,
    /// Transport failure talking to object storage.
    Network,
    /// Local filesystem failure.
    Io,
    /// The remote object does not exist.
    NotFound,
    /// The remote object does not match the expected checksum.
    PreconditionFailed,
    /// Object storage rejected the credentials.
    Unauthorized,
    /// The restore range cannot be staged under its staging root.
    InvalidRange,
    /// Invalid client or gateway configuration.
    Configuration,
    /// The client or gateway has been closed.
    ClientClosed,
    /// Unknown error occurred.
    #[default]
    Unknown,
}

impl ErrorKind {
    /// Check if the external range scheduler may retry this failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Io)
    }

    /// Check if this failure indicates bad upstream data that retrying cannot fix.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingSecrets | Self::InvalidRange)
    }
}

/// Structured error type with classification and context tracking.
#[must_use]
#[derive(Debug, Error)]
#[error("[{kind}]{}", message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Primary error message.
    pub message: Option<HipStr<'static>>,
    /// Underlying source error, if any.
    #[source]
    pub source: Option<BoxedError>,
    /// Additional context information.
    pub context: Option<HipStr<'static>>,
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            context: None,
        }
    }

    /// Creates a new error from a source error.
    pub fn from_source(kind: ErrorKind, source: impl Into<BoxedError>) -> Self {
        Self {
            kind,
            message: None,
            source: Some(source.into()),
            context: None,
        }
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<HipStr<'static>>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the source of the error.
    pub fn with_source(mut self, source: impl Into<BoxedError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds context to the error.
    pub fn with_context(mut self, context: impl Into<HipStr<'static>>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Job has no secrets to authenticate with.
    pub fn missing_secrets(job_id: Uuid) -> Self {
        Self::new(ErrorKind::MissingSecrets)
            .with_message(format!("Restore job is missing credentials. jobId: {job_id}"))
    }

    /// Slice identifier is not a single path segment.
    pub fn invalid_slice_id(slice_id: &str) -> Self {
        Self::new(ErrorKind::InvalidRange)
            .with_message(format!("Slice id is not a plain path segment: {slice_id:?}"))
    }

    /// No credentials are registered for the job.
    pub fn credentials_not_found(job_id: Uuid) -> Self {
        Self::new(ErrorKind::CredentialsNotFound).with_message(format!(
            "No credential available. The job might already have failed. jobId: {job_id}"
        ))
    }

    /// Client was used after [`close`](crate::StorageClient::close).
    pub fn client_closed() -> Self {
        Self::new(ErrorKind::ClientClosed).with_message("Storage client is closed")
    }

    /// Invalid configuration.
    pub fn configuration(message: impl Into<HipStr<'static>>) -> Self {
        Self::new(ErrorKind::Configuration).with_message(message)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Check if this error is retryable based on its kind.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Check if this error is fatal based on its kind.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::from_source(ErrorKind::Io, error).with_message("I/O operation failed")
    }
}

impl From<object_store::Error> for Error {
    fn from(error: object_store::Error) -> Self {
        let kind = match &error {
            object_store::Error::NotFound { .. } => ErrorKind::NotFound,
            object_store::Error::Precondition { .. } | object_store::Error::NotModified { .. } => {
                ErrorKind::PreconditionFailed
            }
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. } => ErrorKind::Unauthorized,
            _ => ErrorKind::Network,
        };

        Self::new(kind)
            .with_message(error.to_string())
            .with_source(error)
    }
}
