//! Unified error types for the lifeboat gateway.
//!
//! A cache miss is deliberately NOT an error: lookups return `Ok(None)`.
//! Only the failure modes that a caller can act on get a variant here.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by every lifeboat crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network fetch could not complete (offline, timeout, DNS, non-2xx status).
    #[error("NETWORK: {0}")]
    Network(String),

    /// Neither cache nor network could satisfy the request.
    ///
    /// The router translates this into a synthesized 503 response rather
    /// than letting it cross into host application logic.
    #[error("UNAVAILABLE: {0}")]
    Unavailable(String),

    /// Populating the static manifest failed; the version rollout is aborted.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailure(String),

    /// The persistence layer rejected a cache write (e.g. quota exceeded).
    ///
    /// Strategies treat cache writes as best-effort: this is logged and the
    /// in-memory response is still returned to the caller.
    #[error("STORE_WRITE: {0}")]
    StoreWrite(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// URL could not be canonicalized into a request key.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Lifecycle transition attempted from the wrong state.
    #[error("INVALID_STATE: {0}")]
    InvalidState(String),

    /// Configuration rejected at registration time.
    #[error("CONFIG: {0}")]
    Config(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
