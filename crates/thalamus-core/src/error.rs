use thiserror::Error;

/// Top-level error type threaded through the node graph, the reactor, and every
/// adapter. Maps onto `tonic::Status` at the RPC boundary (see `thalamus-rpc`).
#[derive(Error, Debug)]
pub enum ThalamusError {
    /// Worth retrying: a backend hiccuped, a channel was briefly full, a lock
    /// timed out. Callers may resubmit without changing anything.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The other side of a connection (RPC client, vendor device, capture
    /// reader) misbehaved or disappeared.
    #[error("peer error: {0}")]
    Peer(String),

    /// Bad config, bad node wiring, a node referenced by name that doesn't
    /// exist. Not worth retrying without operator intervention.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A vendor SDK or register map reported a specific failure code.
    #[error("hardware error {code}: {message}")]
    Hardware { code: i64, message: String },

    /// Unrecoverable: continuing would corrupt state. The node or server
    /// should stop.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl ThalamusError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn peer(msg: impl Into<String>) -> Self {
        Self::Peer(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn hardware(code: i64, msg: impl Into<String>) -> Self {
        Self::Hardware { code, message: msg.into() }
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Whether a caller could reasonably retry the operation that produced
    /// this error without changing anything about the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, ThalamusError>;
