use seedswarm_types::KeyError;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("networker is not listening; call listen() first")]
    NotListening,

    #[error("networker is already listening")]
    AlreadyListening,

    #[error("invalid discovery key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("replication error: {0}")]
    Replication(String),

    #[error("transport teardown failed: {0}")]
    Teardown(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Coarse classification of a [`NetworkError`], matching who can act on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller invoked an operation in the wrong state or with bad input.
    Usage,
    /// Discovery or swarm failure. Non-fatal.
    Transport,
    /// A single connection or its replication session failed.
    Connection,
    /// The transport did not shut down cleanly.
    Teardown,
    Config,
}

impl NetworkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotListening | Self::AlreadyListening | Self::InvalidKey(_) => ErrorKind::Usage,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Connection(_) | Self::Replication(_) | Self::Io(_) => ErrorKind::Connection,
            Self::Teardown(_) => ErrorKind::Teardown,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
