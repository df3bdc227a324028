use thiserror::Error;

/// Failures turning caller input into a key or identity.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid key: {0:?}")]
    Invalid(String),

    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}
