//! Error types for pspf-tools

use std::fmt;

/// Main error type for PSPF operations
#[derive(Debug)]
pub enum PspfError {
    /// File is too small to contain a footer and trailing marker
    FileTooSmall { size: u64, need: u64 },

    /// Footer internal magic does not match
    BadMagic(u32),

    /// Footer CRC mismatch
    BadCrc { stored: u32, calculated: u32 },

    /// Section size exceeds the sanity limit
    SectionTooLarge { size: u64, limit: u64 },

    /// Footer carries a format version newer than this build understands
    UnsupportedVersion(u16),

    /// Public key PEM could not be decoded or parsed
    BadPublicKey(String),

    /// Private key PEM could not be decoded or parsed
    BadPrivateKey(String),

    /// Key parsed but is not an RSA key
    WrongKeyType(String),

    /// PSS signature did not validate
    SignatureInvalid,

    /// Signing operation failed
    SignFailed(String),

    /// Archive entry resolves outside the extraction root
    PathEscape(String),

    /// Archive stream is corrupt or truncated
    ArchiveCorrupt(String),

    /// config.json not found in the staged metadata
    ConfigMissing(String),

    /// config.json present but unusable
    ConfigMalformed(String),

    /// Fewer bytes than requested were available at the given offset
    ReadShort { offset: u64, want: u64 },

    /// Required executable could not be located
    ExecutableNotFound(String),

    /// Missing or inconsistent build inputs
    InvalidArgs(String),

    /// IO error
    IoError(std::io::Error),

    /// JSON parsing error
    JsonError(serde_json::Error),

    /// Generic error with message
    Generic(String),
}

impl fmt::Display for PspfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PspfError::FileTooSmall { size, need } => {
                write!(f, "file too small: {size} bytes, need at least {need}")
            }
            PspfError::BadMagic(found) => {
                write!(f, "invalid internal magic: {found:#010x}")
            }
            PspfError::BadCrc { stored, calculated } => write!(
                f,
                "footer checksum mismatch: stored {stored:#010x}, calculated {calculated:#010x}"
            ),
            PspfError::SectionTooLarge { size, limit } => {
                write!(f, "section size {size} exceeds limit of {limit} bytes")
            }
            PspfError::UnsupportedVersion(v) => {
                write!(f, "unsupported format version {v:#06x}")
            }
            PspfError::BadPublicKey(msg) => write!(f, "bad public key: {msg}"),
            PspfError::BadPrivateKey(msg) => write!(f, "bad private key: {msg}"),
            PspfError::WrongKeyType(msg) => write!(f, "wrong key type: {msg}"),
            PspfError::SignatureInvalid => write!(f, "signature verification failed"),
            PspfError::SignFailed(msg) => write!(f, "signing failed: {msg}"),
            PspfError::PathEscape(name) => {
                write!(f, "archive entry escapes extraction root: {name}")
            }
            PspfError::ArchiveCorrupt(msg) => write!(f, "archive corrupt: {msg}"),
            PspfError::ConfigMissing(path) => write!(f, "config.json not found at {path}"),
            PspfError::ConfigMalformed(msg) => write!(f, "config.json malformed: {msg}"),
            PspfError::ReadShort { offset, want } => {
                write!(f, "short read: wanted {want} bytes at offset {offset}")
            }
            PspfError::ExecutableNotFound(msg) => write!(f, "executable not found: {msg}"),
            PspfError::InvalidArgs(msg) => write!(f, "invalid arguments: {msg}"),
            PspfError::IoError(err) => write!(f, "IO error: {err}"),
            PspfError::JsonError(err) => write!(f, "JSON error: {err}"),
            PspfError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PspfError {}

impl From<std::io::Error> for PspfError {
    fn from(err: std::io::Error) -> Self {
        PspfError::IoError(err)
    }
}

impl From<serde_json::Error> for PspfError {
    fn from(err: serde_json::Error) -> Self {
        PspfError::JsonError(err)
    }
}

/// Result type for PSPF operations
pub type Result<T> = std::result::Result<T, PspfError>;
