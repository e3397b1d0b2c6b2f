//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types. Use `SecretString` for connection URLs that
//! may embed credentials (e.g. `redis://:password@host:6379`). `Debug` output
//! is redacted and the value is zeroized on drop.

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
