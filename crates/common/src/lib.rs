//! Common utilities and types shared across campus assistant components.

#![warn(clippy::pedantic)]

/// Module for the verified identity attached to every connection
pub mod identity;

/// Module for common data types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
