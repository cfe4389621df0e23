//! Domain Layer - Core signal types and filtering.
//!
//! This layer contains the core domain types for vehicle signal forwarding
//! with no transport or storage dependencies.

/// Signal update and value types.
pub mod signal;

/// Signal filter parsing and matching.
pub mod filter;
