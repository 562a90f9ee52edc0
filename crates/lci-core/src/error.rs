//! Unified error types for the LCI transformation engine.
//!
//! [`LciError::Structural`] and [`LciError::Resolution`] are the two
//! fatal/scenario-fatal variants that propagate with `?`; everything else
//! non-fatal (balance warnings, relink warnings, data warnings) is
//! accumulated as data in [`crate::diagnostics::Diagnostics`] rather than
//! raised.

use thiserror::Error;

/// Unified error type for all `lci-*` crates.
#[derive(Error, Debug)]
pub enum LciError {
    /// Missing required schema field, unresolvable biosphere key, or other
    /// cross-cutting structural breakage. Aborts the scenario.
    #[error("structural error: {0}")]
    Structural(String),

    /// `NoCandidateInDatabase` during proxy fabrication, or an IAM variable
    /// required by a market recipe has no data for any year. Scenario-fatal.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// I/O errors loading recipes, caches, or templates.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Recipe/config parsing errors.
    #[error("parse error: {0}")]
    Parse(String),

    /// Generic errors for wrapping external errors.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias for results using [`LciError`].
pub type LciResult<T> = Result<T, LciError>;

impl From<anyhow::Error> for LciError {
    fn from(err: anyhow::Error) -> Self {
        LciError::Other(err.to_string())
    }
}

impl From<String> for LciError {
    fn from(s: String) -> Self {
        LciError::Other(s)
    }
}

impl From<&str> for LciError {
    fn from(s: &str) -> Self {
        LciError::Other(s.to_string())
    }
}

/// Error returned by [`crate::geo::GeoResolver`] construction and lattice lookups.
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("unknown location '{0}' and no fallback configured")]
    UnknownLocation(String),
    #[error("cycle detected in containment lattice while inserting '{0}'")]
    Cycle(String),
}

/// Error returned by [`crate::index::ActivityIndex`] lookups.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("ambiguous lookup for ({name}, {product}, {location:?}): {count} matches")]
    Ambiguous {
        name: String,
        product: String,
        location: Option<String>,
        count: usize,
    },
    #[error("no activity found for ({name}, {product}, {location:?})")]
    NotFound {
        name: String,
        product: String,
        location: Option<String>,
    },
    #[error("duplicate activity key ({0}, {1}, {2})")]
    DuplicateKey(String, String, String),
}
