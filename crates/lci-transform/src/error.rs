//! Error types for the graph-rewriting components.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FabricationError {
    #[error("no candidate template found for location '{location}', name '{name}', product '{product}'")]
    NoCandidateInDatabase {
        location: String,
        name: String,
        product: String,
    },
    #[error(transparent)]
    Index(#[from] lci_core::IndexError),
}

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("market '{name}' at '{location}' sums to {sum}, outside [{lower}, {upper}]")]
    SumOutOfBounds {
        name: String,
        location: String,
        sum: f64,
        lower: f64,
        upper: f64,
    },
    #[error("IAM variable '{variable}' required by market '{market}' has no data for any year")]
    NoDataForVariable { market: String, variable: String },
    #[error(transparent)]
    Index(#[from] lci_core::IndexError),
    #[error(transparent)]
    Fabrication(#[from] crate::error::FabricationError),
}

#[derive(Error, Debug)]
pub enum RescaleError {
    #[error("activity '{0}' has no production exchange to rescale against")]
    NoProductionExchange(String),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("structural error: {0}")]
    Structural(String),
}

pub type FabricationResult<T> = Result<T, FabricationError>;
pub type MarketResult<T> = Result<T, MarketError>;
pub type RescaleResult<T> = Result<T, RescaleError>;
