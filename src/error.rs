use std::io;
use thiserror::Error;
use warp::http::StatusCode;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("invalid coordinate: lon={lon}, lat={lat}")]
    InvalidCoordinate { lon: f64, lat: f64 },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt segment frame at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("either iata_code or icao_code is required")]
    MissingIdentifier,
    #[error("invalid coordinate: lon={lon}, lat={lat}")]
    InvalidCoordinate { lon: f64, lat: f64 },
    #[error("invalid radius: {0}")]
    InvalidRadius(f64),
    #[error("{0}")]
    Validation(String),
    #[error("Airport not found")]
    NotFound(String),
    #[error("Airport not found or no changes made")]
    NoChange(String),
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl From<GeoError> for CatalogError {
    fn from(e: GeoError) -> Self {
        match e {
            GeoError::InvalidCoordinate { lon, lat } => CatalogError::InvalidCoordinate { lon, lat },
        }
    }
}

impl CatalogError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CatalogError::MissingIdentifier
            | CatalogError::InvalidCoordinate { .. }
            | CatalogError::InvalidRadius(_)
            | CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
            CatalogError::NotFound(_) | CatalogError::NoChange(_) => StatusCode::NOT_FOUND,
            CatalogError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Failures that stop a bulk import before any record is looked at.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("cannot read import file: {0}")]
    Io(#[from] io::Error),
    #[error("import file is not a JSON array: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
