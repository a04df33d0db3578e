use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{CatalogError, ImportError};
use crate::geohash;
use crate::identity;
use crate::model::{AirportInput, Location};
use crate::store::DocumentStore;
use crate::AirportCatalog;

/// One row of the airports import file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAirport {
    #[serde(default)]
    pub iata_faa: Option<String>,
    #[serde(default)]
    pub icao: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub alt: Option<f64>,
    #[serde(default)]
    pub tz: Option<String>,
}

impl RawAirport {
    fn into_input(self, location: Location) -> AirportInput {
        AirportInput {
            iata_code: self.iata_faa,
            icao_code: self.icao,
            name: self.name,
            city: self.city,
            country: None,
            location: Some(location),
            altitude: self.alt,
            timezone: self.tz,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub total: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub missing_identifier: usize,
    pub invalid_coordinates: usize,
    pub index_failures: usize,
    pub failed: usize,
}

impl ImportReport {
    pub fn skipped(&self) -> usize {
        self.total - self.imported
    }
}

pub fn import_file<S: DocumentStore>(catalog: &AirportCatalog<S>, path: &Path) -> Result<ImportReport, ImportError> {
    let reader = BufReader::new(File::open(path)?);
    let rows: Vec<Value> = serde_json::from_reader(reader)?;
    info!(path = %path.display(), rows = rows.len(), "Importing airports");

    // Rows are decoded one at a time so a malformed row only costs itself
    let mut report = ImportReport::default();
    let mut records = Vec::with_capacity(rows.len());
    for (row, value) in rows.into_iter().enumerate() {
        match serde_json::from_value::<RawAirport>(value) {
            Ok(raw) => records.push(raw),
            Err(e) => {
                warn!(row, error = %e, "Skipping malformed row");
                report.total += 1;
                report.failed += 1;
            }
        }
    }

    let rest = import_records(catalog, records)?;
    Ok(merge(report, rest))
}

/// Creates one airport per record, classifying every skip. Only a failure of
/// the store itself while checking for duplicates is returned as an error.
pub fn import_records<S: DocumentStore>(
    catalog: &AirportCatalog<S>,
    records: Vec<RawAirport>,
) -> Result<ImportReport, ImportError> {
    let mut report = ImportReport::default();

    for (row, raw) in records.into_iter().enumerate() {
        report.total += 1;

        let identifier = match identity::resolve(raw.iata_faa.as_deref(), raw.icao.as_deref(), None) {
            Ok(id) => id,
            Err(_) => {
                warn!(row, name = raw.name.as_deref().unwrap_or(""), "Skipping airport without code");
                report.missing_identifier += 1;
                continue;
            }
        };

        let location = match (raw.lng, raw.lat) {
            (Some(lng), Some(lat)) if geohash::validate(lng, lat).is_ok() => Location::point(lng, lat),
            (lng, lat) => {
                warn!(row, %identifier, ?lng, ?lat, "Skipping airport with invalid coordinates");
                report.invalid_coordinates += 1;
                continue;
            }
        };

        if catalog.store().find_by_identifier(&identifier).map_err(CatalogError::from)?.is_some() {
            warn!(row, %identifier, "Skipping duplicate airport");
            report.duplicates += 1;
            continue;
        }

        match catalog.create(raw.into_input(location)) {
            Ok(_) => report.imported += 1,
            Err(CatalogError::InvalidCoordinate { lon, lat }) => {
                warn!(row, %identifier, lon, lat, "Index rejected airport, document removed");
                report.index_failures += 1;
            }
            Err(CatalogError::MissingIdentifier) => report.missing_identifier += 1,
            Err(e) => {
                warn!(row, %identifier, error = %e, "Failed to import airport");
                report.failed += 1;
            }
        }
    }

    info!(
        total = report.total,
        imported = report.imported,
        duplicates = report.duplicates,
        missing_identifier = report.missing_identifier,
        invalid_coordinates = report.invalid_coordinates,
        index_failures = report.index_failures,
        failed = report.failed,
        "Import finished"
    );
    Ok(report)
}

/// Runs [`import_file`] only when the catalog holds no airports yet.
pub fn import_if_empty<S: DocumentStore>(
    catalog: &AirportCatalog<S>,
    path: &Path,
) -> Result<Option<ImportReport>, ImportError> {
    if !catalog.store().is_empty().map_err(CatalogError::from)? {
        info!(path = %path.display(), "Store already populated, skipping import");
        return Ok(None);
    }
    import_file(catalog, path).map(Some)
}

fn merge(a: ImportReport, b: ImportReport) -> ImportReport {
    ImportReport {
        total: a.total + b.total,
        imported: a.imported + b.imported,
        duplicates: a.duplicates + b.duplicates,
        missing_identifier: a.missing_identifier + b.missing_identifier,
        invalid_coordinates: a.invalid_coordinates + b.invalid_coordinates,
        index_failures: a.index_failures + b.index_failures,
        failed: a.failed + b.failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_import_schema() {
        let raw: RawAirport = serde_json::from_str(
            r#"{"iata_faa":"JFK","icao":"KJFK","name":"John F Kennedy Intl","city":"New York, United States",
                "lat":40.639751,"lng":-73.778925,"alt":13,"tz":"America/New_York"}"#,
        )
        .unwrap();
        assert_eq!(raw.iata_faa.as_deref(), Some("JFK"));
        assert_eq!(raw.alt, Some(13.0));

        let input = raw.into_input(Location::point(-73.778925, 40.639751));
        assert_eq!(input.iata_code.as_deref(), Some("JFK"));
        assert_eq!(input.icao_code.as_deref(), Some("KJFK"));
        assert!(input.country.is_none());
    }

    #[test]
    fn missing_fields_default_to_none() {
        let raw: RawAirport = serde_json::from_str(r#"{"iata_faa":"","name":"Nowhere"}"#).unwrap();
        assert_eq!(raw.iata_faa.as_deref(), Some(""));
        assert!(raw.icao.is_none());
        assert!(raw.lat.is_none());
    }

    #[test]
    fn skipped_counts_everything_not_imported() {
        let report = ImportReport { total: 10, imported: 6, duplicates: 2, failed: 2, ..Default::default() };
        assert_eq!(report.skipped(), 4);
    }
}
