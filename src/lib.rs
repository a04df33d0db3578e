pub mod error;
pub mod model;
pub mod identity;
pub mod geohash;
pub mod index;
pub mod ranking;
pub mod filter;
pub mod storage;
pub mod store;
pub mod loader;
pub mod server;
pub mod parser;
pub mod manager;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CatalogError, CatalogResult};
use crate::index::{GeoIndex, DEFAULT_RADIUS_KM};
use crate::model::{country_from_city, AirportInput, AirportRecord, AirportSummary, Location};
use crate::ranking::{Clock, PopularityLedger, SystemClock, DEFAULT_TOP_K, DEFAULT_TTL};
use crate::store::{AirportStore, DocumentStore};

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub popularity_ttl: Duration,
    pub default_radius_km: f64,
    pub default_top_k: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            popularity_ttl: DEFAULT_TTL,
            default_radius_km: DEFAULT_RADIUS_KM,
            default_top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Created {
    pub reference: Uuid,
    pub identifier: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyAirport {
    pub identifier: String,
    #[serde(rename = "ref")]
    pub reference: Uuid,
    pub distance_km: f64,
    pub location: Location,
    pub airport: AirportRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopularAirport {
    pub identifier: String,
    pub visits: u64,
    pub airport: AirportRecord,
}

/// Keeps the document store, the spatial index and the popularity ledger in
/// step for every catalog operation.
///
/// The three structures are not updated under one transaction. A concurrent
/// reader can see a freshly created record before its spatial entry exists,
/// or a deleted record's spatial entry for a moment after the document is
/// gone; nearby search drops such stale hits. Failed index writes are
/// compensated by undoing the document write. A crash between the two steps
/// leaves the index out of step until [`AirportCatalog::rebuild_index`] runs,
/// which the server does on every start.
///
/// Writers take one catalog-wide lock around the document write and the
/// index write, so concurrent updates of the same airport land in both
/// structures in the same order. Reads never take it.
pub struct AirportCatalog<S: DocumentStore = AirportStore> {
    store: S,
    geo: GeoIndex,
    popularity: PopularityLedger,
    config: CatalogConfig,
    writes: Mutex<()>,
}

impl<S: DocumentStore> fmt::Debug for AirportCatalog<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AirportCatalog")
        .field("indexed", &self.geo.len())
        .field("ranked", &self.popularity.len())
        .field("config", &self.config)
        .finish()
    }
}

impl<S: DocumentStore> AirportCatalog<S> {
    pub fn new(store: S, config: CatalogConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, config: CatalogConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            geo: GeoIndex::new(),
            popularity: PopularityLedger::with_clock(config.popularity_ttl, clock),
            config,
            writes: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn geo(&self) -> &GeoIndex {
        &self.geo
    }

    pub fn popularity(&self) -> &PopularityLedger {
        &self.popularity
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Re-derives the spatial index from the document store.
    pub fn rebuild_index(&self) -> CatalogResult<usize> {
        let _writes = self.write_lock();
        self.geo.clear();
        let mut indexed = 0;
        for (reference, record) in self.store.scan()? {
            let loc = &record.location;
            match self.geo.upsert(reference, &record.identifier, loc.lon(), loc.lat()) {
                Ok(_) => indexed += 1,
                Err(e) => warn!(identifier = %record.identifier, %reference, error = %e, "Record left out of spatial index"),
            }
        }
        info!(indexed, "Spatial index rebuilt");
        Ok(indexed)
    }

    pub fn create(&self, mut input: AirportInput) -> CatalogResult<Created> {
        normalize_codes(&mut input);
        let identifier = identity::resolve(input.iata_code.as_deref(), input.icao_code.as_deref(), None)?;

        let name = required(input.name.take(), "name")?;
        let city = required(input.city.take(), "city")?;
        let location = input
        .location
        .take()
        .ok_or_else(|| CatalogError::Validation("location is required".to_string()))?;
        let country = input
        .country
        .take()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| country_from_city(&city));

        let record = AirportRecord {
            identifier: identifier.clone(),
            iata_code: input.iata_code,
            icao_code: input.icao_code,
            name,
            city,
            country,
            location,
            altitude: input.altitude,
            timezone: input.timezone,
        };
        let (lon, lat) = (record.location.lon(), record.location.lat());

        let _writes = self.write_lock();
        let reference = self.store.insert(record)?;
        if let Err(e) = self.geo.upsert(reference, &identifier, lon, lat) {
            warn!(%identifier, %reference, error = %e, "Index write failed, removing document");
            if let Err(undo) = self.store.delete(reference) {
                error!(%identifier, %reference, error = %undo, "Failed to remove orphaned document");
            }
            return Err(e.into());
        }

        info!(%identifier, %reference, "Airport created");
        Ok(Created { reference, identifier })
    }

    pub fn list(&self) -> CatalogResult<Vec<AirportSummary>> {
        let mut all = self.store.scan_summaries()?;
        all.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(all)
    }

    /// Looks the airport up by any of its codes and counts the visit.
    pub fn get(&self, code: &str) -> CatalogResult<AirportRecord> {
        let (_, record) = self.find(code)?;
        let visits = self.popularity.record_access(&record.identifier);
        debug!(identifier = %record.identifier, visits, "Airport read");
        Ok(record)
    }

    pub fn update(&self, code: &str, mut input: AirportInput) -> CatalogResult<AirportRecord> {
        normalize_codes(&mut input);
        if input.name.is_some() {
            input.name = Some(required(input.name.take(), "name")?);
        }
        if input.city.is_some() {
            input.city = Some(required(input.city.take(), "city")?);
        }

        let _writes = self.write_lock();
        let (reference, existing) = self.find(code)?;
        let mut next = existing.merged(&input);
        next.identifier = identity::resolve(
            next.iata_code.as_deref(),
            next.icao_code.as_deref(),
            Some(existing.identifier.as_str()),
        )?;

        if !self.store.put(reference, next.clone())? {
            return Err(CatalogError::NoChange(code.to_string()));
        }

        if next.location != existing.location || next.identifier != existing.identifier {
            let loc = &next.location;
            if let Err(e) = self.geo.upsert(reference, &next.identifier, loc.lon(), loc.lat()) {
                warn!(identifier = %next.identifier, %reference, error = %e, "Index write failed, restoring document");
                if let Err(undo) = self.store.put(reference, existing) {
                    error!(%reference, error = %undo, "Failed to restore previous document");
                }
                return Err(e.into());
            }
        }

        info!(previous = %existing.identifier, identifier = %next.identifier, %reference, "Airport updated");
        Ok(next)
    }

    pub fn delete(&self, code: &str) -> CatalogResult<()> {
        let _writes = self.write_lock();
        let (reference, record) = self.find(code)?;
        self.store.delete(reference)?;
        self.geo.remove(reference, Some(record.identifier.as_str()));

        // Visits may have been counted under either name
        self.popularity.remove(code);
        self.popularity.remove(&record.identifier);

        info!(identifier = %record.identifier, %reference, "Airport deleted");
        Ok(())
    }

    /// Airports within `radius_km` (default from config) of the point,
    /// nearest first.
    pub fn nearby(&self, lat: f64, lng: f64, radius_km: Option<f64>) -> CatalogResult<Vec<NearbyAirport>> {
        let radius_km = radius_km.unwrap_or(self.config.default_radius_km);
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(CatalogError::InvalidRadius(radius_km));
        }

        let mut out = Vec::new();
        for hit in self.geo.query_radius(lng, lat, radius_km)? {
            match self.store.get(hit.reference)? {
                Some(airport) => out.push(NearbyAirport {
                    identifier: hit.identifier,
                    reference: hit.reference,
                    distance_km: hit.distance_km,
                    location: Location::point(hit.coordinates[0], hit.coordinates[1]),
                    airport,
                }),
                None => debug!(identifier = %hit.identifier, reference = %hit.reference, "Dropping stale index entry"),
            }
        }
        Ok(out)
    }

    pub fn popular(&self, k: Option<usize>) -> CatalogResult<Vec<PopularAirport>> {
        let k = k.unwrap_or(self.config.default_top_k);
        let mut out = Vec::new();
        for (identifier, visits) in self.popularity.top_k(k) {
            if let Some((_, airport)) = self.store.find_by_canonical(&identifier)? {
                out.push(PopularAirport { identifier, visits, airport });
            }
        }
        Ok(out)
    }

    pub fn expire_popularity(&self) -> bool {
        let expired = self.popularity.expire_check();
        if expired {
            info!("Popularity epoch expired");
        }
        expired
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn find(&self, code: &str) -> CatalogResult<(Uuid, AirportRecord)> {
        self.store
        .find_by_identifier(code)?
        .ok_or_else(|| CatalogError::NotFound(code.to_string()))
    }
}

fn normalize_codes(input: &mut AirportInput) {
    input.iata_code = identity::normalize_code(input.iata_code.as_deref()).map(str::to_string);
    input.icao_code = identity::normalize_code(input.icao_code.as_deref()).map(str::to_string);
}

fn required(value: Option<String>, field: &str) -> CatalogResult<String> {
    value
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
    .ok_or_else(|| CatalogError::Validation(format!("{} is required", field)))
}
