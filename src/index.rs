use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::RwLock;
use ordered_float::OrderedFloat;
use uuid::Uuid;

use crate::error::GeoError;
use crate::geohash::{self, GEO_STEP_MAX};

pub const DEFAULT_RADIUS_KM: f64 = 100.0;

/// Composite member key: identifiers may collide across records, the store
/// reference never does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
    pub identifier: String,
    pub reference: Uuid,
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.identifier, self.reference)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    member: MemberKey,
    score: u64,
    lon: f64,
    lat: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoHit {
    pub reference: Uuid,
    pub identifier: String,
    pub distance_km: f64,
    /// Indexed position as `[lon, lat]` (latitude already clamped).
    pub coordinates: [f64; 2],
}

#[derive(Default)]
struct GeoSet {
    // score -> members sharing that cell, the sorted-set layout
    scores: BTreeMap<u64, BTreeSet<MemberKey>>,
    // secondary index, exactly one live entry per reference
    by_ref: HashMap<Uuid, Entry>,
}

impl GeoSet {
    fn detach(&mut self, reference: &Uuid) -> Option<Entry> {
        let entry = self.by_ref.remove(reference)?;
        if let Some(members) = self.scores.get_mut(&entry.score) {
            members.remove(&entry.member);
            if members.is_empty() {
                self.scores.remove(&entry.score);
            }
        }
        Some(entry)
    }

    fn attach(&mut self, entry: Entry) {
        self.scores.entry(entry.score).or_default().insert(entry.member.clone());
        self.by_ref.insert(entry.member.reference, entry);
    }
}

/// In-memory geo-indexed set keyed by (identifier, reference).
///
/// Radius queries translate the circle into a handful of geohash cells, range
/// scan the score map for each cell and keep the members whose great-circle
/// distance is within the radius. Results are ordered by distance, ties by
/// member key (identifier, then reference).
pub struct GeoIndex {
    set: RwLock<GeoSet>,
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoIndex {
    pub fn new() -> Self {
        Self { set: RwLock::new(GeoSet::default()) }
    }

    /// Indexes `reference` at (lon, lat), replacing whatever entry the
    /// reference had before under the same write lock. Returns the stored
    /// position.
    pub fn upsert(&self, reference: Uuid, identifier: &str, lon: f64, lat: f64) -> Result<[f64; 2], GeoError> {
        let (lon, lat) = geohash::validate(lon, lat)?;
        let entry = Entry {
            member: MemberKey { identifier: identifier.to_string(), reference },
            score: geohash::encode(lon, lat, GEO_STEP_MAX).bits,
            lon,
            lat,
        };

        let mut set = self.set.write().unwrap_or_else(|e| e.into_inner());
        set.detach(&reference);
        set.attach(entry);
        Ok([lon, lat])
    }

    /// Removes the member for `reference`. Missing members are ignored. When
    /// `identifier` is given it must match the indexed member.
    pub fn remove(&self, reference: Uuid, identifier: Option<&str>) -> bool {
        let mut set = self.set.write().unwrap_or_else(|e| e.into_inner());
        let matches = match (set.by_ref.get(&reference), identifier) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(entry), Some(id)) => entry.member.identifier == id,
        };
        matches && set.detach(&reference).is_some()
    }

    pub fn member(&self, reference: Uuid) -> Option<(MemberKey, [f64; 2])> {
        let set = self.set.read().unwrap_or_else(|e| e.into_inner());
        set.by_ref.get(&reference).map(|e| (e.member.clone(), [e.lon, e.lat]))
    }

    pub fn len(&self) -> usize {
        self.set.read().unwrap_or_else(|e| e.into_inner()).by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut set = self.set.write().unwrap_or_else(|e| e.into_inner());
        *set = GeoSet::default();
    }

    /// Members within `radius_km` of (lon, lat), nearest first.
    ///
    /// The candidate set is collected under one read lock, so the returned
    /// sequence reflects a single snapshot of the index.
    pub fn query_radius(&self, lon: f64, lat: f64, radius_km: f64) -> Result<impl Iterator<Item = GeoHit>, GeoError> {
        let (lon, lat) = geohash::validate(lon, lat)?;
        let radius_m = radius_km * 1000.0;

        let mut hits: Vec<(OrderedFloat<f64>, MemberKey, [f64; 2])> = Vec::new();
        {
            let set = self.set.read().unwrap_or_else(|e| e.into_inner());
            let mut consider = |member: &MemberKey| {
                if let Some(entry) = set.by_ref.get(&member.reference) {
                    let dist = geohash::distance_m(lon, lat, entry.lon, entry.lat);
                    if dist <= radius_m {
                        hits.push((OrderedFloat(dist), member.clone(), [entry.lon, entry.lat]));
                    }
                }
            };

            match geohash::covering_cells(lon, lat, radius_m) {
                Some(cells) => {
                    for cell in cells {
                        let (lo, hi) = cell.score_range();
                        for members in set.scores.range(lo..hi).map(|(_, m)| m) {
                            members.iter().for_each(&mut consider);
                        }
                    }
                }
                None => {
                    for members in set.scores.values() {
                        members.iter().for_each(&mut consider);
                    }
                }
            }
        }

        hits.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        Ok(hits.into_iter().map(|(dist, member, coordinates)| GeoHit {
            reference: member.reference,
            identifier: member.identifier,
            distance_km: dist.into_inner() / 1000.0,
            coordinates,
        }))
    }
}
