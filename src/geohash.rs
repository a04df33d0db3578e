//! Interleaved geohash over the Web-Mercator latitude band.
//!
//! A point is quantised to 26 bits of longitude and 26 bits of latitude and
//! the bits are interleaved (longitude in the odd positions) into a 52-bit
//! score. Cells at a coarser step are prefixes of that score, so every cell
//! maps to one contiguous score range.

use std::f64::consts::PI;
use geo::{HaversineDistance, Point};
use crate::error::GeoError;

pub const GEO_STEP_MAX: u8 = 26;

pub const LON_MIN: f64 = -180.0;
pub const LON_MAX: f64 = 180.0;
pub const LAT_MIN: f64 = -85.05112878;
pub const LAT_MAX: f64 = 85.05112878;

const MERCATOR_MAX: f64 = 20037726.37;

/// Mean Earth radius in meters; same value geo uses (private there since 0.29).
const MEAN_EARTH_RADIUS: f64 = 6371008.8;

/// A cell: `bits` holds `2 * step` significant bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashBits {
    pub bits: u64,
    pub step: u8,
}

impl HashBits {
    /// Half-open score range `[lo, hi)` of full-precision members inside this cell.
    pub fn score_range(&self) -> (u64, u64) {
        let shift = 2 * (GEO_STEP_MAX - self.step) as u32;
        (self.bits << shift, (self.bits + 1) << shift)
    }

    fn split(&self) -> (u32, u32) {
        (squash(self.bits), squash(self.bits >> 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

/// Rejects non-finite values and out-of-range longitude; clamps latitude
/// into the representable band, keeping its sign.
pub fn validate(lon: f64, lat: f64) -> Result<(f64, f64), GeoError> {
    if !lon.is_finite() || !lat.is_finite() || !(LON_MIN..=LON_MAX).contains(&lon) {
        return Err(GeoError::InvalidCoordinate { lon, lat });
    }
    Ok((lon, lat.clamp(LAT_MIN, LAT_MAX)))
}

// Moves the low 32 bits of `v` into the even bit positions.
fn spread(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

fn squash(v: u64) -> u32 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x as u32
}

fn quantize(value: f64, min: f64, max: f64, step: u8) -> u32 {
    let cells = 1u64 << step;
    let offset = (value - min) / (max - min);
    let idx = (offset * cells as f64) as u64;
    idx.min(cells - 1) as u32
}

fn interleave(lat_idx: u32, lon_idx: u32, step: u8) -> HashBits {
    HashBits { bits: spread(lat_idx) | (spread(lon_idx) << 1), step }
}

/// Expects coordinates that already passed [`validate`].
pub fn encode(lon: f64, lat: f64, step: u8) -> HashBits {
    let lat_idx = quantize(lat, LAT_MIN, LAT_MAX, step);
    let lon_idx = quantize(lon, LON_MIN, LON_MAX, step);
    interleave(lat_idx, lon_idx, step)
}

pub fn cell_of(hash: HashBits) -> Cell {
    let (lat_idx, lon_idx) = hash.split();
    let cells = (1u64 << hash.step) as f64;
    let lat_unit = (LAT_MAX - LAT_MIN) / cells;
    let lon_unit = (LON_MAX - LON_MIN) / cells;

    Cell {
        lon_min: LON_MIN + lon_idx as f64 * lon_unit,
        lon_max: LON_MIN + (lon_idx as f64 + 1.0) * lon_unit,
        lat_min: LAT_MIN + lat_idx as f64 * lat_unit,
        lat_max: LAT_MIN + (lat_idx as f64 + 1.0) * lat_unit,
    }
}

/// The cell and its eight neighbours. Longitude wraps around the
/// antimeridian; rows beyond the latitude band are dropped.
pub fn neighbors(hash: HashBits) -> Vec<HashBits> {
    let (lat_idx, lon_idx) = hash.split();
    let cells = 1i64 << hash.step;
    let mut out = Vec::with_capacity(9);

    for dy in -1i64..=1 {
        let lat = lat_idx as i64 + dy;
        if lat < 0 || lat >= cells {
            continue;
        }
        for dx in -1i64..=1 {
            let lon = (lon_idx as i64 + dx).rem_euclid(cells);
            out.push(interleave(lat as u32, lon as u32, hash.step));
        }
    }
    out.sort();
    out.dedup();
    out
}

/// Coarsest useful step for a radius: the cell edge should be at least the
/// radius so the 3x3 neighbourhood covers the circle. Near the poles the
/// longitude cells shrink, so one or two extra levels are given up.
pub fn estimate_step(radius_m: f64, lat: f64) -> u8 {
    if radius_m <= 0.0 {
        return GEO_STEP_MAX;
    }
    let mut range = radius_m;
    let mut step: i32 = 1;
    while range < MERCATOR_MAX {
        range *= 2.0;
        step += 1;
    }
    step -= 2;

    if lat > 66.0 || lat < -66.0 {
        step -= 1;
        if lat > 80.0 || lat < -80.0 {
            step -= 1;
        }
    }
    step.clamp(1, GEO_STEP_MAX as i32) as u8
}

/// Great-circle distance in meters.
pub fn distance_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    Point::new(lon1, lat1).haversine_distance(&Point::new(lon2, lat2))
}

/// Cells whose score ranges together contain every indexed point within
/// `radius_m` of the center. `None` means the whole index must be scanned.
pub fn covering_cells(lon: f64, lat: f64, radius_m: f64) -> Option<Vec<HashBits>> {
    // distance_m measures on this sphere too
    let angular = radius_m / MEAN_EARTH_RADIUS;
    if angular >= PI {
        return None;
    }
    let dlat = angular.to_degrees();
    let (lat_lo, lat_hi) = (lat - dlat, lat + dlat);

    // Longitude half-width of the circle's bounding box; None when the circle
    // reaches a pole and spans every meridian.
    let dlon = if lat_hi >= 90.0 || lat_lo <= -90.0 {
        None
    } else {
        let s = angular.sin() / lat.to_radians().cos();
        if s >= 1.0 { None } else { Some(s.asin().to_degrees()) }
    };

    let mut step = estimate_step(radius_m, lat);
    while step > 0 {
        let center = encode(lon, lat, step);
        let cell = cell_of(center);
        let w = cell.lon_max - cell.lon_min;
        let h = cell.lat_max - cell.lat_min;

        let south = cell.lat_min - h;
        let north = cell.lat_max + h;
        let lat_ok = (lat_lo >= south || south <= LAT_MIN + 1e-9)
            && (lat_hi <= north || north >= LAT_MAX - 1e-9);
        let lon_ok = 3.0 * w >= 360.0
            || match dlon {
                Some(d) => lon - d >= cell.lon_min - w && lon + d <= cell.lon_max + w,
                None => false,
            };

        if lat_ok && lon_ok {
            return Some(neighbors(center));
        }
        step -= 1;
    }
    None
}
