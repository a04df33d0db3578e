use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// GeoJSON point. `coordinates` is `[longitude, latitude]`.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct Location {
    #[serde(rename = "type", default = "Location::point_kind")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl Location {
    pub fn point(lon: f64, lat: f64) -> Self {
        Self { kind: Self::point_kind(), coordinates: [lon, lat] }
    }

    fn point_kind() -> String {
        "Point".to_string()
    }

    pub fn lon(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

/// A stored airport document.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct AirportRecord {
    /// Canonical identifier (iata_code if present, else icao_code)
    pub identifier: String,

    #[serde(default)]
    pub iata_code: Option<String>,

    #[serde(default)]
    pub icao_code: Option<String>,

    pub name: String,
    pub city: String,
    pub country: String,
    pub location: Location,

    #[serde(rename = "alt", default)]
    pub altitude: Option<f64>,

    #[serde(rename = "tz", default)]
    pub timezone: Option<String>,
}

impl AirportRecord {
    pub fn summary(&self) -> AirportSummary {
        AirportSummary {
            identifier: self.identifier.clone(),
            iata_code: self.iata_code.clone(),
            icao_code: self.icao_code.clone(),
            name: self.name.clone(),
            city: self.city.clone(),
            country: self.country.clone(),
            location: self.location.clone(),
        }
    }

    /// Overlays every field the input carries. The canonical identifier is
    /// left as it was; the caller re-resolves it from the merged codes.
    pub fn merged(&self, input: &AirportInput) -> AirportRecord {
        let mut next = self.clone();
        if let Some(code) = &input.iata_code {
            next.iata_code = Some(code.clone());
        }
        if let Some(code) = &input.icao_code {
            next.icao_code = Some(code.clone());
        }
        if let Some(name) = &input.name {
            next.name = name.clone();
        }
        if let Some(city) = &input.city {
            next.city = city.clone();
        }
        if let Some(country) = &input.country {
            next.country = country.clone();
        }
        if let Some(location) = &input.location {
            next.location = location.clone();
        }
        if input.altitude.is_some() {
            next.altitude = input.altitude;
        }
        if let Some(tz) = &input.timezone {
            next.timezone = Some(tz.clone());
        }
        next
    }
}

/// Request body for create (all required fields checked by the catalog) and
/// for update (every field optional, present fields overwrite).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AirportInput {
    #[serde(default)]
    pub iata_code: Option<String>,
    #[serde(default)]
    pub icao_code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(rename = "alt", default)]
    pub altitude: Option<f64>,
    #[serde(rename = "tz", default)]
    pub timezone: Option<String>,
}

/// Projection returned by list-all.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AirportSummary {
    pub identifier: String,
    pub iata_code: Option<String>,
    pub icao_code: Option<String>,
    pub name: String,
    pub city: String,
    pub country: String,
    pub location: Location,
}

/// "Paris, France" -> "France". Falls back to the whole string.
pub fn country_from_city(city: &str) -> String {
    city.rsplit(", ").next().unwrap_or(city).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AirportRecord {
        AirportRecord {
            identifier: "JFK".into(),
            iata_code: Some("JFK".into()),
            icao_code: Some("KJFK".into()),
            name: "John F Kennedy Intl".into(),
            city: "New York, United States".into(),
            country: "United States".into(),
            location: Location::point(-73.7789, 40.6398),
            altitude: Some(13.0),
            timezone: Some("America/New_York".into()),
        }
    }

    #[test]
    fn country_is_last_city_component() {
        assert_eq!(country_from_city("New York, United States"), "United States");
        assert_eq!(country_from_city("Reykjavik"), "Reykjavik");
        assert_eq!(country_from_city("Washington, DC, United States"), "United States");
    }

    #[test]
    fn merge_keeps_absent_fields() {
        let base = record();
        let input = AirportInput { name: Some("JFK International".into()), ..Default::default() };
        let next = base.merged(&input);

        assert_eq!(next.name, "JFK International");
        assert_eq!(next.city, base.city);
        assert_eq!(next.location, base.location);
        assert_eq!(next.timezone, base.timezone);
    }

    #[test]
    fn location_serializes_as_geojson() {
        let json = serde_json::to_value(Location::point(2.35, 48.85)).unwrap();
        assert_eq!(json["type"], "Point");
        assert_eq!(json["coordinates"][0], 2.35);

        let parsed: Location = serde_json::from_str(r#"{"coordinates":[1.0,2.0]}"#).unwrap();
        assert_eq!(parsed.kind, "Point");
        assert_eq!(parsed.lat(), 2.0);
    }
}
