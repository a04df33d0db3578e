//! Canonical identifier resolution.
//!
//! An airport may carry an IATA code, an ICAO code, or both. The IATA code
//! wins when both are present. On update the codes of the merged record are
//! resolved, falling back to the identifier the record already had.

use crate::error::CatalogError;

/// Trims a code and treats blank input as absent.
pub fn normalize_code(code: Option<&str>) -> Option<&str> {
    code.map(str::trim).filter(|c| !c.is_empty())
}

pub fn resolve(
    iata_code: Option<&str>,
    icao_code: Option<&str>,
    previous: Option<&str>,
) -> Result<String, CatalogError> {
    normalize_code(iata_code)
        .or_else(|| normalize_code(icao_code))
        .or(previous)
        .map(str::to_string)
        .ok_or(CatalogError::MissingIdentifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iata_wins_over_icao() {
        assert_eq!(resolve(Some("JFK"), Some("KJFK"), None).unwrap(), "JFK");
    }

    #[test]
    fn icao_used_when_iata_absent_or_blank() {
        assert_eq!(resolve(None, Some("KJFK"), None).unwrap(), "KJFK");
        assert_eq!(resolve(Some("  "), Some("KJFK"), None).unwrap(), "KJFK");
    }

    #[test]
    fn update_without_codes_keeps_previous() {
        assert_eq!(resolve(None, None, Some("JFK")).unwrap(), "JFK");
        assert_eq!(resolve(Some("LGA"), None, Some("JFK")).unwrap(), "LGA");
    }

    #[test]
    fn create_without_codes_fails() {
        assert!(matches!(resolve(None, None, None), Err(CatalogError::MissingIdentifier)));
        assert!(matches!(resolve(Some(""), Some(" "), None), Err(CatalogError::MissingIdentifier)));
    }
}
