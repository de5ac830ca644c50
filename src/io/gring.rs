//! Boundary-corner (G-ring) parsing for ECS ODL archive metadata

use crate::types::{GeoError, GeoResult, LatLon};
use regex::Regex;

const LATITUDE_OBJECT: &str = "GRINGPOINTLATITUDE";
const LONGITUDE_OBJECT: &str = "GRINGPOINTLONGITUDE";

fn unavailable(reason: impl Into<String>) -> GeoError {
    // The perimeter builder replaces the cover name with the one it is building.
    GeoError::BoundaryMetadataUnavailable {
        cover: "granule".to_string(),
        reason: reason.into(),
    }
}

/// Read the four G-ring corner points from archive metadata text.
///
/// Expects ODL objects of the form
///
/// ```text
/// OBJECT = GRINGPOINTLATITUDE
///   NUM_VAL = 4
///   VALUE = (36.1, 38.7, 20.9, 18.6)
/// END_OBJECT = GRINGPOINTLATITUDE
/// ```
///
/// Corners are returned in the order the metadata lists them.
pub fn parse_gring_metadata(text: &str) -> GeoResult<[LatLon; 4]> {
    let lats = extract_values(text, LATITUDE_OBJECT)?;
    let lons = extract_values(text, LONGITUDE_OBJECT)?;

    let mut corners = [LatLon::new(0.0, 0.0); 4];
    for (k, corner) in corners.iter_mut().enumerate() {
        let (lat, lon) = (lats[k], lons[k]);
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(unavailable(format!(
                "G-ring corner {} out of range: lat {}, lon {}",
                k, lat, lon
            )));
        }
        *corner = LatLon::new(lat, lon);
    }

    log::debug!(
        "Parsed G-ring corners: {} {} {} {}",
        corners[0],
        corners[1],
        corners[2],
        corners[3]
    );
    Ok(corners)
}

fn extract_values(text: &str, object: &str) -> GeoResult<[f64; 4]> {
    let pattern = format!(
        r"(?s)OBJECT\s*=\s*{obj}\b(.*?)END_OBJECT\s*=\s*{obj}\b",
        obj = object
    );
    let re = Regex::new(&pattern).map_err(|e| unavailable(format!("Regex error: {}", e)))?;
    let body = re
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| unavailable(format!("{} not found in archive metadata", object)))?;

    let value_re = Regex::new(r"VALUE\s*=\s*\(([^)]*)\)")
        .map_err(|e| unavailable(format!("Regex error: {}", e)))?;
    let list = value_re
        .captures(body)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| unavailable(format!("{} has no VALUE list", object)))?;

    let values = list
        .split(',')
        .map(|s| {
            let s = s.trim();
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| unavailable(format!("{} value '{}' is not a number", object, s)))
        })
        .collect::<GeoResult<Vec<f64>>>()?;

    <[f64; 4]>::try_from(values.as_slice()).map_err(|_| {
        unavailable(format!(
            "{} lists {} values, expected 4",
            object,
            values.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ARCHIVE_METADATA: &str = r#"
GROUP                  = GPOLYGON
  OBJECT                 = GPOLYGONCONTAINER
    CLASS                  = "1"
    GROUP                  = GRING
      OBJECT                 = EXCLUSIONGRINGFLAG
        NUM_VAL              = 1
        CLASS                = "1"
        VALUE                = "N"
      END_OBJECT             = EXCLUSIONGRINGFLAG
    END_GROUP              = GRING
    GROUP                  = GRINGPOINT
      OBJECT                 = GRINGPOINTLONGITUDE
        NUM_VAL              = 4
        CLASS                = "1"
        VALUE                = (-87.8013, -54.5627, -50.3214, -96.5012)
      END_OBJECT             = GRINGPOINTLONGITUDE
      OBJECT                 = GRINGPOINTLATITUDE
        NUM_VAL              = 4
        CLASS                = "1"
        VALUE                = (36.1048, 38.7213, 20.9031, 18.6292)
      END_OBJECT             = GRINGPOINTLATITUDE
    END_GROUP              = GRINGPOINT
  END_OBJECT             = GPOLYGONCONTAINER
END_GROUP              = GPOLYGON
"#;

    #[test]
    fn test_parse_corners_in_listed_order() {
        let corners = parse_gring_metadata(ARCHIVE_METADATA).unwrap();
        assert_relative_eq!(corners[0].lat, 36.1048);
        assert_relative_eq!(corners[0].lon, -87.8013);
        assert_relative_eq!(corners[3].lat, 18.6292);
        assert_relative_eq!(corners[3].lon, -96.5012);
    }

    #[test]
    fn test_missing_object_is_unavailable() {
        let text = ARCHIVE_METADATA.replace("GRINGPOINTLATITUDE", "SOMETHINGELSE");
        let err = parse_gring_metadata(&text).unwrap_err();
        assert!(matches!(err, GeoError::BoundaryMetadataUnavailable { .. }));
        assert!(err.to_string().contains(LATITUDE_OBJECT));
    }

    #[test]
    fn test_wrong_count_and_bad_numbers_rejected() {
        let three = ARCHIVE_METADATA.replace(
            "(36.1048, 38.7213, 20.9031, 18.6292)",
            "(36.1048, 38.7213, 20.9031)",
        );
        assert!(parse_gring_metadata(&three).unwrap_err().to_string().contains("expected 4"));

        let garbled = ARCHIVE_METADATA.replace("38.7213", "north");
        assert!(parse_gring_metadata(&garbled).is_err());

        let out_of_range = ARCHIVE_METADATA.replace("38.7213", "138.7213");
        assert!(parse_gring_metadata(&out_of_range).is_err());
    }

    #[test]
    fn test_empty_metadata() {
        assert!(parse_gring_metadata("").is_err());
    }
}
