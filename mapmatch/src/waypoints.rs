//! Converts a GeoJSON FeatureCollection of points into the waypoints the Geoapify map matching
//! API expects: `{"mode": "drive", "waypoints": [{"timestamp": "...", "location": [lon, lat]}]}`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::Error;

/// Every request asks for car routing.
pub const MAPMATCH_MODE: &str = "drive";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";
// Points without any timestamp are assumed to be this far apart.
const SYNTHETIC_SECONDS_PER_POINT: i64 = 10;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Waypoint {
    pub timestamp: String,
    /// [longitude, latitude]
    pub location: [f64; 2],
}

/// All of the waypoints for one run, in input order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapMatchRequest {
    pub mode: String,
    pub waypoints: Vec<Waypoint>,
}

/// The JSON body of one HTTP request, covering some contiguous slice of the waypoints.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct RequestBody<'a> {
    pub mode: &'a str,
    pub waypoints: &'a [Waypoint],
}

impl MapMatchRequest {
    pub fn body<'a>(&'a self, waypoints: &'a [Waypoint]) -> RequestBody<'a> {
        RequestBody {
            mode: &self.mode,
            waypoints,
        }
    }
}

/// Features without a geometry or with fewer than 2 coordinates are skipped. The first two
/// coordinates must be numbers (or strings holding numbers); anything else fails the conversion.
pub fn to_waypoints(geojson: &Value) -> Result<MapMatchRequest, Error> {
    let features = match geojson.get("features") {
        Some(Value::Array(features)) => features.as_slice(),
        _ => &[],
    };

    let mut waypoints = Vec::new();
    for (idx, feature) in features.iter().enumerate() {
        let coords = match feature
            .get("geometry")
            .and_then(|geometry| geometry.get("coordinates"))
            .and_then(Value::as_array)
        {
            Some(coords) if coords.len() >= 2 => coords,
            _ => continue,
        };
        let lon = coerce_coordinate(idx, &coords[0])?;
        let lat = coerce_coordinate(idx, &coords[1])?;

        let properties = feature.get("properties");
        let timestamp = ["timestamp", "t"]
            .iter()
            .filter_map(|key| properties.and_then(|props| props.get(*key)))
            .find(|value| !is_blank(value));
        let timestamp = match timestamp {
            Some(value) => timestamp_to_iso(value)?,
            None => format_unix_seconds(idx as i64 * SYNTHETIC_SECONDS_PER_POINT)?,
        };

        waypoints.push(Waypoint {
            timestamp,
            location: [lon, lat],
        });
    }

    Ok(MapMatchRequest {
        mode: MAPMATCH_MODE.to_string(),
        waypoints,
    })
}

// Null, zero, "", false, [] and {} don't count as a timestamp; the next candidate applies.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(list) => list.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Numbers are Unix seconds in UTC (`true` counts as 1), strings are trusted as-is, and anything
/// else is replaced by the current time.
pub fn timestamp_to_iso(value: &Value) -> Result<String, Error> {
    match value {
        Value::Bool(true) => format_unix_seconds(1),
        Value::Number(n) => {
            let secs = match n.as_i64() {
                Some(secs) => secs,
                None => {
                    let secs = n.as_f64().unwrap_or(f64::NAN).floor();
                    if !secs.is_finite() || secs < i64::MIN as f64 || secs > i64::MAX as f64 {
                        return Err(out_of_range(value));
                    }
                    secs as i64
                }
            };
            format_unix_seconds(secs).map_err(|_| out_of_range(value))
        }
        Value::String(s) => Ok(s.clone()),
        _ => Ok(Utc::now().format(TIMESTAMP_FORMAT).to_string()),
    }
}

fn format_unix_seconds(secs: i64) -> Result<String, Error> {
    let dt: DateTime<Utc> = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Conversion(format!("timestamp {} is out of range", secs)))?;
    Ok(dt.format(TIMESTAMP_FORMAT).to_string())
}

fn out_of_range(value: &Value) -> Error {
    Error::Conversion(format!("timestamp {} is out of range", value))
}

fn coerce_coordinate(idx: usize, value: &Value) -> Result<f64, Error> {
    let coerced = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match coerced {
        Some(x) if x.is_finite() => Ok(x),
        _ => Err(Error::Conversion(format!(
            "Feature {} has a coordinate that isn't a number: {}",
            idx, value
        ))),
    }
}
