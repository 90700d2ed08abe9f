use std::{ops::RangeInclusive, sync::Arc, sync::LazyLock};

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use geojson::{feature::Id, Feature, Geometry, JsonValue, Value};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::{
    app_state::AppState,
    dedup::DedupError,
    index::Nearest,
    lookup::LookupError,
};

const LATITUDE: RangeInclusive<f64> = -90.0..=90.0;
const LONGITUDE: RangeInclusive<f64> = -180.0..=180.0;

// optional sign, digits, optional fraction
static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap());

pub async fn nearest_station(
    State(state): State<Arc<AppState>>,
    query: Result<Query<NearestParams>, QueryRejection>,
) -> Result<Json<Feature>, SearchError> {
    let Query(params) = query?;
    let lat = parse_coordinate("lat", params.lat.as_deref(), LATITUDE)?;
    let lon = parse_coordinate("lon", params.lon.as_deref(), LONGITUDE)?;

    let nearest = state.lookup.lookup(lat, lon).await?;

    Ok(Json(to_feature(&nearest)))
}

#[derive(Deserialize, Debug, Default)]
pub struct NearestParams {
    lat: Option<String>,
    lon: Option<String>,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("{0}")]
    InvalidQuery(#[from] QueryRejection),
    #[error("Missing required parameter {0}.")]
    MissingParameter(&'static str),
    #[error("Invalid coordinates format.")]
    InvalidFormat { name: &'static str },
    #[error("{name} must be between {min} and {max} degrees.")]
    OutOfRange {
        name: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{0}")]
    Lookup(#[from] LookupError),
}

impl SearchError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidQuery(_)
            | Self::MissingParameter(_)
            | Self::InvalidFormat { .. }
            | Self::OutOfRange { .. } => StatusCode::BAD_REQUEST,
            Self::Lookup(LookupError::NotFound) => StatusCode::NOT_FOUND,
            Self::Lookup(LookupError::LockWait(DedupError::WaitTimeout(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for SearchError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "lookup failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Parses a query coordinate, which has to be a plain decimal number within
/// `range`
pub fn parse_coordinate(
    name: &'static str,
    raw: Option<&str>,
    range: RangeInclusive<f64>,
) -> Result<f64, SearchError> {
    let raw = raw.ok_or(SearchError::MissingParameter(name))?;

    if !DECIMAL.is_match(raw) {
        return Err(SearchError::InvalidFormat { name });
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| SearchError::InvalidFormat { name })?;

    if !range.contains(&value) {
        return Err(SearchError::OutOfRange {
            name: if name == "lat" { "Latitude" } else { "Longitude" },
            min: *range.start(),
            max: *range.end(),
        });
    }

    Ok(value)
}

/// The station as a geojson feature, with the distance added to its properties
pub fn to_feature(nearest: &Nearest) -> Feature {
    let station = &nearest.station;

    let mut properties = station.properties.clone();
    properties.insert(
        "distance_to_station_km".to_string(),
        JsonValue::from(nearest.distance_km),
    );

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![station.lon(), station.lat()]))),
        id: Some(Id::String(station.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    }
}
