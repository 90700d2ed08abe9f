use std::sync::Arc;

use geo::Point;
use geojson::JsonObject;

use crate::{distance::haversine_km, lookup::LookupError};

#[cfg(test)]
use mockall::automock;

/// A station loaded from the dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: String,
    /// x is longitude, y is latitude
    pub location: Point<f64>,
    pub properties: JsonObject,
}

impl Station {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64, properties: JsonObject) -> Self {
        Self {
            id: id.into(),
            location: Point::new(lon, lat),
            properties,
        }
    }

    pub fn lat(&self) -> f64 {
        self.location.y()
    }

    pub fn lon(&self) -> f64 {
        self.location.x()
    }
}

/// The closest station to a query point, and how far away it is
#[derive(Debug, Clone)]
pub struct Nearest {
    pub station: Arc<Station>,
    pub distance_km: f64,
}

#[cfg_attr(test, automock)]
pub trait StationSearch: Send + Sync {
    fn nearest(&self, lat: f64, lon: f64) -> Result<Nearest, LookupError>;
}

/// Immutable set of stations, searched exhaustively
#[derive(Debug, Default)]
pub struct StationIndex {
    stations: Vec<Arc<Station>>,
}

impl StationIndex {
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations: stations.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// returns the closest station, or None if the index is empty
    ///
    /// on ties the station that was loaded first wins
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<Nearest> {
        let mut best: Option<Nearest> = None;

        for station in &self.stations {
            let distance_km = haversine_km(lat, lon, station.lat(), station.lon());
            if best.as_ref().map_or(true, |b| distance_km < b.distance_km) {
                best = Some(Nearest {
                    station: Arc::clone(station),
                    distance_km,
                });
            }
        }

        best
    }
}

impl StationSearch for StationIndex {
    fn nearest(&self, lat: f64, lon: f64) -> Result<Nearest, LookupError> {
        StationIndex::nearest(self, lat, lon).ok_or(LookupError::NotFound)
    }
}
