use std::{fs::read_to_string, path::Path};

use geojson::{feature::Id, Feature, GeoJson, Value};
use thiserror::Error;

use crate::index::{Station, StationIndex};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("io error")]
    Io(#[from] std::io::Error),
    #[error("geojson error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("dataset is not a FeatureCollection")]
    NotAFeatureCollection,
    #[error("feature {index}: {message}")]
    InvalidFeature { index: usize, message: String },
}

pub fn load_stations(path: &Path) -> Result<StationIndex, DatasetError> {
    let contents = read_to_string(path)?;
    parse_stations(&contents)
}

/// Parses a FeatureCollection of points into an index, keeping the order of
/// the features
pub fn parse_stations(contents: &str) -> Result<StationIndex, DatasetError> {
    let GeoJson::FeatureCollection(collection) = contents.parse::<GeoJson>()? else {
        return Err(DatasetError::NotAFeatureCollection);
    };

    let stations = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| to_station(index, feature))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StationIndex::new(stations))
}

fn to_station(index: usize, feature: Feature) -> Result<Station, DatasetError> {
    let err = |message: &str| DatasetError::InvalidFeature {
        index,
        message: message.to_string(),
    };

    let Some(Value::Point(point)) = feature.geometry.as_ref().map(|g| &g.value) else {
        return Err(err("geometry is not a point"));
    };
    // geojson positions are [longitude, latitude]
    let &[lon, lat, ..] = point.as_slice() else {
        return Err(err("point has fewer than two coordinates"));
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(err("coordinates are out of range"));
    }

    let id = match &feature.id {
        Some(Id::String(s)) => s.clone(),
        Some(Id::Number(n)) => n.to_string(),
        None => feature
            .property("name")
            .and_then(|name| name.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| index.to_string()),
    };

    Ok(Station::new(id, lat, lon, feature.properties.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATIONS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": "north",
                "geometry": { "type": "Point", "coordinates": [10.0, 50.0] },
                "properties": { "name": "Nordbahnhof", "lines": 3 }
            },
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [10.5, 49.5] },
                "properties": { "name": "Südbahnhof" }
            },
            {
                "type": "Feature",
                "id": 17,
                "geometry": { "type": "Point", "coordinates": [11.0, 49.0] },
                "properties": null
            }
        ]
    }"#;

    #[test]
    fn test_parse() {
        let index = parse_stations(STATIONS).unwrap();
        assert_eq!(index.len(), 3);

        let north = index.nearest(50.0, 10.0).unwrap();
        assert_eq!(north.station.id, "north");
        assert_eq!(north.station.properties["lines"], 3);
        assert_eq!(north.station.lat(), 50.0);
        assert_eq!(north.station.lon(), 10.0);

        assert_eq!(index.nearest(49.5, 10.5).unwrap().station.id, "Südbahnhof");

        let numbered = index.nearest(49.0, 11.0).unwrap();
        assert_eq!(numbered.station.id, "17");
        assert!(numbered.station.properties.is_empty());
    }

    #[test]
    fn test_empty_collection() {
        let index = parse_stations(r#"{ "type": "FeatureCollection", "features": [] }"#).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_not_a_collection() {
        let res = parse_stations(r#"{ "type": "Point", "coordinates": [1.0, 2.0] }"#);
        assert!(matches!(res, Err(DatasetError::NotAFeatureCollection)));
    }

    #[test]
    fn test_rejects_non_points() {
        let res = parse_stations(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "geometry": { "type": "Point", "coordinates": [1.0, 2.0] },
                        "properties": {}
                    },
                    {
                        "type": "Feature",
                        "geometry": { "type": "LineString", "coordinates": [[1.0, 2.0], [3.0, 4.0]] },
                        "properties": {}
                    }
                ]
            }"#,
        );
        assert!(matches!(
            res,
            Err(DatasetError::InvalidFeature { index: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let res = parse_stations(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "geometry": { "type": "Point", "coordinates": [200.0, 2.0] },
                        "properties": {}
                    }
                ]
            }"#,
        );
        assert!(matches!(
            res,
            Err(DatasetError::InvalidFeature { index: 0, .. })
        ));
    }
}
