/// Mean radius of the earth, in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers
///
/// Inputs are degrees and are expected to be range-checked by the caller
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use geo::{HaversineDistance, Point};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn random_coords(rng: &mut StdRng) -> (f64, f64) {
        (rng.gen_range(-90.0..=90.0), rng.gen_range(-180.0..=180.0))
    }

    #[test]
    fn test_same_point_is_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let (lat, lon) = random_coords(&mut rng);
            assert_eq!(haversine_km(lat, lon, lat, lon), 0.0);
        }
    }

    #[test]
    fn test_symmetric() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let (lat1, lon1) = random_coords(&mut rng);
            let (lat2, lon2) = random_coords(&mut rng);

            let there = haversine_km(lat1, lon1, lat2, lon2);
            let back = haversine_km(lat2, lon2, lat1, lon1);
            assert!((there - back).abs() < 1e-9, "{there} != {back}");
        }
    }

    #[test]
    fn test_known_distances() {
        // a degree of longitude on the equator
        let degree = haversine_km(0.0, 0.0, 0.0, 1.0);
        assert!((degree - 111.195).abs() < 0.001, "{degree}");

        let d = haversine_km(0.0, 0.0, 0.0, 0.4);
        assert!((d - 44.478).abs() < 0.001, "{d}");

        // antipodes
        let half = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!((half - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_grows_with_separation() {
        let mut last = 0.0;
        for i in 1..=180 {
            let d = haversine_km(10.0, 0.0, 10.0, i as f64 * 0.5);
            assert!(d > last);
            last = d;
        }
    }

    #[test]
    fn test_agrees_with_geo() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let (lat1, lon1) = random_coords(&mut rng);
            let (lat2, lon2) = random_coords(&mut rng);

            // geo uses a slightly different radius, so compare relatively
            let ours = haversine_km(lat1, lon1, lat2, lon2);
            let theirs =
                Point::new(lon1, lat1).haversine_distance(&Point::new(lon2, lat2)) / 1000.0;
            assert!((ours - theirs).abs() <= theirs * 1e-4 + 1e-9);
        }
    }
}
