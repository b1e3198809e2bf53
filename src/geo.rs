/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters (haversine).
///
/// Total over all f64 inputs: NaN coordinates produce a NaN distance, which
/// callers treat as "not verifiable" rather than a pass.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Check-in proximity decision. `Ok` when the computed distance is within
/// `max_distance_m`; `Err` carries the distance for the client payload.
/// A NaN distance never passes.
pub fn within_radius(
    distance_m: f64,
    max_distance_m: f64,
) -> std::result::Result<f64, f64> {
    if distance_m.is_nan() || distance_m > max_distance_m {
        Err(distance_m)
    } else {
        Ok(distance_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        assert_eq!(distance_meters(52.52, 13.405, 52.52, 13.405), 0.0);
        assert_eq!(distance_meters(0.0, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let d1 = distance_meters(48.8566, 2.3522, 51.5074, -0.1278);
        let d2 = distance_meters(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d1 - d2).abs() < 1e-6);
    }

    #[test]
    fn paris_to_london_is_about_344_km() {
        let d = distance_meters(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((d - 343_900.0).abs() < 2_000.0, "got {d}");
    }

    #[test]
    fn short_hop_across_a_parking_lot() {
        // ~111m per 0.001 degree of latitude
        let d = distance_meters(10.762, 106.660, 10.763, 106.660);
        assert!(d > 100.0 && d < 125.0, "got {d}");
    }

    #[test]
    fn nan_coordinates_propagate() {
        assert!(distance_meters(f64::NAN, 0.0, 0.0, 0.0).is_nan());
        assert!(distance_meters(0.0, 0.0, 0.0, f64::NAN).is_nan());
    }

    #[test]
    fn radius_gate_rejects_far_and_nan() {
        assert_eq!(within_radius(150_000.0, 100_000.0), Err(150_000.0));
        assert!(within_radius(f64::NAN, 100_000.0).is_err());
        assert_eq!(within_radius(50.0, 100.0), Ok(50.0));
        assert_eq!(within_radius(100.0, 100.0), Ok(100.0));
    }
}
