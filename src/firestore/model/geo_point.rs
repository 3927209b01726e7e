use crate::firestore::error::{invalid_argument, FirestoreResult};

/// Latitude/longitude pair stored in a `geoPointValue`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Fails with `InvalidArgument` when a coordinate is out of range or NaN.
    pub fn new(latitude: f64, longitude: f64) -> FirestoreResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(invalid_argument(format!(
                "Latitude must be a number between -90 and 90, got {latitude}"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid_argument(format!(
                "Longitude must be a number between -180 and 180, got {longitude}"
            )));
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundaries() {
        let point = GeoPoint::new(-90.0, 180.0).unwrap();
        assert_eq!(point.latitude(), -90.0);
        assert_eq!(point.longitude(), 180.0);
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        for (latitude, longitude) in [(90.5, 0.0), (0.0, -181.0), (f64::NAN, 0.0)] {
            let err = GeoPoint::new(latitude, longitude).unwrap_err();
            assert_eq!(err.code_str(), "firestore/invalid-argument");
        }
    }
}
