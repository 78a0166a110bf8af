//! Great-circle distance.

use leadlens_shared::Coordinates;

/// Mean Earth radius in statute miles.
const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Haversine distance between two points, in miles.
pub fn distance_miles(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        let p = Coordinates { lat: 44.98, lon: -93.27 };
        assert!(distance_miles(p, p).abs() < 1e-9);
    }

    #[test]
    fn minneapolis_to_saint_paul() {
        let minneapolis = Coordinates { lat: 44.9778, lon: -93.2650 };
        let saint_paul = Coordinates { lat: 44.9537, lon: -93.0900 };
        let d = distance_miles(minneapolis, saint_paul);
        assert!((8.0..10.0).contains(&d), "got {d}");
        assert!((d - distance_miles(saint_paul, minneapolis)).abs() < 1e-9);
    }
}
