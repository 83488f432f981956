//! Great-circle distance.

/// Mean Earth radius used for all distance maths.
pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Haversine distance between two points, in kilometres.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
  let lat1_rad  = lat1.to_radians();
  let lat2_rad  = lat2.to_radians();
  let delta_lat = (lat2 - lat1).to_radians();
  let delta_lng = (lng2 - lng1).to_radians();

  let a = (delta_lat / 2.0).sin().powi(2)
    + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
  let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

  EARTH_RADIUS_KM * c
}
