//! Grid cell coordinate type.

use std::{f64::consts::FRAC_PI_2, fmt};

use crate::distance::EARTH_RADIUS_KM;

/// A 1°×1° grid cell, identified by the floor of latitude and longitude.
///
/// Longitude is normalised into `[-180, 180)` so that `180.0` and `-180.0`
/// share a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
  /// Floor of the latitude (south edge of the cell).
  pub lat: i32,
  /// Floor of the longitude (west edge of the cell).
  pub lon: i32,
}

impl Cell {
  pub fn new(lat: i32, lon: i32) -> Self { Self { lat, lon: wrap_lon(lon) } }

  /// The cell containing a point.
  pub fn containing(latitude: f64, longitude: f64) -> Self {
    Self::new(latitude.floor() as i32, longitude.floor() as i32)
  }

  /// Every cell that may hold a point within `radius_km` of the centre.
  ///
  /// Uses the exact spherical bounding box of the search circle; when the
  /// circle reaches a pole or spans the globe, all longitudes are covered.
  pub fn covering(latitude: f64, longitude: f64, radius_km: f64) -> Vec<Cell> {
    let delta = radius_km / EARTH_RADIUS_KM;
    let span  = delta.to_degrees();

    let lat_min = (latitude - span).max(-90.0);
    let lat_max = (latitude + span).min(90.0);

    let reaches_pole = latitude - span <= -90.0 || latitude + span >= 90.0;
    let lon_range = if reaches_pole || delta >= FRAC_PI_2 {
      None
    } else {
      let ratio = delta.sin() / latitude.to_radians().cos();
      if ratio >= 1.0 {
        None
      } else {
        let d_lon = ratio.asin().to_degrees();
        let lo = (longitude - d_lon).floor() as i32;
        let hi = (longitude + d_lon).floor() as i32;
        (hi - lo + 1 < 360).then_some((lo, hi))
      }
    };
    let (lon_lo, lon_hi) = lon_range.unwrap_or((-180, 179));

    let mut cells = Vec::new();
    for lat in (lat_min.floor() as i32)..=(lat_max.floor() as i32) {
      for lon in lon_lo..=lon_hi {
        cells.push(Cell::new(lat, lon));
      }
    }
    cells
  }
}

fn wrap_lon(lon: i32) -> i32 { (lon + 180).rem_euclid(360) - 180 }

impl fmt::Display for Cell {
  /// Format as a signed region name (e.g., `+43+006`, `-46+012`).
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:+03}{:+04}", self.lat, self.lon)
  }
}
