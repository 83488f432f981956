//! In-memory spatial index over points of interest.
//!
//! The [`GeoIndex`] buckets points into 1°×1° [`Cell`]s and keeps a
//! side-table of full point records keyed by id. Radius queries visit only
//! the cells overlapping the search circle, then filter on exact haversine
//! distance.
//!
//! # Thread Safety
//!
//! The whole index lives behind one `Arc` snapshot. A rebuild assembles the
//! new snapshot without holding any lock and swaps it in with a brief write
//! lock; readers see either the old or the new index, never a partial one.

mod cell;
mod distance;
mod index;

pub mod error;

pub use cell::Cell;
pub use distance::{haversine_km, EARTH_RADIUS_KM};
pub use error::{Error, Result};
pub use index::GeoIndex;
