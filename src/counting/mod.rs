// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 计数核心: 计数线几何 / 越线判定 / 跟踪
//! Counting core: line geometry, crossing detection and tracking

pub mod crossing;
pub mod geometry;
pub mod tracker;
pub mod types;

pub use crossing::{check_line_crossing, side_of_line};
pub use geometry::line_points;
pub use tracker::{NearestTracker, TrackStep, Tracker};
pub use types::*;
