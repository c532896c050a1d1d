//! Foot measurement from a single photograph with a QR scale marker.
//!
//! The pipeline segments the dominant foot-like contour, calibrates pixel
//! distances against a QR code of known physical size, and reports foot
//! length, width, and three derived sub-segments in centimeters. When no
//! trustworthy marker is visible the measurements fall back to a
//! resolution-tiered pixel density estimate and are flagged accordingly.
//!
//! Typical usage:
//! ```no_run
//! use footscan::FootScanPipeline;
//!
//! # fn example() -> Result<(), footscan::PipelineError> {
//! let pipeline = FootScanPipeline::new();
//! let measurements = pipeline.extract_measurements("foot.jpg", 5.0)?;
//! println!("foot length: {:.1} cm", measurements.length_cm);
//! # Ok(())
//! # }
//! ```

pub mod annotation;
pub mod calibration;
pub mod detection;
pub mod measurement;
pub mod pipeline;
pub mod segmentation;

pub use footscan_common::{
    AdaptiveParams, BackgroundPolarity, BoundingBox, CalibrationData, FootContour,
    FootMeasurements, HeuristicConfig, Point2D,
};
pub use pipeline::{FootScanPipeline, PipelineError};
