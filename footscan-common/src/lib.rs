//! Shared data model for the footscan measurement pipeline.
//!
//! Everything in this crate is plain data: geometry, calibration results,
//! measurement results, and the tunable heuristics that drive the decision
//! logic. No image-processing types cross this crate's API, so downstream
//! crates (the pipeline, the FFI boundary, tooling) can exchange results
//! without pulling in OpenCV.

mod types;

pub use types::*;
