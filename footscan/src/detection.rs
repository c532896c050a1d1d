// QR marker detection via the OpenCV QR detector.

use anyhow::Result;
use opencv::core::{Mat, Point2f, Vector};
use opencv::objdetect::QRCodeDetector;
use opencv::prelude::*;

use footscan_common::Point2D;

/// Raw output of the QR detector: corner points in detector cyclic order,
/// the decoded payload, and the perspective-rectified marker image (empty
/// when the detector could not rectify).
pub struct QrDetection {
    pub points: Vec<Point2D>,
    pub content: String,
    pub rectified: Mat,
}

impl QrDetection {
    /// The no-marker result.
    pub fn empty() -> Self {
        Self {
            points: Vec::new(),
            content: String::new(),
            rectified: Mat::default(),
        }
    }

    /// Whether the detector produced a decodable marker with four corners.
    pub fn found(&self) -> bool {
        !self.content.is_empty() && self.points.len() == 4
    }

    /// Whether a non-empty rectified marker image is available.
    pub fn has_rectified(&self) -> bool {
        self.rectified.rows() > 0 && self.rectified.cols() > 0
    }
}

/// Detect at most one QR marker in the image.
///
/// Detector failures are never fatal: the pipeline continues uncalibrated,
/// so any error degrades to the empty detection.
pub fn detect_qr(image: &Mat) -> QrDetection {
    try_detect(image).unwrap_or_else(|_| QrDetection::empty())
}

fn try_detect(image: &Mat) -> Result<QrDetection> {
    let detector = QRCodeDetector::default()?;
    let mut points = Vector::<Point2f>::new();
    let mut rectified = Mat::default();
    let payload = detector.detect_and_decode(image, &mut points, &mut rectified)?;
    let content = String::from_utf8_lossy(&payload).into_owned();
    let corners = points
        .iter()
        .map(|p| Point2D::new(f64::from(p.x), f64::from(p.y)))
        .collect();
    Ok(QrDetection {
        points: corners,
        content,
        rectified,
    })
}
