// QR marker geometry to a validated pixels-per-centimeter calibration.

use anyhow::Result;
use opencv::core::{AlgorithmHint, Mat};
use opencv::imgproc;
use opencv::prelude::*;

use footscan_common::{CalibrationData, HeuristicConfig, Point2D};

use crate::detection::QrDetection;

/// Turn a QR detection into a calibration, or mark the request
/// uncalibrated.
///
/// Rejection reasons: no decodable marker, a module count outside the
/// standard range, excessive perspective distortion, or a pixel density
/// outside the plausible capture window. Internal errors (malformed
/// detector output, pixel access failures) also degrade to uncalibrated;
/// calibration never fails a request.
pub fn estimate_calibration(
    det: &QrDetection,
    qr_real_size_cm: f64,
    cfg: &HeuristicConfig,
) -> CalibrationData {
    try_estimate(det, qr_real_size_cm, cfg).unwrap_or_else(|_| CalibrationData::uncalibrated())
}

fn try_estimate(
    det: &QrDetection,
    qr_real_size_cm: f64,
    cfg: &HeuristicConfig,
) -> Result<CalibrationData> {
    if !det.found() || qr_real_size_cm <= 0.0 {
        return Ok(CalibrationData::uncalibrated());
    }

    let raw_modules = if det.has_rectified() {
        estimate_module_count(&det.rectified)?
    } else {
        0
    };
    // Snap first, range-check second. A raw estimate that matches no
    // standard count but still lands inside [21,177] is accepted as-is.
    let qr_modules = snap_to_standard(raw_modules, cfg);
    if !cfg.accepts_module_count(qr_modules) {
        return Ok(CalibrationData::uncalibrated());
    }

    let qr_center = centroid(&det.points);
    let qr_size_pixels_raw = mean_edge_length(&det.points);
    if qr_size_pixels_raw <= 0.0 {
        return Ok(CalibrationData::uncalibrated());
    }

    let (qr_size_pixels_corrected, perspective_ratio) = if det.has_rectified() {
        let corrected = f64::from(det.rectified.rows().min(det.rectified.cols()));
        (corrected, corrected / qr_size_pixels_raw)
    } else {
        (qr_size_pixels_raw, 1.0)
    };
    if !cfg.accepts_perspective_ratio(perspective_ratio) {
        return Ok(CalibrationData::uncalibrated());
    }

    let pixels_per_cm = qr_size_pixels_corrected / qr_real_size_cm;
    if !cfg.accepts_pixels_per_cm(pixels_per_cm) {
        return Ok(CalibrationData::uncalibrated());
    }

    Ok(CalibrationData {
        pixels_per_cm,
        qr_center,
        qr_size_pixels_raw,
        qr_size_pixels_corrected,
        is_calibrated: true,
        qr_modules,
        perspective_ratio,
        qr_content: det.content.clone(),
    })
}

fn centroid(points: &[Point2D]) -> Point2D {
    let n = points.len() as f64;
    let x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let y = points.iter().map(|p| p.y).sum::<f64>() / n;
    Point2D::new(x, y)
}

/// Mean of the four consecutive edge lengths of the detected
/// quadrilateral, in the detector's cyclic corner order.
fn mean_edge_length(points: &[Point2D]) -> f64 {
    let n = points.len();
    let total: f64 = (0..n)
        .map(|i| points[i].distance(points[(i + 1) % n]))
        .sum();
    total / n as f64
}

/// Estimate the marker's module count by scanning the horizontal mid-row
/// of the rectified image and counting polarity transitions.
fn estimate_module_count(rectified: &Mat) -> Result<i32> {
    let binary = binarize_marker(rectified)?;
    let mid = binary.rows() / 2;
    let mut row = Vec::with_capacity(binary.cols() as usize);
    for col in 0..binary.cols() {
        row.push(*binary.at_2d::<u8>(mid, col)?);
    }
    Ok(modules_from_scanline(&row))
}

fn binarize_marker(marker: &Mat) -> Result<Mat> {
    let mut binary = Mat::default();
    if marker.channels() > 1 {
        let mut gray = Mat::default();
        imgproc::cvt_color(
            marker,
            &mut gray,
            imgproc::COLOR_RGB2GRAY,
            0,
            AlgorithmHint::ALGO_HINT_DEFAULT,
        )?;
        imgproc::threshold(
            &gray,
            &mut binary,
            0.0,
            255.0,
            imgproc::THRESH_BINARY + imgproc::THRESH_OTSU,
        )?;
    } else {
        imgproc::threshold(marker, &mut binary, 127.0, 255.0, imgproc::THRESH_BINARY)?;
    }
    Ok(binary)
}

pub(crate) fn modules_from_scanline(row: &[u8]) -> i32 {
    if row.is_empty() {
        return 0;
    }
    let mut transitions = 0;
    for pair in row.windows(2) {
        if (pair[0] > 127) != (pair[1] > 127) {
            transitions += 1;
        }
    }
    (transitions + 1) / 2
}

/// Snap a raw module estimate to the nearest standard QR size
/// (21, 25, ..., 177) when strictly within the snap tolerance; otherwise
/// keep the raw estimate for the subsequent range check.
pub(crate) fn snap_to_standard(raw: i32, cfg: &HeuristicConfig) -> i32 {
    let mut nearest = cfg.min_qr_modules;
    let mut best = (raw - nearest).abs();
    let mut candidate = cfg.min_qr_modules + cfg.module_step;
    while candidate <= cfg.max_qr_modules {
        let d = (raw - candidate).abs();
        if d < best {
            best = d;
            nearest = candidate;
        }
        candidate += cfg.module_step;
    }
    if best < cfg.module_snap_tolerance {
        nearest
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Square single-channel marker image with `runs` alternating vertical
    /// stripes, giving a known mid-row transition count.
    fn striped_square(size: i32, runs: i32) -> Mat {
        let mut data = vec![0u8; (size * size) as usize];
        for r in 0..size {
            for c in 0..size {
                let run = (c * runs) / size;
                data[(r * size + c) as usize] = if run % 2 == 0 { 0 } else { 255 };
            }
        }
        Mat::from_slice(&data)
            .unwrap()
            .reshape(1, size)
            .unwrap()
            .try_clone()
            .unwrap()
    }

    /// Detection with an axis-aligned square quadrilateral of the given
    /// side length.
    fn square_detection(side: f64, rectified: Mat) -> QrDetection {
        QrDetection {
            points: vec![
                Point2D::new(0.0, 0.0),
                Point2D::new(side, 0.0),
                Point2D::new(side, side),
                Point2D::new(0.0, side),
            ],
            content: "fitting-marker".to_string(),
            rectified,
        }
    }

    #[test]
    fn scanline_counts_modules() {
        assert_eq!(modules_from_scanline(&[]), 0);
        assert_eq!(modules_from_scanline(&[0, 0, 0, 0]), 0);
        // Three runs -> two transitions -> one module pair rounded up.
        assert_eq!(modules_from_scanline(&[0, 0, 255, 255, 0, 0]), 1);
        // 42 alternating runs -> 41 transitions -> 21 modules.
        let row: Vec<u8> = (0..42).flat_map(|i| [if i % 2 == 0 { 0 } else { 255 }; 4]).collect();
        assert_eq!(modules_from_scanline(&row), 21);
    }

    #[test]
    fn snap_pulls_near_misses_onto_standard_sizes() {
        let cfg = HeuristicConfig::default();
        assert_eq!(snap_to_standard(21, &cfg), 21);
        assert_eq!(snap_to_standard(20, &cfg), 21);
        assert_eq!(snap_to_standard(26, &cfg), 25);
        assert_eq!(snap_to_standard(176, &cfg), 177);
    }

    #[test]
    fn snap_keeps_raw_estimate_outside_tolerance() {
        let cfg = HeuristicConfig::default();
        // Equidistant between 21 and 25, and exactly at the tolerance: the
        // raw value survives and only the range check decides.
        assert_eq!(snap_to_standard(23, &cfg), 23);
        assert_eq!(snap_to_standard(19, &cfg), 19);
        assert_eq!(snap_to_standard(0, &cfg), 0);
    }

    #[test]
    fn accepted_marker_produces_calibration() {
        let cfg = HeuristicConfig::default();
        let det = square_detection(480.0, striped_square(500, 42));
        let cal = estimate_calibration(&det, 10.0, &cfg);
        assert!(cal.is_calibrated);
        assert_eq!(cal.qr_modules, 21);
        assert!((cal.pixels_per_cm - 50.0).abs() < 1e-9);
        assert!((cal.perspective_ratio - 500.0 / 480.0).abs() < 1e-9);
        assert!((cal.qr_size_pixels_raw - 480.0).abs() < 1e-9);
        assert!((cal.qr_size_pixels_corrected - 500.0).abs() < 1e-9);
        assert!((cal.qr_center.x - 240.0).abs() < 1e-9);
        assert!((cal.qr_center.y - 240.0).abs() < 1e-9);
        assert_eq!(cal.qr_content, "fitting-marker");
    }

    #[test]
    fn oblique_marker_is_rejected() {
        // Rectified size far below the raw size: ratio 150/480 = 0.3125.
        let cfg = HeuristicConfig::default();
        let det = square_detection(480.0, striped_square(150, 42));
        let cal = estimate_calibration(&det, 10.0, &cfg);
        assert!(!cal.is_calibrated);
    }

    #[test]
    fn perspective_ratio_boundary_is_rejected() {
        // 240/480 lands exactly on the 0.5 bound, which is exclusive.
        let cfg = HeuristicConfig::default();
        let det = square_detection(480.0, striped_square(240, 42));
        let cal = estimate_calibration(&det, 10.0, &cfg);
        assert!(!cal.is_calibrated);
    }

    #[test]
    fn pixel_density_boundary_is_rejected() {
        // 300 px rectified over 10 cm is exactly 30 px/cm, which is
        // exclusive.
        let cfg = HeuristicConfig::default();
        let det = square_detection(290.0, striped_square(300, 42));
        let cal = estimate_calibration(&det, 10.0, &cfg);
        assert!(!cal.is_calibrated);
    }

    #[test]
    fn nonstandard_module_estimate_is_rejected() {
        // 38 runs -> raw estimate 19, outside the snap tolerance and below
        // the standard range.
        let cfg = HeuristicConfig::default();
        let det = square_detection(480.0, striped_square(500, 38));
        let cal = estimate_calibration(&det, 10.0, &cfg);
        assert!(!cal.is_calibrated);
    }

    #[test]
    fn missing_rectified_image_is_rejected() {
        // Decode succeeded but no rectified marker: the module estimate is
        // zero and fails the range check.
        let cfg = HeuristicConfig::default();
        let det = square_detection(480.0, Mat::default());
        let cal = estimate_calibration(&det, 10.0, &cfg);
        assert!(!cal.is_calibrated);
    }

    #[test]
    fn undecoded_marker_is_rejected() {
        let cfg = HeuristicConfig::default();
        let cal = estimate_calibration(&QrDetection::empty(), 10.0, &cfg);
        assert!(!cal.is_calibrated);
        assert_eq!(cal, CalibrationData::uncalibrated());
    }

    #[test]
    fn nonpositive_marker_size_is_rejected() {
        let cfg = HeuristicConfig::default();
        let det = square_detection(480.0, striped_square(500, 42));
        assert!(!estimate_calibration(&det, 0.0, &cfg).is_calibrated);
        assert!(!estimate_calibration(&det, -5.0, &cfg).is_calibrated);
    }
}
