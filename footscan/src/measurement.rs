// Contour geometry to centimeter measurements.

use footscan_common::{CalibrationData, FootContour, FootMeasurements, HeuristicConfig, Point2D};

/// Convert the chosen contour into foot measurements.
///
/// With a valid calibration the pixel distances are divided by the
/// marker-derived pixel density, optionally corrected when the heel sits
/// far from an obliquely captured marker. Without one, a resolution-tiered
/// density estimate stands in. The three sub-segments are fixed shares of
/// the foot length in both branches.
pub fn extract_measurements(
    contour: &FootContour,
    calibration: &CalibrationData,
    width: i32,
    height: i32,
    cfg: &HeuristicConfig,
) -> FootMeasurements {
    if contour.is_empty() {
        // Zero-length output still reports the calibration flag so the
        // caller can tell "no foot" apart from "no marker".
        return FootMeasurements::zeroed(calibration.is_calibrated);
    }

    let (heel, toe, left, right) = extreme_points(&contour.points);
    let length_pixels = heel.distance(toe);
    let width_pixels = left.distance(right);

    let (length_cm, width_cm) = if calibration.is_calibrated {
        let ratio = effective_ratio(calibration, heel, width, height, cfg);
        (length_pixels / ratio, width_pixels / ratio)
    } else {
        let estimated = cfg.fallback_pixels_per_cm(i64::from(width) * i64::from(height));
        (length_pixels / estimated, width_pixels / estimated)
    };

    FootMeasurements {
        length_cm,
        width_cm,
        heel_to_arch_cm: length_cm * cfg.heel_to_arch_ratio,
        arch_to_toe_cm: length_cm * cfg.arch_to_toe_ratio,
        big_toe_length_cm: length_cm * cfg.big_toe_ratio,
        is_calibrated: calibration.is_calibrated,
        heel,
        toe,
        left,
        right,
    }
}

/// Pixel density to divide by, inflated for feet measured far away from an
/// obliquely captured marker.
///
/// A perspective ratio of exactly 1.0 means the marker was either captured
/// head-on or never rectified; in both cases no correction applies.
fn effective_ratio(
    calibration: &CalibrationData,
    heel: Point2D,
    width: i32,
    height: i32,
    cfg: &HeuristicConfig,
) -> f64 {
    let mut ratio = calibration.pixels_per_cm;
    if (calibration.perspective_ratio - 1.0).abs() > f64::EPSILON {
        let longest_side = f64::from(width.max(height));
        let distance_factor = heel.distance(calibration.qr_center) / longest_side;
        if distance_factor > cfg.distance_correction_cutoff {
            ratio *= 1.0
                + (distance_factor - cfg.distance_correction_cutoff)
                    * cfg.distance_correction_gain;
        }
    }
    ratio
}

/// Single-pass extreme point scan. Strict comparisons only, so the first
/// occurrence wins on ties.
fn extreme_points(points: &[Point2D]) -> (Point2D, Point2D, Point2D, Point2D) {
    let first = points[0];
    let mut heel = first;
    let mut toe = first;
    let mut left = first;
    let mut right = first;
    for &p in &points[1..] {
        if p.y > heel.y {
            heel = p;
        }
        if p.y < toe.y {
            toe = p;
        }
        if p.x < left.x {
            left = p;
        }
        if p.x > right.x {
            right = p;
        }
    }
    (heel, toe, left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use footscan_common::BoundingBox;

    /// Diamond with vertical long axis: toe at the top vertex, heel at the
    /// bottom vertex, width across the middle.
    fn diamond_contour(cx: f64, top: f64, half_w: f64, len: f64) -> FootContour {
        let mid = top + len / 2.0;
        FootContour {
            points: vec![
                Point2D::new(cx, top),
                Point2D::new(cx + half_w, mid),
                Point2D::new(cx, top + len),
                Point2D::new(cx - half_w, mid),
            ],
            area: half_w * len,
            bbox: BoundingBox::new(
                (cx - half_w) as i32,
                top as i32,
                (2.0 * half_w) as i32,
                len as i32,
            ),
        }
    }

    fn calibrated(pixels_per_cm: f64, perspective_ratio: f64, qr_center: Point2D) -> CalibrationData {
        CalibrationData {
            pixels_per_cm,
            qr_center,
            qr_size_pixels_raw: 480.0,
            qr_size_pixels_corrected: 500.0,
            is_calibrated: true,
            qr_modules: 21,
            perspective_ratio,
            qr_content: "fitting-marker".to_string(),
        }
    }

    #[test]
    fn calibrated_contour_measures_in_cm() {
        let cfg = HeuristicConfig::default();
        let contour = diamond_contour(300.0, 100.0, 250.0, 1250.0);
        let cal = calibrated(50.0, 1.0, Point2D::new(120.0, 120.0));
        let m = extract_measurements(&contour, &cal, 1600, 1600, &cfg);
        assert!(m.is_calibrated);
        // 1250 px heel to toe and 500 px across at 50 px/cm.
        assert!((m.length_cm - 25.0).abs() < 1e-9);
        assert!((m.width_cm - 10.0).abs() < 1e-9);
        assert_eq!(m.heel, Point2D::new(300.0, 1350.0));
        assert_eq!(m.toe, Point2D::new(300.0, 100.0));
    }

    #[test]
    fn derived_segments_are_fixed_shares_of_length() {
        let cfg = HeuristicConfig::default();
        let contour = diamond_contour(160.0, 10.0, 150.0, 900.0);
        for cal in [
            calibrated(50.0, 1.0, Point2D::new(0.0, 0.0)),
            CalibrationData::uncalibrated(),
        ] {
            let m = extract_measurements(&contour, &cal, 1000, 1000, &cfg);
            assert!((m.heel_to_arch_cm - 0.60 * m.length_cm).abs() < 1e-12);
            assert!((m.arch_to_toe_cm - 0.40 * m.length_cm).abs() < 1e-12);
            assert!((m.big_toe_length_cm - 0.15 * m.length_cm).abs() < 1e-12);
        }
    }

    #[test]
    fn empty_contour_yields_zeros_with_calibration_flag() {
        // Known quirk: the flag mirrors the calibration outcome even when
        // every measurement is zero.
        let cfg = HeuristicConfig::default();
        let empty = FootContour::default();
        let cal = calibrated(50.0, 1.0, Point2D::new(0.0, 0.0));
        let m = extract_measurements(&empty, &cal, 1000, 1000, &cfg);
        assert_eq!(m.as_vector(), [0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);

        let m = extract_measurements(&empty, &CalibrationData::uncalibrated(), 1000, 1000, &cfg);
        assert_eq!(m.as_vector(), [0.0; 6]);
    }

    #[test]
    fn extreme_points_first_occurrence_wins() {
        let contour = FootContour {
            points: vec![
                Point2D::new(5.0, 9.0),
                Point2D::new(2.0, 9.0),
                Point2D::new(2.0, 1.0),
                Point2D::new(8.0, 1.0),
            ],
            area: 1.0,
            bbox: BoundingBox::default(),
        };
        let (heel, toe, left, right) = extreme_points(&contour.points);
        // Both y=9 points tie for heel; the first scanned stays.
        assert_eq!(heel, Point2D::new(5.0, 9.0));
        assert_eq!(toe, Point2D::new(2.0, 1.0));
        assert_eq!(left, Point2D::new(2.0, 9.0));
        assert_eq!(right, Point2D::new(8.0, 1.0));
    }

    #[test]
    fn uncalibrated_fallback_uses_resolution_tiers() {
        let cfg = HeuristicConfig::default();
        let contour = diamond_contour(150.0, 0.0, 150.0, 900.0);
        let cal = CalibrationData::uncalibrated();

        // 2048x1536 = 3.1 Mpx -> 150 px/cm.
        let m = extract_measurements(&contour, &cal, 2048, 1536, &cfg);
        assert!((m.length_cm - 900.0 / 150.0).abs() < 1e-9);
        // 1500x1000 = 1.5 Mpx -> 120 px/cm.
        let m = extract_measurements(&contour, &cal, 1500, 1000, &cfg);
        assert!((m.length_cm - 900.0 / 120.0).abs() < 1e-9);
        // 1000x1000 = exactly 1 Mpx -> 90 px/cm.
        let m = extract_measurements(&contour, &cal, 1000, 1000, &cfg);
        assert!((m.length_cm - 900.0 / 90.0).abs() < 1e-9);
        assert!(!m.is_calibrated);
    }

    #[test]
    fn head_on_capture_gets_no_distance_correction() {
        let cfg = HeuristicConfig::default();
        let contour = diamond_contour(150.0, 0.0, 150.0, 900.0);
        // Perspective ratio exactly 1.0: heel distance is irrelevant.
        let cal = calibrated(50.0, 1.0, Point2D::new(5000.0, 5000.0));
        let m = extract_measurements(&contour, &cal, 1000, 1000, &cfg);
        assert!((m.length_cm - 900.0 / 50.0).abs() < 1e-9);
    }

    #[test]
    fn distant_heel_inflates_effective_ratio_under_perspective() {
        let cfg = HeuristicConfig::default();
        // Heel at (150, 900), marker at (150, 100): 800 px apart in a
        // 1000 px frame, so the distance factor is 0.8.
        let contour = diamond_contour(150.0, 0.0, 150.0, 900.0);
        let cal = calibrated(50.0, 1.0417, Point2D::new(150.0, 100.0));
        let m = extract_measurements(&contour, &cal, 1000, 1000, &cfg);
        let corrected = 50.0 * (1.0 + (0.8 - 0.3) * 0.1);
        assert!((m.length_cm - 900.0 / corrected).abs() < 1e-9);
    }

    #[test]
    fn close_heel_is_not_corrected_even_under_perspective() {
        let cfg = HeuristicConfig::default();
        // Distance factor 200/1000 = 0.2, below the 0.3 cutoff.
        let contour = diamond_contour(150.0, 0.0, 150.0, 900.0);
        let cal = calibrated(50.0, 1.0417, Point2D::new(150.0, 700.0));
        let m = extract_measurements(&contour, &cal, 1000, 1000, &cfg);
        assert!((m.length_cm - 900.0 / 50.0).abs() < 1e-9);
    }
}
