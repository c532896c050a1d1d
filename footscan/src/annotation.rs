// Preview annotation drawn onto the decoded color image.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};

use footscan_common::{CalibrationData, FootContour, FootMeasurements, Point2D};

const PRIMARY_OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const SECONDARY_OUTLINE: Rgb<u8> = Rgb([0, 160, 255]);
const ANCHOR_MARKER: Rgb<u8> = Rgb([255, 0, 0]);
const AXIS_LINE: Rgb<u8> = Rgb([255, 255, 0]);
const MARKER_FRAME: Rgb<u8> = Rgb([255, 0, 255]);

/// Draw the measurement preview: contour outlines for up to two regions,
/// the four anchor points, the length and width axes, and the QR marker
/// when calibration succeeded.
pub fn draw_preview(
    img: &mut RgbImage,
    contours: &[FootContour],
    measurements: &FootMeasurements,
    calibration: &CalibrationData,
    qr_corners: &[Point2D],
) {
    for (i, contour) in contours.iter().take(2).enumerate() {
        let color = if i == 0 {
            PRIMARY_OUTLINE
        } else {
            SECONDARY_OUTLINE
        };
        draw_closed_polyline(img, &contour.points, color);
    }

    draw_segment(img, measurements.heel, measurements.toe, AXIS_LINE);
    draw_segment(img, measurements.left, measurements.right, AXIS_LINE);

    for anchor in [
        measurements.heel,
        measurements.toe,
        measurements.left,
        measurements.right,
    ] {
        draw_filled_circle_mut(img, (anchor.x as i32, anchor.y as i32), 6, ANCHOR_MARKER);
    }

    if calibration.is_calibrated {
        draw_closed_polyline(img, qr_corners, MARKER_FRAME);
        draw_crosshair(img, calibration.qr_center, MARKER_FRAME);
    }
}

fn draw_closed_polyline(img: &mut RgbImage, points: &[Point2D], color: Rgb<u8>) {
    if points.len() < 2 {
        return;
    }
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        draw_segment(img, a, b, color);
    }
}

fn draw_segment(img: &mut RgbImage, a: Point2D, b: Point2D, color: Rgb<u8>) {
    draw_line_segment_mut(
        img,
        (a.x as f32, a.y as f32),
        (b.x as f32, b.y as f32),
        color,
    );
}

fn draw_crosshair(img: &mut RgbImage, center: Point2D, color: Rgb<u8>) {
    let (x, y) = (center.x as f32, center.y as f32);
    let arm = 15.0;
    draw_line_segment_mut(img, (x - arm, y), (x + arm, y), color);
    draw_line_segment_mut(img, (x, y - arm), (x, y + arm), color);
    draw_hollow_circle_mut(img, (center.x as i32, center.y as i32), 5, color);
}
