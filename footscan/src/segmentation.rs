// Foot segmentation: background-aware Otsu thresholding, morphological
// cleanup, and contour candidate selection.

use anyhow::Result;
use opencv::core::{self, Mat, Point, Rect, Scalar, Size, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use footscan_common::{
    AdaptiveParams, BackgroundPolarity, BoundingBox, FootContour, HeuristicConfig, Point2D,
};

/// Decide the background polarity from the border strips of the blurred
/// grayscale image and the externally computed Otsu threshold.
///
/// A bright border whose Otsu cutoff sits close beneath it means the
/// subject is darker than its surroundings, so the threshold polarity
/// must be inverted before segmentation.
pub fn classify_background(
    blurred: &Mat,
    border_width: i32,
    otsu: f64,
    cfg: &HeuristicConfig,
) -> Result<BackgroundPolarity> {
    let mask = border_mask(blurred.rows(), blurred.cols(), border_width)?;
    let background = core::mean(blurred, &mask)?[0];
    if background > cfg.intensity_midpoint && otsu > cfg.otsu_background_factor * background {
        Ok(BackgroundPolarity::Light)
    } else {
        Ok(BackgroundPolarity::Dark)
    }
}

/// Mask covering strips of `border_width` along all four image edges.
fn border_mask(rows: i32, cols: i32, border_width: i32) -> Result<Mat> {
    let bw = border_width.max(1);
    let mut mask = Mat::zeros(rows, cols, core::CV_8UC1)?.to_mat()?;
    let strips = [
        Rect::new(0, 0, cols, bw),
        Rect::new(0, rows - bw, cols, bw),
        Rect::new(0, 0, bw, rows),
        Rect::new(cols - bw, 0, bw, rows),
    ];
    for strip in strips {
        imgproc::rectangle(&mut mask, strip, Scalar::all(255.0), -1, imgproc::LINE_8, 0)?;
    }
    Ok(mask)
}

/// Threshold the blurred grayscale image into a foreground mask and clean
/// it up with morphological close/open.
///
/// Returns the binary mask together with the polarity decision and the
/// Otsu value that drove it.
pub fn binarize_foreground(
    blurred: &Mat,
    params: &AdaptiveParams,
    cfg: &HeuristicConfig,
) -> Result<(Mat, BackgroundPolarity, f64)> {
    let mut scratch = Mat::default();
    let otsu = imgproc::threshold(
        blurred,
        &mut scratch,
        0.0,
        255.0,
        imgproc::THRESH_BINARY + imgproc::THRESH_OTSU,
    )?;

    let polarity = classify_background(blurred, params.border_width, otsu, cfg)?;
    let thresh_type = if polarity.is_inverted() {
        imgproc::THRESH_BINARY_INV
    } else {
        imgproc::THRESH_BINARY
    };
    let mut binary = Mat::default();
    imgproc::threshold(blurred, &mut binary, otsu, 255.0, thresh_type)?;

    let kernel = imgproc::get_structuring_element(
        imgproc::MORPH_ELLIPSE,
        Size::new(params.kernel_size.0, params.kernel_size.1),
        Point::new(-1, -1),
    )?;
    let mut closed = Mat::default();
    imgproc::morphology_ex(
        &binary,
        &mut closed,
        imgproc::MORPH_CLOSE,
        &kernel,
        Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    let mut opened = Mat::default();
    imgproc::morphology_ex(
        &closed,
        &mut opened,
        imgproc::MORPH_OPEN,
        &kernel,
        Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;

    Ok((opened, polarity, otsu))
}

/// Extract outer contours from a binary mask as candidates with their
/// areas and bounding rectangles.
pub fn extract_contours(binary: &Mat) -> Result<Vec<FootContour>> {
    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours(
        binary,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        Point::new(0, 0),
    )?;

    let mut candidates = Vec::with_capacity(contours.len());
    for contour in contours.iter() {
        let area = imgproc::contour_area(&contour, false)?;
        let rect = imgproc::bounding_rect(&contour)?;
        let points = contour
            .iter()
            .map(|p| Point2D::new(f64::from(p.x), f64::from(p.y)))
            .collect();
        candidates.push(FootContour {
            points,
            area,
            bbox: BoundingBox::new(rect.x, rect.y, rect.width, rect.height),
        });
    }
    Ok(candidates)
}

/// Filter and rank contour candidates into foot candidates.
///
/// Candidates outside the adaptive area window are dropped. Candidates
/// hugging the image border are dropped too unless they cover enough of
/// the frame to plausibly be the subject itself. Survivors are ranked by
/// area, largest first; an empty result means no usable contour.
pub fn select_foot_contours(
    candidates: Vec<FootContour>,
    width: i32,
    height: i32,
    params: &AdaptiveParams,
    cfg: &HeuristicConfig,
) -> Vec<FootContour> {
    let total_area = f64::from(width) * f64::from(height);
    let min_area = total_area * params.min_contour_area_ratio;
    let max_area = total_area * params.max_contour_area_ratio;

    let mut kept: Vec<FootContour> = candidates
        .into_iter()
        .filter(|c| c.area > min_area && c.area < max_area)
        .filter(|c| {
            let near = near_border(&c.bbox, width, height, params.border_width);
            !near || c.area > cfg.near_border_area_exemption * total_area
        })
        .collect();
    kept.sort_by(|a, b| b.area.partial_cmp(&a.area).unwrap_or(std::cmp::Ordering::Equal));
    kept
}

fn near_border(bbox: &BoundingBox, width: i32, height: i32, border_width: i32) -> bool {
    bbox.x < border_width
        || bbox.y < border_width
        || bbox.right() > width - border_width
        || bbox.bottom() > height - border_width
}
