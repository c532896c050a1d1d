// Request orchestration: one image in, one result out.

use std::io::Cursor;

use image::RgbImage;
use log::{debug, warn};
use opencv::core::{AlgorithmHint, Mat, Point, Scalar, Size, Vector, BORDER_DEFAULT};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;

use footscan_common::{
    AdaptiveParams, CalibrationData, FootContour, FootMeasurements, HeuristicConfig,
};

use crate::detection::{self, QrDetection};
use crate::measurement;
use crate::segmentation;
use crate::{annotation, calibration};

/// Request-level failure taxonomy.
///
/// A missing calibration is not a failure: the pipeline continues with the
/// resolution-tiered fallback and flags the result instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Null, empty, or otherwise malformed request parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The image file could not be read or decoded.
    #[error("failed to decode image: {0}")]
    DecodeFailure(String),
    /// Segmentation produced no contour that passed the candidate filter.
    #[error("no usable foot contour found")]
    NoUsableContour,
    /// Unexpected computation error inside a stage.
    #[error("internal pipeline error: {0}")]
    Internal(String),
}

impl From<opencv::Error> for PipelineError {
    fn from(e: opencv::Error) -> Self {
        PipelineError::Internal(e.to_string())
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        PipelineError::Internal(e.to_string())
    }
}

/// Everything the per-request analysis produced: ranked foot candidates
/// plus the calibration outcome.
struct SceneAnalysis {
    width: i32,
    height: i32,
    contours: Vec<FootContour>,
    detection: QrDetection,
    calibration: CalibrationData,
}

/// Synchronous, request-scoped measurement pipeline.
///
/// Holds only the tuning constants; no state survives a request, so one
/// instance can serve any number of sequential calls.
pub struct FootScanPipeline {
    cfg: HeuristicConfig,
}

impl Default for FootScanPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FootScanPipeline {
    pub fn new() -> Self {
        Self::with_config(HeuristicConfig::default())
    }

    pub fn with_config(cfg: HeuristicConfig) -> Self {
        Self { cfg }
    }

    /// Measure the foot and render the annotated preview as PNG bytes.
    pub fn measure_foot(&self, path: &str, qr_size_cm: f64) -> Result<Vec<u8>, PipelineError> {
        let (mut rgb, mat) = load_image(path)?;
        let analysis = self.analyze(&mat, qr_size_cm)?;
        let primary = analysis
            .contours
            .first()
            .ok_or(PipelineError::NoUsableContour)?;

        let measurements = measurement::extract_measurements(
            primary,
            &analysis.calibration,
            analysis.width,
            analysis.height,
            &self.cfg,
        );
        debug!(
            "measured {:.1} x {:.1} cm (calibrated: {})",
            measurements.length_cm, measurements.width_cm, measurements.is_calibrated
        );

        annotation::draw_preview(
            &mut rgb,
            &analysis.contours,
            &measurements,
            &analysis.calibration,
            &analysis.detection.points,
        );
        encode_png(&rgb)
    }

    /// Extract the numeric measurements without rendering a preview.
    ///
    /// When segmentation finds no usable contour the measurements are all
    /// zero but still carry the calibration flag.
    pub fn extract_measurements(
        &self,
        path: &str,
        qr_size_cm: f64,
    ) -> Result<FootMeasurements, PipelineError> {
        let (_rgb, mat) = load_image(path)?;
        let analysis = self.analyze(&mat, qr_size_cm)?;
        if analysis.contours.is_empty() {
            warn!("no usable contour; reporting zeroed measurements");
        }
        let contour = analysis.contours.into_iter().next().unwrap_or_default();
        Ok(measurement::extract_measurements(
            &contour,
            &analysis.calibration,
            analysis.width,
            analysis.height,
            &self.cfg,
        ))
    }

    /// Legacy Canny edge map of the input, PNG-encoded. Does not consult
    /// calibration.
    pub fn edge_detect(&self, path: &str) -> Result<Vec<u8>, PipelineError> {
        let (_rgb, mat) = load_image(path)?;
        let gray = grayscale(&mat)?;
        let mut edges = Mat::default();
        imgproc::canny(&gray, &mut edges, 100.0, 200.0, 3, false)?;
        encode_mat_png(&edges)
    }

    /// Legacy background removal: keep the dominant foot candidate, blank
    /// everything else to white. Does not consult calibration.
    pub fn remove_background(&self, path: &str) -> Result<Vec<u8>, PipelineError> {
        let (mut rgb, mat) = load_image(path)?;
        let (width, height) = (mat.cols(), mat.rows());
        let contours = self.segment(&mat)?;
        let primary = contours.first().ok_or(PipelineError::NoUsableContour)?;

        let mask = contour_mask(primary, width, height)?;
        for (x, y, pixel) in rgb.enumerate_pixels_mut() {
            if *mask.at_2d::<u8>(y as i32, x as i32)? == 0 {
                *pixel = image::Rgb([255, 255, 255]);
            }
        }
        encode_png(&rgb)
    }

    /// Shared segmentation path: adaptive parameters, polarity-corrected
    /// thresholding, morphology, and candidate selection.
    fn segment(&self, image: &Mat) -> Result<Vec<FootContour>, PipelineError> {
        let (width, height) = (image.cols(), image.rows());
        let params = AdaptiveParams::for_image(width, height);
        debug!(
            "adaptive params for {}x{}: kernel {:?}, border {}",
            width, height, params.kernel_size, params.border_width
        );

        let gray = grayscale(image)?;
        let blurred = blur(&gray)?;
        let (binary, polarity, otsu) =
            segmentation::binarize_foreground(&blurred, &params, &self.cfg)?;
        debug!("background {:?} (otsu {:.1})", polarity, otsu);

        let candidates = segmentation::extract_contours(&binary)?;
        let selected =
            segmentation::select_foot_contours(candidates, width, height, &params, &self.cfg);
        debug!("{} foot candidate(s) after filtering", selected.len());
        Ok(selected)
    }

    fn analyze(&self, image: &Mat, qr_size_cm: f64) -> Result<SceneAnalysis, PipelineError> {
        let contours = self.segment(image)?;

        let detection = detection::detect_qr(image);
        let calibration = calibration::estimate_calibration(&detection, qr_size_cm, &self.cfg);
        if calibration.is_calibrated {
            debug!(
                "calibrated at {:.2} px/cm ({} modules, perspective {:.3})",
                calibration.pixels_per_cm, calibration.qr_modules, calibration.perspective_ratio
            );
        } else {
            warn!("marker calibration unavailable; using resolution fallback");
        }

        Ok(SceneAnalysis {
            width: image.cols(),
            height: image.rows(),
            contours,
            detection,
            calibration,
        })
    }
}

/// Decode the image once and mirror it into an OpenCV matrix for the
/// processing stages; the `RgbImage` stays around for annotation.
fn load_image(path: &str) -> Result<(RgbImage, Mat), PipelineError> {
    if path.is_empty() {
        return Err(PipelineError::InvalidInput("empty image path".to_string()));
    }
    let rgb = image::open(path)
        .map_err(|e| PipelineError::DecodeFailure(e.to_string()))?
        .to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(PipelineError::DecodeFailure("empty image".to_string()));
    }
    let mat = rgb_to_mat(&rgb)?;
    Ok((rgb, mat))
}

fn rgb_to_mat(img: &RgbImage) -> Result<Mat, PipelineError> {
    let mat = Mat::from_slice(img.as_raw())?;
    let mat = mat.reshape(3, img.height() as i32)?;
    Ok(mat.try_clone()?)
}

fn grayscale(image: &Mat) -> Result<Mat, PipelineError> {
    let mut gray = Mat::default();
    imgproc::cvt_color(
        image,
        &mut gray,
        imgproc::COLOR_RGB2GRAY,
        0,
        AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;
    Ok(gray)
}

fn blur(gray: &Mat) -> Result<Mat, PipelineError> {
    let mut blurred = Mat::default();
    imgproc::gaussian_blur(
        gray,
        &mut blurred,
        Size::new(5, 5),
        1.5,
        1.5,
        BORDER_DEFAULT,
        AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;
    Ok(blurred)
}

fn contour_mask(contour: &FootContour, width: i32, height: i32) -> Result<Mat, PipelineError> {
    let mut mask = Mat::zeros(height, width, opencv::core::CV_8UC1)?.to_mat()?;
    let mut polygon = Vector::<Point>::new();
    for p in &contour.points {
        polygon.push(Point::new(p.x as i32, p.y as i32));
    }
    let mut polygons = Vector::<Vector<Point>>::new();
    polygons.push(polygon);
    imgproc::fill_poly(
        &mut mask,
        &polygons,
        Scalar::all(255.0),
        imgproc::LINE_8,
        0,
        Point::new(0, 0),
    )?;
    Ok(mask)
}

fn encode_png(img: &RgbImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| PipelineError::Internal(e.to_string()))?;
    Ok(buf.into_inner())
}

fn encode_mat_png(mat: &Mat) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vector::<u8>::new();
    imgcodecs::imencode(".png", mat, &mut buf, &Vector::new())?;
    Ok(buf.to_vec())
}
