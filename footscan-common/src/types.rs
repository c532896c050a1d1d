use serde::{Deserialize, Serialize};

/// 2D point in pixel coordinates (origin top-left, y grows downward).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned bounding rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// A closed outer contour candidate: its boundary points plus the area and
/// bounding rectangle computed by the contour extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FootContour {
    pub points: Vec<Point2D>,
    pub area: f64,
    pub bbox: BoundingBox,
}

impl FootContour {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Background polarity decided from border sampling.
///
/// A light background means the foot is darker than its surroundings, so
/// the thresholding step has to invert its polarity before segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundPolarity {
    Dark,
    Light,
}

impl BackgroundPolarity {
    /// Whether the threshold polarity must be inverted.
    pub fn is_inverted(self) -> bool {
        self == BackgroundPolarity::Light
    }
}

/// Segmentation parameters derived from image resolution.
///
/// One instance per request; higher-resolution images get a larger
/// morphology kernel, a lower relative area floor, and a wider border
/// sampling strip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParams {
    /// Structuring element size for morphological close/open.
    pub kernel_size: (i32, i32),
    /// Minimum contour area as a fraction of total image area.
    pub min_contour_area_ratio: f64,
    /// Maximum contour area as a fraction of total image area.
    pub max_contour_area_ratio: f64,
    /// Width of the border strips sampled for background classification.
    pub border_width: i32,
}

impl AdaptiveParams {
    /// Derive parameters from image dimensions. Pure computation, no
    /// failure modes; both dimensions are expected to be positive.
    pub fn for_image(width: i32, height: i32) -> Self {
        let min_dim = width.min(height);
        let k = (min_dim / 200).max(3);
        let min_contour_area_ratio = if i64::from(width) * i64::from(height) > 1_000_000 {
            0.005
        } else {
            0.01
        };
        Self {
            kernel_size: (k, k),
            min_contour_area_ratio,
            max_contour_area_ratio: 0.8,
            border_width: min_dim / 15,
        }
    }
}

/// Scale calibration derived from a detected QR marker.
///
/// `is_calibrated` is true only when the module count, the perspective
/// ratio, and the resulting pixel density all fall inside their acceptance
/// windows. Immutable once produced; one instance per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub pixels_per_cm: f64,
    pub qr_center: Point2D,
    pub qr_size_pixels_raw: f64,
    pub qr_size_pixels_corrected: f64,
    pub is_calibrated: bool,
    pub qr_modules: i32,
    pub perspective_ratio: f64,
    pub qr_content: String,
}

impl CalibrationData {
    /// The no-marker result: everything zeroed, `is_calibrated` false.
    pub fn uncalibrated() -> Self {
        Self {
            pixels_per_cm: 0.0,
            qr_center: Point2D::default(),
            qr_size_pixels_raw: 0.0,
            qr_size_pixels_corrected: 0.0,
            is_calibrated: false,
            qr_modules: 0,
            perspective_ratio: 0.0,
            qr_content: String::new(),
        }
    }
}

/// Foot measurements in centimeters plus the anchor points they were
/// derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootMeasurements {
    pub length_cm: f64,
    pub width_cm: f64,
    pub heel_to_arch_cm: f64,
    pub arch_to_toe_cm: f64,
    pub big_toe_length_cm: f64,
    pub is_calibrated: bool,
    pub heel: Point2D,
    pub toe: Point2D,
    pub left: Point2D,
    pub right: Point2D,
}

impl FootMeasurements {
    /// All-zero measurements carrying the given calibration flag.
    ///
    /// Used when no usable contour exists. The flag still reflects the
    /// calibration outcome, so a caller can see zero-length output marked
    /// as calibrated; this mirrors the shipped behavior and is covered by
    /// a dedicated test.
    pub fn zeroed(is_calibrated: bool) -> Self {
        Self {
            length_cm: 0.0,
            width_cm: 0.0,
            heel_to_arch_cm: 0.0,
            arch_to_toe_cm: 0.0,
            big_toe_length_cm: 0.0,
            is_calibrated,
            heel: Point2D::default(),
            toe: Point2D::default(),
            left: Point2D::default(),
            right: Point2D::default(),
        }
    }

    /// The fixed vector handed across the request boundary:
    /// `[length, width, heel_to_arch, arch_to_toe, big_toe, calibrated]`.
    pub fn as_vector(&self) -> [f64; 6] {
        [
            self.length_cm,
            self.width_cm,
            self.heel_to_arch_cm,
            self.arch_to_toe_cm,
            self.big_toe_length_cm,
            if self.is_calibrated { 1.0 } else { 0.0 },
        ]
    }
}

/// Every tunable constant of the decision logic in one place.
///
/// The defaults are the shipped values; tests exercise the acceptance
/// windows through this struct so a tuning change cannot silently alter
/// unrelated behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicConfig {
    /// Smallest standard QR module count (version 1).
    pub min_qr_modules: i32,
    /// Largest standard QR module count (version 40).
    pub max_qr_modules: i32,
    /// Step between standard module counts (one version = 4 modules).
    pub module_step: i32,
    /// A raw module estimate snaps to the nearest standard count only when
    /// strictly closer than this.
    pub module_snap_tolerance: i32,
    /// Exclusive lower bound on the rectified/raw perspective ratio.
    pub min_perspective_ratio: f64,
    /// Exclusive upper bound on the rectified/raw perspective ratio.
    pub max_perspective_ratio: f64,
    /// Exclusive lower bound on accepted pixel density.
    pub min_pixels_per_cm: f64,
    /// Exclusive upper bound on accepted pixel density.
    pub max_pixels_per_cm: f64,
    /// Border intensity above this is a light-background candidate.
    pub intensity_midpoint: f64,
    /// Light background also requires `otsu > factor * border intensity`.
    pub otsu_background_factor: f64,
    /// Border-touching contours survive only above this fraction of the
    /// image area.
    pub near_border_area_exemption: f64,
    /// Heel-to-marker distance (relative to the longest image side) above
    /// which the calibrated ratio is corrected.
    pub distance_correction_cutoff: f64,
    /// Correction gain applied per unit of excess distance factor.
    pub distance_correction_gain: f64,
    /// Heel-to-arch share of foot length.
    pub heel_to_arch_ratio: f64,
    /// Arch-to-toe share of foot length.
    pub arch_to_toe_ratio: f64,
    /// Big-toe share of foot length.
    pub big_toe_ratio: f64,
    /// Pixel count above which the uncalibrated fallback assumes a
    /// high-density capture.
    pub fallback_high_pixels: i64,
    /// Pixel count above which the fallback assumes a mid-density capture.
    pub fallback_mid_pixels: i64,
    pub fallback_high_pixels_per_cm: f64,
    pub fallback_mid_pixels_per_cm: f64,
    pub fallback_low_pixels_per_cm: f64,
}

impl HeuristicConfig {
    /// Strictly-inside check for the pixel density window.
    pub fn accepts_pixels_per_cm(&self, value: f64) -> bool {
        value > self.min_pixels_per_cm && value < self.max_pixels_per_cm
    }

    /// Strictly-inside check for the perspective ratio window.
    pub fn accepts_perspective_ratio(&self, value: f64) -> bool {
        value > self.min_perspective_ratio && value < self.max_perspective_ratio
    }

    /// Inclusive check for the standard QR module range.
    pub fn accepts_module_count(&self, modules: i32) -> bool {
        modules >= self.min_qr_modules && modules <= self.max_qr_modules
    }

    /// Resolution-tiered pixel density estimate for uncalibrated images.
    pub fn fallback_pixels_per_cm(&self, total_pixels: i64) -> f64 {
        if total_pixels > self.fallback_high_pixels {
            self.fallback_high_pixels_per_cm
        } else if total_pixels > self.fallback_mid_pixels {
            self.fallback_mid_pixels_per_cm
        } else {
            self.fallback_low_pixels_per_cm
        }
    }
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            min_qr_modules: 21,
            max_qr_modules: 177,
            module_step: 4,
            module_snap_tolerance: 2,
            min_perspective_ratio: 0.5,
            max_perspective_ratio: 2.0,
            min_pixels_per_cm: 30.0,
            max_pixels_per_cm: 800.0,
            intensity_midpoint: 128.0,
            otsu_background_factor: 0.7,
            near_border_area_exemption: 0.3,
            distance_correction_cutoff: 0.3,
            distance_correction_gain: 0.1,
            heel_to_arch_ratio: 0.60,
            arch_to_toe_ratio: 0.40,
            big_toe_ratio: 0.15,
            fallback_high_pixels: 2_000_000,
            fallback_mid_pixels: 1_000_000,
            fallback_high_pixels_per_cm: 150.0,
            fallback_mid_pixels_per_cm: 120.0,
            fallback_low_pixels_per_cm: 90.0,
        }
    }
}
