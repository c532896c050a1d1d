//! C ABI for the mobile shoe-fitting app.
//!
//! Every function here is a thin translation layer: decode the C
//! arguments, run the pipeline, and hand the result back as either a raw
//! buffer (PNG bytes, released exactly once via [`footscan_release`]) or a
//! caller-provided fixed vector. Failures are observable only as sentinel
//! values: a null pointer with zero size, or an all-zero vector. Panics
//! never cross the boundary.

use std::ffi::CStr;
use std::os::raw::{c_char, c_double, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use log::warn;

use footscan::{FootScanPipeline, PipelineError};

/// Length of the measurement vector written by
/// [`footscan_extract_measurements`]:
/// `[length, width, heel_to_arch, arch_to_toe, big_toe, calibrated]`.
pub const MEASUREMENT_VECTOR_LEN: usize = 6;

unsafe fn path_from(raw: *const c_char) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    CStr::from_ptr(raw).to_str().ok().map(str::to_owned)
}

/// Move an owned buffer across the boundary. The caller owns the result
/// and must release it exactly once with [`footscan_release`].
fn into_raw_buffer(bytes: Vec<u8>, out_size: *mut c_int) -> *mut u8 {
    let mut boxed = bytes.into_boxed_slice();
    let data = boxed.as_mut_ptr();
    unsafe {
        *out_size = boxed.len() as c_int;
    }
    std::mem::forget(boxed);
    data
}

fn failure(out_size: *mut c_int) -> *mut u8 {
    if !out_size.is_null() {
        unsafe {
            *out_size = 0;
        }
    }
    ptr::null_mut()
}

unsafe fn run_image_operation<F>(
    name: &str,
    path: *const c_char,
    out_size: *mut c_int,
    op: F,
) -> *mut u8
where
    F: FnOnce(&FootScanPipeline, &str) -> Result<Vec<u8>, PipelineError>,
{
    if out_size.is_null() {
        return ptr::null_mut();
    }
    let path = match path_from(path) {
        Some(p) => p,
        None => return failure(out_size),
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let pipeline = FootScanPipeline::new();
        match op(&pipeline, &path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("{} failed: {}", name, e);
                None
            }
        }
    }));
    match outcome {
        Ok(Some(bytes)) => into_raw_buffer(bytes, out_size),
        Ok(None) => failure(out_size),
        Err(_) => {
            warn!("{} panicked; returning failure sentinel", name);
            failure(out_size)
        }
    }
}

/// Measure the foot in the image at `path` and return the annotated
/// preview as PNG bytes. Returns null and writes `*out_size = 0` on any
/// failure.
///
/// # Safety
/// `path` must be null or a valid NUL-terminated string; `out_size` must
/// be null or point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn footscan_measure_foot(
    path: *const c_char,
    qr_size_cm: c_double,
    out_size: *mut c_int,
) -> *mut u8 {
    run_image_operation("measure_foot", path, out_size, |pipeline, path| {
        pipeline.measure_foot(path, qr_size_cm)
    })
}

/// Write the fixed measurement vector for the image at `path` into `out`
/// (which must hold [`MEASUREMENT_VECTOR_LEN`] doubles). On total failure
/// the vector is all zeros.
///
/// # Safety
/// `path` must be null or a valid NUL-terminated string; `out` must be
/// null or point to at least [`MEASUREMENT_VECTOR_LEN`] writable doubles.
#[no_mangle]
pub unsafe extern "C" fn footscan_extract_measurements(
    path: *const c_char,
    qr_size_cm: c_double,
    out: *mut c_double,
) {
    if out.is_null() {
        return;
    }
    let values = match path_from(path) {
        Some(path) => catch_unwind(AssertUnwindSafe(|| {
            let pipeline = FootScanPipeline::new();
            match pipeline.extract_measurements(&path, qr_size_cm) {
                Ok(measurements) => Some(measurements.as_vector()),
                Err(e) => {
                    warn!("extract_measurements failed: {}", e);
                    None
                }
            }
        }))
        .unwrap_or_else(|_| {
            warn!("extract_measurements panicked; returning zero vector");
            None
        })
        .unwrap_or([0.0; MEASUREMENT_VECTOR_LEN]),
        None => [0.0; MEASUREMENT_VECTOR_LEN],
    };

    let slice = std::slice::from_raw_parts_mut(out, MEASUREMENT_VECTOR_LEN);
    slice.copy_from_slice(&values);
}

/// Legacy Canny edge map of the image at `path`, PNG-encoded. Returns
/// null and writes `*out_size = 0` on failure.
///
/// # Safety
/// Same contract as [`footscan_measure_foot`].
#[no_mangle]
pub unsafe extern "C" fn footscan_edge_detect(
    path: *const c_char,
    out_size: *mut c_int,
) -> *mut u8 {
    run_image_operation("edge_detect", path, out_size, |pipeline, path| {
        pipeline.edge_detect(path)
    })
}

/// Legacy background removal for the image at `path`, PNG-encoded.
/// Returns null and writes `*out_size = 0` on failure.
///
/// # Safety
/// Same contract as [`footscan_measure_foot`].
#[no_mangle]
pub unsafe extern "C" fn footscan_remove_background(
    path: *const c_char,
    out_size: *mut c_int,
) -> *mut u8 {
    run_image_operation("remove_background", path, out_size, |pipeline, path| {
        pipeline.remove_background(path)
    })
}

/// Release a buffer returned by one of the image operations. Must be
/// called exactly once per returned buffer, with the size the operation
/// reported.
///
/// # Safety
/// `ptr` and `size` must come from a single prior successful call to an
/// image operation in this library, and the pair must not be reused.
#[no_mangle]
pub unsafe extern "C" fn footscan_release(ptr: *mut u8, size: c_int) {
    if ptr.is_null() || size <= 0 {
        return;
    }
    drop(Vec::from_raw_parts(ptr, size as usize, size as usize));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn null_path_yields_failure_sentinel() {
        let mut size: c_int = -1;
        let buf = unsafe { footscan_measure_foot(ptr::null(), 5.0, &mut size) };
        assert!(buf.is_null());
        assert_eq!(size, 0);
    }

    #[test]
    fn null_out_size_yields_null() {
        let path = CString::new("whatever.png").unwrap();
        let buf = unsafe { footscan_measure_foot(path.as_ptr(), 5.0, ptr::null_mut()) };
        assert!(buf.is_null());
    }

    #[test]
    fn unreadable_image_yields_zero_vector() {
        let path = CString::new("/nonexistent/foot.png").unwrap();
        let mut out = [1.0f64; MEASUREMENT_VECTOR_LEN];
        unsafe { footscan_extract_measurements(path.as_ptr(), 5.0, out.as_mut_ptr()) };
        assert_eq!(out, [0.0; MEASUREMENT_VECTOR_LEN]);
    }

    #[test]
    fn null_out_vector_is_a_no_op() {
        let path = CString::new("whatever.png").unwrap();
        unsafe { footscan_extract_measurements(path.as_ptr(), 5.0, ptr::null_mut()) };
    }

    #[test]
    fn release_ignores_null_and_empty() {
        unsafe {
            footscan_release(ptr::null_mut(), 0);
            footscan_release(ptr::null_mut(), 16);
        }
    }

    #[test]
    fn buffers_round_trip_through_the_boundary() {
        let mut size: c_int = 0;
        let data = vec![7u8, 8, 9];
        let raw = into_raw_buffer(data, &mut size);
        assert_eq!(size, 3);
        assert!(!raw.is_null());
        unsafe {
            assert_eq!(*raw, 7);
            footscan_release(raw, size);
        }
    }

    #[test]
    fn legacy_operations_share_the_failure_contract() {
        let path = CString::new("/nonexistent/foot.png").unwrap();
        let mut size: c_int = -1;
        let buf = unsafe { footscan_edge_detect(path.as_ptr(), &mut size) };
        assert!(buf.is_null());
        assert_eq!(size, 0);

        let mut size: c_int = -1;
        let buf = unsafe { footscan_remove_background(path.as_ptr(), &mut size) };
        assert!(buf.is_null());
        assert_eq!(size, 0);
    }
}
