//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the dimensions an image is resized to before encoding.
///
/// Images that already fit inside `bounds` keep their exact dimensions;
/// nothing is ever upscaled. Oversized images are scaled by the tighter of
/// the two ratios so the constraining edge lands exactly on its bound and the
/// other edge is rounded to the nearest pixel. A zero bound is treated as
/// one pixel, so the result is never empty.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `bounds` - Maximum allowed dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Output dimensions, each in `1..=bound`
///
/// # Examples
/// ```
/// # use pinstar_media::imaging::fit_within;
/// // Fits already → unchanged
/// assert_eq!(fit_within((200, 150), (1920, 1920)), (200, 150));
///
/// // 2:1 landscape → width hits the bound
/// assert_eq!(fit_within((4000, 2000), (1920, 1920)), (1920, 960));
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = (bounds.0.max(1), bounds.1.max(1));

    if src_w <= max_w && src_h <= max_h {
        return (src_w, src_h);
    }

    let ratio_w = max_w as f64 / src_w as f64;
    let ratio_h = max_h as f64 / src_h as f64;

    if ratio_w <= ratio_h {
        // Width is the constraining edge
        let h = (src_h as f64 * ratio_w).round() as u32;
        (max_w, h.clamp(1, max_h))
    } else {
        // Height is the constraining edge
        let w = (src_w as f64 * ratio_h).round() as u32;
        (w.clamp(1, max_w), max_h)
    }
}
