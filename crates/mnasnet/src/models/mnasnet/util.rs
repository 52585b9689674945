//! # `MnasNet` Sizing Utilities

/// Scale a channel count by a multiplier, truncating.
///
/// ``trunc(planes * ratio)``; used for width multipliers
/// and for expansion ratios.
pub fn scale_planes(
    planes: usize,
    ratio: f64,
) -> usize {
    assert!(ratio >= 0.0, "Ratio must be non-negative: {ratio}");
    ((planes as f64) * ratio) as usize
}

/// Reduce a channel count by a ratio, truncating, with a floor of 1.
///
/// ``max(1, trunc(planes / ratio))``
pub fn reduce_planes(
    planes: usize,
    ratio: f64,
) -> usize {
    assert!(ratio > 0.0, "Ratio must be positive: {ratio}");
    (((planes as f64) / ratio) as usize).max(1)
}

/// Get the output resolution of a stack of same-padded convolutions.
///
/// Each odd-kernel, ``(k - 1) / 2`` padded layer of stride `s` maps
/// ``in -> (in - 1) / s + 1``, which is ``ceil(in / s)``; composing layers
/// multiplies their strides.
///
/// # Arguments
///
/// - `input_resolution`: ``[height_in, width_in]``.
/// - `stride`: the total stride.
///
/// # Returns
///
/// ``[ceil(height_in / stride), ceil(width_in / stride)]``
///
/// # Panics
///
/// If the stride is zero.
#[inline(always)]
pub fn stride_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    assert!(stride > 0, "stride must be non-zero");
    let [height, width] = input_resolution;
    [height.div_ceil(stride), width.div_ceil(stride)]
}
