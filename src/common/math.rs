/// Wraps an angle in degrees into `[0, 360)`.
pub fn wrap_degrees(angle: f64) -> f64 { angle.rem_euclid(360.0) }

/// Signed shortest difference `to - from` in degrees, in `(-180, 180]`.
///
/// # Arguments
/// - `from`: Start angle in degrees.
/// - `to`: End angle in degrees.
///
/// # Returns
/// - The rotation from `from` to `to` with the smaller magnitude.
pub fn angle_delta(from: f64, to: f64) -> f64 {
    let d = wrap_degrees(to - from);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Least-squares fit of `y = slope * x + intercept`.
///
/// # Arguments
/// - `points`: Samples as `(x, y)` pairs.
///
/// # Returns
/// - `Some((slope, intercept))`, or `None` with fewer than two distinct `x` values.
#[allow(clippy::cast_precision_loss)]
pub fn linear_regression(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
        let dx = x - mean_x;
        (sxy + dx * (y - mean_y), sxx + dx * dx)
    });
    if sxx.abs() < f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Removes the 360° jumps of a wrapped angle series so it can be fitted.
pub fn unwrap_degrees(angles: &[f64]) -> Vec<f64> {
    let mut unwrapped: Vec<f64> = Vec::with_capacity(angles.len());
    for (i, angle) in angles.iter().enumerate() {
        match unwrapped.last() {
            Some(&last) => unwrapped.push(last + angle_delta(angles[i - 1], *angle)),
            None => unwrapped.push(*angle),
        }
    }
    unwrapped
}
