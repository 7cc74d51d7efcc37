//! Savitzky–Golay smoothing of elevation profiles.
//!
//! Each output value is the value at that position of a least-squares
//! polynomial fitted to the surrounding window. Near the ends, where a
//! centred window does not fit, the polynomial fitted to the first (or last)
//! full window is evaluated instead, so the output has the same length as
//! the input and no padding values are invented.

/// Maximum window length used for profile smoothing.
pub const MAX_WINDOW: usize = 5;

/// Maximum polynomial order used for profile smoothing.
pub const MAX_POLYORDER: usize = 2;

/// Profiles with this many samples or fewer are left unsmoothed.
pub const MIN_SAMPLES: usize = 5;

/// Window length and polynomial order for a profile of `n` samples.
///
/// The window is `min(5, n - 2)` rounded up to the next odd number and the
/// order is `min(2, window - 1)`. Returns `None` when the profile is too
/// short to smooth.
///
/// # Examples
///
/// ```
/// use hillgrade::smoothing::window_for;
///
/// assert_eq!(window_for(5), None);
/// assert_eq!(window_for(6), Some((5, 2)));
/// assert_eq!(window_for(100), Some((5, 2)));
/// ```
pub fn window_for(n: usize) -> Option<(usize, usize)> {
    if n <= MIN_SAMPLES {
        return None;
    }
    let mut window = MAX_WINDOW.min(n - 2);
    if window % 2 == 0 {
        window += 1;
    }
    Some((window, MAX_POLYORDER.min(window - 1)))
}

/// Smooth `values` with the window chosen by [`window_for`].
///
/// Returns `None` if the profile is too short or the filter cannot be applied.
pub fn smooth_profile(values: &[f64]) -> Option<Vec<f64>> {
    let (window, polyorder) = window_for(values.len())?;
    savgol_filter(values, window, polyorder)
}

/// Apply a Savitzky–Golay filter.
///
/// # Arguments
///
/// * `values` - Evenly spaced samples
/// * `window` - Odd window length, no longer than `values`
/// * `polyorder` - Polynomial order, less than `window`
///
/// # Returns
///
/// The smoothed samples, or `None` if the parameters are invalid, the fit is
/// singular, or the input contains non-finite values.
pub fn savgol_filter(values: &[f64], window: usize, polyorder: usize) -> Option<Vec<f64>> {
    let n = values.len();
    if window == 0 || window % 2 == 0 || window > n || polyorder >= window {
        return None;
    }
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let half = window / 2;
    let centre = fit_weights(window, polyorder, half)?;
    let mut smoothed = Vec::with_capacity(n);

    // Leading edge: polynomial through the first window, evaluated at 0..half
    for position in 0..half {
        let weights = fit_weights(window, polyorder, position)?;
        smoothed.push(dot(&weights, &values[..window]));
    }

    for i in half..n - half {
        smoothed.push(dot(&centre, &values[i - half..=i + half]));
    }

    // Trailing edge: polynomial through the last window
    let tail = &values[n - window..];
    for position in window - half..window {
        let weights = fit_weights(window, polyorder, position)?;
        smoothed.push(dot(&weights, tail));
    }

    Some(smoothed)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Weights that evaluate, at window position `at`, the least-squares
/// polynomial of order `polyorder` through `window` evenly spaced samples.
fn fit_weights(window: usize, polyorder: usize, at: usize) -> Option<Vec<f64>> {
    let terms = polyorder + 1;
    let half = (window / 2) as f64;

    // Centred positions keep the normal equations well conditioned
    let vandermonde: Vec<Vec<f64>> = (0..window)
        .map(|j| {
            let x = j as f64 - half;
            (0..terms).map(|k| x.powi(k as i32)).collect()
        })
        .collect();

    let mut normal = vec![vec![0.0; terms]; terms];
    for row in &vandermonde {
        for a in 0..terms {
            for b in 0..terms {
                normal[a][b] += row[a] * row[b];
            }
        }
    }

    let t = at as f64 - half;
    let rhs: Vec<f64> = (0..terms).map(|k| t.powi(k as i32)).collect();
    let z = solve(normal, rhs)?;

    Some(vandermonde.iter().map(|row| dot(row, &z)).collect())
}

/// Solve a small dense linear system by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_window_for() {
        assert_eq!(window_for(0), None);
        assert_eq!(window_for(3), None);
        assert_eq!(window_for(5), None);
        assert_eq!(window_for(6), Some((5, 2)));
        assert_eq!(window_for(7), Some((5, 2)));
    }

    #[test]
    fn test_centre_weights_match_known_coefficients() {
        // Classic 5-point quadratic smoothing weights: (-3, 12, 17, 12, -3) / 35
        let weights = fit_weights(5, 2, 2).unwrap();
        assert_close(
            &weights,
            &[-3.0 / 35.0, 12.0 / 35.0, 17.0 / 35.0, 12.0 / 35.0, -3.0 / 35.0],
        );
    }

    #[test]
    fn test_preserves_quadratics() {
        // A quadratic is reproduced exactly, including at the edges
        let values: Vec<f64> = (0..9).map(|i| 100.0 + 2.0 * i as f64 - 0.5 * (i * i) as f64).collect();
        let smoothed = savgol_filter(&values, 5, 2).unwrap();
        assert_close(&smoothed, &values);
    }

    #[test]
    fn test_smooths_spike() {
        let values = vec![10.0, 10.0, 10.0, 20.0, 10.0, 10.0, 10.0];
        let smoothed = smooth_profile(&values).unwrap();

        assert_eq!(smoothed.len(), values.len());
        assert!(smoothed[3] < 20.0);
        assert!((smoothed[3] - (10.0 + 10.0 * 17.0 / 35.0)).abs() < 1e-9);
    }

    #[test]
    fn test_edges_use_end_window_fit() {
        let values = [1.0, 4.0, 2.0, 8.0, 5.0, 7.0];
        let smoothed = savgol_filter(&values, 5, 2).unwrap();
        let expected = [
            36.0 / 35.0,
            108.0 / 35.0,
            32.0 / 7.0,
            187.0 / 35.0,
            216.0 / 35.0,
            48.0 / 7.0,
        ];
        assert_close(&smoothed, &expected);
    }

    #[test]
    fn test_invalid_parameters() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(savgol_filter(&values, 4, 2), None); // even window
        assert_eq!(savgol_filter(&values, 5, 2), None); // window longer than input
        assert_eq!(savgol_filter(&values, 3, 3), None); // order too high
        assert_eq!(savgol_filter(&[1.0, f64::NAN, 3.0], 3, 1), None);
        assert_eq!(smooth_profile(&values), None);
    }
}
