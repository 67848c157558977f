//! Scale calibration by binary search

use super::{Error, Result};

/// The smallest scale (up to a relative `tolerance`) satisfying a monotone `predicate`:
/// once a scale is accepted, every larger scale is.
/// The search brackets the boundary from `1`, then bisects.
pub fn binary_search_scale<F>(predicate: F, tolerance: f64, max_steps: usize) -> Result<f64>
where
    F: Fn(f64) -> Result<bool>,
{
    if !(tolerance > 0.) {
        return Err(Error::invalid_parameter(format!(
            "tolerance must be positive, got {tolerance}"
        )));
    }
    let mut steps = 0;
    let mut step = || {
        steps += 1;
        if steps > max_steps {
            Err(Error::calibration(format!(
                "no scale found in {max_steps} steps"
            )))
        } else {
            Ok(())
        }
    };
    // Bracket upward
    let mut upper = 1.;
    while !predicate(upper)? {
        step()?;
        upper *= 2.;
        if !upper.is_finite() {
            return Err(Error::calibration("no finite scale satisfies the privacy target"));
        }
    }
    // Bracket downward
    let mut lower = upper / 2.;
    while predicate(lower)? {
        if step().is_err() || lower == 0. {
            return Ok(lower);
        }
        upper = lower;
        lower /= 2.;
    }
    // Bisect
    while upper - lower > tolerance * upper {
        if step().is_err() {
            break;
        }
        let middle = lower + (upper - lower) / 2.;
        if predicate(middle)? {
            upper = middle;
        } else {
            lower = middle;
        }
    }
    log::debug!("calibrated scale {upper} in {steps} steps");
    Ok(upper)
}
