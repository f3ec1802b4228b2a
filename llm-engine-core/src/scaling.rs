//! Transforms between per-worker concurrency and autoscaler metric targets.
//!
//! The horizontal autoscaler scales on average in-flight requests per pod;
//! the endpoint model expresses the same thing as `per_worker`. Building an
//! autoscaler applies the forward transform, the observer applies the
//! inverse. The apiserver may render the target back in milli form
//! (`"4000m"` for 4), so the inverse accepts both spellings.

use thiserror::Error;

/// A metric target string the inverse transform cannot interpret.
#[derive(Error, Debug)]
#[error("invalid concurrency target: {0:?}")]
pub struct InvalidConcurrencyTarget(pub String);

/// Forward transform: the target average-concurrency quantity for an
/// autoscaler scaling one endpoint with the given `per_worker`.
pub fn concurrency_target_from_per_worker(per_worker: u32) -> String {
    per_worker.to_string()
}

/// Inverse transform: recover `per_worker` from an autoscaler's configured
/// target average value. Fractional targets round up, matching the forward
/// transform's ceiling behavior on scale-out.
pub fn per_worker_from_concurrency_target(target: &str) -> Result<u32, InvalidConcurrencyTarget> {
    let invalid = || InvalidConcurrencyTarget(target.to_string());
    if let Some(milli) = target.strip_suffix('m') {
        let value: u64 = milli.parse().map_err(|_| invalid())?;
        return u32::try_from(value.div_ceil(1000)).map_err(|_| invalid());
    }
    if target.contains('.') {
        let value: f64 = target.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
            return Err(invalid());
        }
        return Ok(value.ceil() as u32);
    }
    target.parse().map_err(|_| invalid())
}
