use tracing::debug;

use crate::{Error, Result};

/// Largest absolute difference accepted per matrix element.
pub const ELEMENT_TOLERANCE: f64 = 1e-4;

/// Largest relative error accepted for a scalar result.
pub const RELATIVE_TOLERANCE: f64 = 1e-3;

/// An answer type the checker knows how to compare against the oracle.
///
/// Counts are compared exactly, floating-point sequences per element with an
/// absolute tolerance, and scalars with a relative tolerance. The policies
/// differ on purpose and are not interchangeable.
pub trait Answer {
    fn check(reference: &Self, candidate: &Self, label: &str) -> Result<()>;
}

impl Answer for Vec<u32> {
    fn check(reference: &Self, candidate: &Self, label: &str) -> Result<()> {
        check_counts(reference, candidate, label)
    }
}

impl Answer for Vec<f64> {
    fn check(reference: &Self, candidate: &Self, label: &str) -> Result<()> {
        check_elementwise(reference, candidate, ELEMENT_TOLERANCE, label)
    }
}

impl Answer for f64 {
    fn check(reference: &Self, candidate: &Self, label: &str) -> Result<()> {
        check_relative(*reference, *candidate, RELATIVE_TOLERANCE, label)
    }
}

fn check_size(expected: usize, actual: usize, label: &str) -> Result<()> {
    if expected != actual {
        return Err(Error::WrongSize {
            label: label.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

pub fn check_counts(reference: &[u32], candidate: &[u32], label: &str) -> Result<()> {
    check_size(reference.len(), candidate.len(), label)?;
    let mismatch = reference
        .iter()
        .zip(candidate)
        .position(|(expected, actual)| expected != actual);
    if let Some(index) = mismatch {
        return Err(Error::WrongCount {
            label: label.to_string(),
            index,
            expected: reference[index],
            actual: candidate[index],
        });
    }
    debug!(label, len = reference.len(), "counts match");
    Ok(())
}

pub fn check_elementwise(
    reference: &[f64],
    candidate: &[f64],
    tolerance: f64,
    label: &str,
) -> Result<()> {
    check_size(reference.len(), candidate.len(), label)?;
    // `!(diff <= tol)` so that a NaN in the candidate is rejected.
    let mismatch = reference
        .iter()
        .zip(candidate)
        .position(|(expected, actual)| !((expected - actual).abs() <= tolerance));
    if let Some(index) = mismatch {
        return Err(Error::WrongValue {
            label: label.to_string(),
            index,
            expected: reference[index],
            actual: candidate[index],
        });
    }
    debug!(label, len = reference.len(), tolerance, "elements within tolerance");
    Ok(())
}

pub fn check_relative(reference: f64, candidate: f64, tolerance: f64, label: &str) -> Result<()> {
    let relative_error = (reference - candidate).abs() / reference.abs();
    if !(relative_error <= tolerance) {
        return Err(Error::OutOfTolerance {
            label: label.to_string(),
            expected: reference,
            actual: candidate,
        });
    }
    debug!(label, relative_error, "scalar within tolerance");
    Ok(())
}
