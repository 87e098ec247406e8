//! Fixed nonlinear expansion of factor returns
//!
//! Each factor return `x` becomes three regression features laid out per
//! factor: signed square `x|x|`, signed square root `sign(x)√|x|`, and `x`.

/// Features produced for every factor
pub const FEATURES_PER_FACTOR: usize = 3;

/// Position of a feature within one factor's group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    SignedSquare = 0,
    SignedSquareRoot = 1,
    Identity = 2,
}

/// Number of features for `num_factors` factors
pub fn feature_count(num_factors: usize) -> usize {
    num_factors * FEATURES_PER_FACTOR
}

/// Column of a feature in the featurized vector (no intercept)
pub fn feature_index(factor: usize, kind: FeatureKind) -> usize {
    factor * FEATURES_PER_FACTOR + kind as usize
}

#[inline]
fn signed_square(x: f64) -> f64 {
    x * x.abs()
}

#[inline]
fn signed_square_root(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x.signum() * x.abs().sqrt()
    }
}

/// Featurize into a caller-provided buffer of length `3 * factors.len()`
#[inline]
pub fn featurize_into(factors: &[f64], out: &mut [f64]) {
    debug_assert_eq!(out.len(), feature_count(factors.len()));
    for (x, slot) in factors.iter().zip(out.chunks_exact_mut(FEATURES_PER_FACTOR)) {
        slot[0] = signed_square(*x);
        slot[1] = signed_square_root(*x);
        slot[2] = *x;
    }
}

/// Featurize one factor-return vector
pub fn featurize(factors: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; feature_count(factors.len())];
    featurize_into(factors, &mut out);
    out
}
