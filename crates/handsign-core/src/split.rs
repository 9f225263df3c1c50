//! Seeded train/validation partitioning.
//!
//! Plain random split, not stratified by class: small classes can end up
//! missing from the validation side. Both training harnesses call
//! [`train_test_split`] with the same arguments and therefore see the same
//! partition of a given table.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::CoreError;

/// Fraction of rows held out for validation.
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
/// Seed used for splitting, initialization and sampling.
pub const DEFAULT_SEED: u64 = 42;

/// Row indices of the two sides of a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n_rows` with `seed` and hold out `ceil(n_rows * test_fraction)` rows.
///
/// Both sides must end up non-empty.
pub fn train_test_split(n_rows: usize, test_fraction: f64, seed: u64) -> Result<Split, CoreError> {
    let invalid = || CoreError::InvalidSplit {
        rows: n_rows,
        test_fraction,
    };

    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(invalid());
    }
    let n_test = (n_rows as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n_rows {
        return Err(invalid());
    }

    let mut perm: Vec<usize> = (0..n_rows).collect();
    perm.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = perm.split_off(n_test);

    Ok(Split { train, test: perm })
}
