use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with a seeded RNG and hold out `ceil(test_fraction * n)` rows.
///
/// The same `n`, fraction and seed always produce the same partition.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Split {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((test_fraction * n as f64).ceil() as usize).min(n);
    let test = indices[..n_test].to_vec();
    let train = indices[n_test..].to_vec();
    Split { train, test }
}
