use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::error::{Error, Result};

/// Per-channel statistics, in the column order the feature matrix uses.
#[rustfmt::skip]
pub const FEATURE_COLUMNS: [&str; NUM_FEATURES] = [
    "x_avg", "y_avg", "z_avg", "vb_avg",
    "x_stddev", "y_stddev", "z_stddev", "vb_stddev",
    "x_var", "y_var", "z_var", "vb_var",
    "x_rms", "y_rms", "z_rms", "vb_rms",
];
pub const TARGET_COLUMN: &str = "id";
pub const NUM_FEATURES: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub features: [f32; NUM_FEATURES],
    pub label: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<FeatureRow>,
}

impl Dataset {
    pub fn new(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    /// Shuffles and partitions the rows. Without a seed the partition is not
    /// reproducible.
    pub fn train_test_split(&self, test_size: f64, seed: Option<u64>) -> Result<(Dataset, Dataset)> {
        let (train_idx, test_idx) = split_indices(self.rows.len(), test_size, seed)?;
        let pick = |idx: &[usize]| Dataset::new(idx.iter().map(|&i| self.rows[i].clone()).collect());
        Ok((pick(&train_idx), pick(&test_idx)))
    }
}

/// Shuffled `(train, test)` index lists covering `0..n` exactly once.
/// The test side gets `ceil(test_size * n)` rows.
pub fn split_indices(n: usize, test_size: f64, seed: Option<u64>) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(Error::EmptySplit { rows: n, test_size });
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    debug!(train = train.len(), test = indices.len(), "Dataset split");
    Ok((train, indices))
}

/// Dense row-major feature matrix with one label per row.
#[derive(Debug, Clone)]
pub struct DMatrix {
    features: Array2<f32>,
    labels: Vec<f32>,
}

impl DMatrix {
    pub fn from_rows(rows: &[FeatureRow]) -> Self {
        let mut features = Array2::<f32>::zeros((rows.len(), NUM_FEATURES));
        for (mut out, row) in features.outer_iter_mut().zip(rows) {
            for (dst, src) in out.iter_mut().zip(row.features.iter()) {
                *dst = *src;
            }
        }
        let labels = rows.iter().map(|row| row.label as f32).collect();
        Self { features, labels }
    }

    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self::from_rows(dataset.rows())
    }

    pub fn num_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn num_cols(&self) -> usize {
        self.features.ncols()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        self.features.row(index)
    }

    pub fn value(&self, row: usize, feature: usize) -> f32 {
        self.features[[row, feature]]
    }

    /// Row-major copy of the feature values.
    pub fn to_dense(&self) -> Vec<f32> {
        self.features.iter().copied().collect()
    }

    pub fn get_label(&self) -> &[f32] {
        &self.labels
    }

    pub fn check_labels(&self, num_class: usize) -> Result<()> {
        match self
            .labels
            .iter()
            .enumerate()
            .find(|(_, &label)| label < 0.0 || label as usize >= num_class)
        {
            Some((row, &label)) => Err(Error::LabelOutOfRange { row, label, num_class }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(seed: f32, label: u32) -> FeatureRow {
        let mut features = [0.0; NUM_FEATURES];
        for (i, f) in features.iter_mut().enumerate() {
            *f = seed + i as f32;
        }
        FeatureRow { features, label }
    }

    #[test]
    fn test_split_sizes_follow_ratio() {
        let (train, test) = split_indices(100, 0.25, Some(7)).unwrap();
        assert_eq!(train.len(), 75);
        assert_eq!(test.len(), 25);

        let (train, test) = split_indices(10, 0.25, Some(7)).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);
    }

    #[test]
    fn test_split_covers_every_row_once() {
        let (mut train, test) = split_indices(37, 0.25, None).unwrap();
        train.extend(test);
        train.sort_unstable();
        assert_eq!(train, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        assert_eq!(
            split_indices(50, 0.25, Some(3)).unwrap(),
            split_indices(50, 0.25, Some(3)).unwrap()
        );
    }

    #[test]
    fn test_split_rejects_empty_partition() {
        assert!(matches!(split_indices(1, 0.25, None), Err(Error::EmptySplit { .. })));
        assert!(matches!(split_indices(0, 0.25, None), Err(Error::EmptySplit { .. })));
    }

    #[test]
    fn test_dmatrix_layout() {
        let rows = vec![row(0.0, 1), row(100.0, 3)];
        let matrix = DMatrix::from_rows(&rows);
        assert_eq!(matrix.num_rows(), 2);
        assert_eq!(matrix.num_cols(), NUM_FEATURES);
        assert_eq!(matrix.value(1, 2), 102.0);
        assert_eq!(matrix.to_dense()[NUM_FEATURES + 2], 102.0);
        assert_eq!(matrix.row(0)[15], 15.0);
        assert_eq!(matrix.get_label(), &[1.0, 3.0]);
    }

    #[test]
    fn test_check_labels() {
        let matrix = DMatrix::from_rows(&[row(0.0, 0), row(1.0, 4)]);
        assert!(matrix.check_labels(5).is_ok());
        match matrix.check_labels(4) {
            Err(Error::LabelOutOfRange { row, num_class, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(num_class, 4);
            }
            other => panic!("expected LabelOutOfRange, got {other:?}"),
        }
    }
}
