use gbdt::decision_tree::{Data, DataVec};
use std::path::Path;

use crate::config::BoosterParams;
use crate::dataset::DMatrix;
use crate::error::Result;

pub trait Model {
    /// Fits the model. `watchlist` matrices are only evaluated for logging.
    fn train(&mut self, train: &DMatrix, watchlist: &[(&DMatrix, &str)]) -> Result<()>;
    /// Predicted class per row, as `f32`.
    fn predict(&self, data: &DMatrix) -> Result<Vec<f32>>;
    /// Writes the model files into an existing directory.
    fn save(&self, dir: &Path) -> Result<()>;
    fn flavor(&self) -> &'static str;
}

pub trait ModelFactory {
    type ModelType: Model;

    fn create(params: &BoosterParams, num_round: usize) -> Result<Self::ModelType>;
}

/// Conversion into the row format of the `gbdt` crate.
pub trait IntoDataVec {
    /// Test rows, no label.
    fn into_data_vec(self) -> DataVec;
    /// Training rows labelled `1` for `class` and `-1` for every other class.
    fn into_one_vs_rest(self, class: usize) -> DataVec;
}

impl IntoDataVec for &DMatrix {
    fn into_data_vec(self) -> DataVec {
        (0..self.num_rows())
            .map(|i| Data::new_test_data(self.row(i).to_vec(), None))
            .collect()
    }

    fn into_one_vs_rest(self, class: usize) -> DataVec {
        self.get_label()
            .iter()
            .enumerate()
            .map(|(i, &label)| {
                let target = if label as usize == class { 1.0 } else { -1.0 };
                Data::new_training_data(self.row(i).to_vec(), 1.0, target, None)
            })
            .collect()
    }
}
