pub mod gbdt;
pub mod traits;
#[cfg(feature = "xgboost")]
pub mod xgboost;

pub use self::gbdt::GbdtOneVsRest;
pub use traits::{IntoDataVec, Model, ModelFactory};
#[cfg(feature = "xgboost")]
pub use self::xgboost::XGBoostModel;

use crate::config::{BoosterKind, BoosterParams};
use crate::error::Result;

/// Builds the untrained backend selected by `params.booster`.
pub fn build(params: &BoosterParams, num_round: usize) -> Result<Box<dyn Model>> {
    Ok(match params.booster {
        #[cfg(feature = "xgboost")]
        BoosterKind::GbTree => Box::new(XGBoostModel::create(params, num_round)?),
        #[cfg(not(feature = "xgboost"))]
        BoosterKind::GbTree => {
            return Err(crate::error::Error::InvalidConfig(
                "booster \"gbtree\" needs the `xgboost` feature".to_string(),
            ))
        }
        BoosterKind::GbdtOneVsRest => Box::new(GbdtOneVsRest::create(params, num_round)?),
    })
}
