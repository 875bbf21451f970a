use serde::Deserialize;
use validator::Validate;

use crate::store::MAX_BATCH_SIZE;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FanOut {
    /// Newsfeed entries written per batch write. The store does not
    /// accept more than 25.
    ///
    /// **Environment variables**:
    /// - `TIDINGS_FANOUT_BATCH_SIZE`
    #[serde(default = "FanOut::default_batch_size")]
    #[validate(range(min = 1, max = 25, message = "must be within 1 and 25"))]
    pub batch_size: usize,
}

impl FanOut {
    const fn default_batch_size() -> usize {
        MAX_BATCH_SIZE
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self {
            batch_size: Self::default_batch_size(),
        }
    }
}
