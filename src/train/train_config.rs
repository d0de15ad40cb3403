use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};

use crate::loss::loss_type::LossType;
use crate::train::epoch_stats::EpochStats;

/// Configuration for a `train_loop` run.
///
/// - `progress_tx` receives one `EpochStats` per completed epoch. If the
///   receiver is dropped the loop stops early.
/// - `stop_flag`, when set from another thread, stops the loop after the
///   current epoch.
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub loss_type: LossType,
    /// Weight of the evidence regularizer for `LossType::Nig`.
    pub nig_reg_weight: f64,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// A config with no progress channel and no stop flag.
    pub fn new(epochs: usize, batch_size: usize, loss_type: LossType) -> Self {
        TrainConfig { epochs, batch_size, loss_type, nig_reg_weight: 1e-2, progress_tx: None, stop_flag: None }
    }
}
