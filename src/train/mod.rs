pub mod epoch_stats;
pub mod loop_fn;
pub mod objective;
pub mod train_config;

pub use epoch_stats::EpochStats;
pub use loop_fn::train_loop;
pub use objective::Objective;
pub use train_config::TrainConfig;
