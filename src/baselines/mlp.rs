use crate::baselines::Version;
use crate::datamodules::loader::DataLoader;
use crate::datasets::SharedDataset;
use crate::error::{Error, Result};
use crate::layers::Module;
use crate::loss::LossType;
use crate::math::tensor::Tensor;
use crate::models::mlp::{Mlp, MlpSpec, Prediction};
use crate::procedures::{OptimizationProcedure, Procedure};
use crate::routines::{ClassificationRoutine, MetricReport, RegressionRoutine};
use crate::train::{train_loop, Objective, TrainConfig};

/// The trainable dense baseline. Only the standard version exists; the head
/// width follows from the loss.
pub struct MlpBaseline {
    pub model: Mlp,
    pub loss: LossType,
    pub nig_reg_weight: f64,
    procedure: Procedure,
}

impl MlpBaseline {
    pub fn new(
        in_features: usize,
        num_outputs: usize,
        hidden_dims: Vec<usize>,
        loss: LossType,
        procedure: Procedure,
        version: &str,
    ) -> Result<MlpBaseline> {
        let version: Version = version.parse()?;
        if version != Version::Standard {
            return Err(Error::invalid(format!("the MLP baseline has no {version} version")));
        }
        let spec = MlpSpec::new("mlp", in_features, num_outputs, hidden_dims).dist_estimation(loss.dist_estimation());
        MlpBaseline::from_model(Mlp::new(spec)?, loss, procedure)
    }

    /// Wraps an already built (or loaded) MLP.
    pub fn from_model(model: Mlp, loss: LossType, procedure: Procedure) -> Result<MlpBaseline> {
        let baseline = MlpBaseline { model, loss, nig_reg_weight: 1e-2, procedure };
        baseline.criterion()?.check(&baseline.model)?;
        Ok(baseline)
    }

    pub fn criterion(&self) -> Result<Objective> {
        Objective::new(self.loss, self.nig_reg_weight)
    }

    pub fn configure_optimizers(&self) -> Result<OptimizationProcedure> {
        self.procedure.apply(&self.model)
    }

    pub fn procedure(&self) -> Procedure {
        self.procedure
    }

    pub fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        self.model.forward(x)
    }

    pub fn predict(&mut self, x: &Tensor) -> Result<Prediction> {
        self.model.predict(x)
    }

    /// Trains with the baseline's loss and procedure; returns the last
    /// epoch's mean training loss.
    pub fn fit(&mut self, train: SharedDataset, val: Option<SharedDataset>, epochs: usize, batch_size: usize) -> Result<f64> {
        let procedure = self.configure_optimizers()?;
        let mut config = TrainConfig::new(epochs, batch_size, self.loss);
        config.nig_reg_weight = self.nig_reg_weight;
        train_loop(&mut self.model, train, val, &procedure, &config)
    }

    /// Classification losses are scored by `ClassificationRoutine`, the rest
    /// by `RegressionRoutine`.
    pub fn evaluate(&mut self, loader: &DataLoader) -> Result<MetricReport> {
        if self.loss.is_classification() {
            let mut routine = ClassificationRoutine::new(self.model.spec.num_outputs, 1)?;
            routine.evaluate(&mut self.model, std::slice::from_ref(loader))
        } else {
            RegressionRoutine::new(self.model.spec.dist_estimation)?.evaluate(&mut self.model, loader)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::datasets::DummyRegressionDataset;
    use crate::math::rng::seed_everything;

    fn regression() -> Procedure {
        Procedure::by_name("regression").unwrap()
    }

    #[test]
    fn nig_baseline_trains_and_evaluates() {
        seed_everything(7);
        let data: SharedDataset = Arc::new(DummyRegressionDataset::new(4, 1, 32));
        let mut net = MlpBaseline::new(4, 1, vec![8], LossType::Nig, regression(), "std").unwrap();
        assert_eq!(net.model.spec.dist_estimation, 4);
        let loss = net.fit(data.clone(), None, 3, 8).unwrap();
        assert!(loss.is_finite());
        let report = net.evaluate(&DataLoader::new(data, 8, false).unwrap()).unwrap();
        assert!(report.get("mse").is_some());
        assert!(report.get("gaussian_nll").unwrap().is_finite());
    }

    #[test]
    fn ensembles_are_not_available() {
        assert!(MlpBaseline::new(4, 1, vec![], LossType::Mse, regression(), "packed").is_err());
        assert!(MlpBaseline::new(4, 1, vec![], LossType::Mse, regression(), "vanilla").is_ok());
    }

    #[test]
    fn loaded_model_must_match_loss() {
        let mlp = Mlp::new(MlpSpec::new("m", 4, 1, vec![])).unwrap();
        assert!(MlpBaseline::from_model(mlp, LossType::GaussianNll, regression()).is_err());
    }
}
