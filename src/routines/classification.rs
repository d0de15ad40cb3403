use serde::{Deserialize, Serialize};

use crate::datamodules::loader::{Batch, DataLoader};
use crate::datasets::target::Targets;
use crate::error::{Error, Result};
use crate::layers::Module;
use crate::loss::reduction::Reduction;
use crate::math::tensor::Tensor;
use crate::metrics::{
    entropy_of, Accuracy, Auroc, BrierScore, CalibrationError, CalibrationNorm, Disagreement, Entropy, Fpr95,
    Metric, MutualInformation, NegativeLogLikelihood,
};
use crate::routines::MetricReport;

/// Score used to rank samples as out-of-distribution; higher means more OOD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OodCriterion {
    /// Entropy of the averaged predictive distribution.
    #[default]
    Entropy,
    /// Negative maximum softmax probability.
    MaxSoftmax,
}

impl OodCriterion {
    fn score(&self, probs: &[f64]) -> f64 {
        match self {
            OodCriterion::Entropy => entropy_of(probs),
            OodCriterion::MaxSoftmax => -probs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Evaluates a classifier made of `num_estimators` members whose logits come
/// out estimator-major, `[(M * B), C]`. Members are combined by averaging
/// their softmax outputs.
pub struct ClassificationRoutine {
    pub num_classes: usize,
    pub num_estimators: usize,
    pub ood_criterion: OodCriterion,
    accuracy: Accuracy,
    nll: NegativeLogLikelihood,
    brier: BrierScore,
    ece: CalibrationError,
    entropy: Entropy,
    mutual_information: MutualInformation,
    disagreement: Disagreement,
    auroc: Auroc,
    fpr95: Fpr95,
    ood_seen: bool,
}

impl ClassificationRoutine {
    pub fn new(num_classes: usize, num_estimators: usize) -> Result<ClassificationRoutine> {
        if num_classes < 2 {
            return Err(Error::invalid(format!("a classifier needs at least 2 classes, got {num_classes}")));
        }
        if num_estimators == 0 {
            return Err(Error::invalid("num_estimators must be at least 1"));
        }
        Ok(ClassificationRoutine {
            num_classes,
            num_estimators,
            ood_criterion: OodCriterion::default(),
            accuracy: Accuracy::new(),
            nll: NegativeLogLikelihood::new(),
            brier: BrierScore::new(),
            ece: CalibrationError::new(15, CalibrationNorm::L1)?,
            entropy: Entropy::new(Reduction::Mean),
            mutual_information: MutualInformation::new(),
            disagreement: Disagreement::new(),
            auroc: Auroc::new(),
            fpr95: Fpr95::new(),
            ood_seen: false,
        })
    }

    pub fn ood_criterion(mut self, criterion: OodCriterion) -> ClassificationRoutine {
        self.ood_criterion = criterion;
        self
    }

    /// `[(M * B), C]` logits to per-member probabilities `[B, M, C]`.
    pub fn member_probs(&self, logits: &Tensor) -> Result<Tensor> {
        logits.expect_ndim(2)?;
        if logits.shape[1] != self.num_classes {
            return Err(Error::ShapeMismatch {
                expected: vec![logits.batch(), self.num_classes],
                got: logits.shape.clone(),
            });
        }
        logits.softmax_last().estimators_last(self.num_estimators)
    }

    /// Folds one batch of logits in. OOD batches only feed the detection
    /// scores; their labels are ignored.
    pub fn update(&mut self, logits: &Tensor, targets: &Targets, ood: bool) -> Result<()> {
        let members = self.member_probs(logits)?;
        let probs = members.mean_dim1()?;
        let scores: Vec<f64> = (0..probs.batch()).map(|b| self.ood_criterion.score(probs.sample(b))).collect();
        let flags = Targets::Classes(vec![usize::from(ood); scores.len()]);
        let scores = Tensor::new(&[scores.len()], scores)?;
        self.auroc.update(&scores, Some(&flags))?;
        self.fpr95.update(&scores, Some(&flags))?;
        if ood {
            self.ood_seen = true;
            return Ok(());
        }
        if targets.len() != probs.batch() {
            return Err(Error::invalid(format!(
                "{} targets for a batch of {} samples",
                targets.len(),
                probs.batch()
            )));
        }
        for metric in [
            &mut self.accuracy as &mut dyn Metric,
            &mut self.nll,
            &mut self.brier,
            &mut self.ece,
        ] {
            metric.update(&probs, Some(targets))?;
        }
        self.entropy.update(&probs, None)?;
        if self.num_estimators > 1 {
            self.mutual_information.update(&members, None)?;
            self.disagreement.update(&members, None)?;
        }
        Ok(())
    }

    pub fn test_step<M: Module + ?Sized>(&mut self, model: &mut M, batch: &Batch, ood: bool) -> Result<()> {
        let logits = model.forward(&batch.inputs)?;
        if logits.batch() != self.num_estimators * batch.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![self.num_estimators * batch.len(), self.num_classes],
                got: logits.shape,
            });
        }
        self.update(&logits, &batch.targets, ood)
    }

    /// Runs `model` in eval mode over `loaders`: the first one is the
    /// in-distribution test set, any further one is treated as OOD.
    pub fn evaluate<M: Module + ?Sized>(&mut self, model: &mut M, loaders: &[DataLoader]) -> Result<MetricReport> {
        self.reset();
        model.train(false);
        for (idx, loader) in loaders.iter().enumerate() {
            for batch in loader.iter() {
                self.test_step(model, &batch?, idx > 0)?;
            }
        }
        let report = self.compute()?;
        report.log("test");
        Ok(report)
    }

    pub fn compute(&self) -> Result<MetricReport> {
        let mut report = MetricReport::default();
        let mut metrics: Vec<&dyn Metric> = vec![&self.accuracy, &self.nll, &self.brier, &self.ece, &self.entropy];
        if self.num_estimators > 1 {
            metrics.push(&self.mutual_information);
            metrics.push(&self.disagreement);
        }
        if self.ood_seen {
            metrics.push(&self.auroc);
            metrics.push(&self.fpr95);
        }
        for metric in metrics {
            report.insert(metric.name(), metric.compute()?.item()?);
        }
        Ok(report)
    }

    pub fn reset(&mut self) {
        for metric in [
            &mut self.accuracy as &mut dyn Metric,
            &mut self.nll,
            &mut self.brier,
            &mut self.ece,
            &mut self.entropy,
            &mut self.mutual_information,
            &mut self.disagreement,
            &mut self.auroc,
            &mut self.fpr95,
        ] {
            metric.reset();
        }
        self.ood_seen = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logits(rows: &[[f64; 2]]) -> Tensor {
        Tensor::from_rows(&rows.iter().map(|r| r.to_vec()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn single_model_reports_core_metrics() {
        let mut routine = ClassificationRoutine::new(2, 1).unwrap();
        routine.update(&logits(&[[5.0, -5.0], [-5.0, 5.0]]), &Targets::Classes(vec![0, 0]), false).unwrap();
        let report = routine.compute().unwrap();
        assert!((report.get("accuracy").unwrap() - 0.5).abs() < 1e-12);
        assert!(report.get("mutual_information").is_none());
        assert!(report.get("auroc").is_none());
    }

    #[test]
    fn disagreeing_members_raise_mutual_information() {
        // member 0 says class 0, member 1 says class 1, for a single sample
        let mut routine = ClassificationRoutine::new(2, 2).unwrap();
        routine.update(&logits(&[[20.0, -20.0], [-20.0, 20.0]]), &Targets::Classes(vec![0]), false).unwrap();
        let report = routine.compute().unwrap();
        assert!((report.get("mutual_information").unwrap() - 2f64.ln()).abs() < 1e-6);
        assert!((report.get("entropy").unwrap() - 2f64.ln()).abs() < 1e-6);
        assert!(report.get("disagreement").unwrap() > 0.9);
    }

    #[test]
    fn ood_batches_are_detected_by_entropy() {
        let mut routine = ClassificationRoutine::new(2, 1).unwrap();
        routine.update(&logits(&[[4.0, 0.0], [0.0, 4.0]]), &Targets::Classes(vec![0, 1]), false).unwrap();
        routine.update(&logits(&[[0.1, 0.0], [0.0, 0.2]]), &Targets::Classes(vec![0, 0]), true).unwrap();
        let report = routine.compute().unwrap();
        assert_eq!(report.get("auroc"), Some(1.0));
        assert_eq!(report.get("fpr95"), Some(0.0));
        assert_eq!(report.get("accuracy"), Some(1.0));
    }

    #[test]
    fn wrong_width_is_rejected() {
        let mut routine = ClassificationRoutine::new(3, 1).unwrap();
        assert!(routine.update(&logits(&[[1.0, 0.0]]), &Targets::Classes(vec![0]), false).is_err());
        assert!(ClassificationRoutine::new(1, 1).is_err());
    }
}
