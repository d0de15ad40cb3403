use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layers::module::{load_state, Module};
use crate::math::tensor::Tensor;

/// Every state tensor of a model, in `state_tensors` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub model: String,
    pub tensors: Vec<Tensor>,
}

impl Checkpoint {
    pub fn capture<M: Module + ?Sized>(model: &M) -> Checkpoint {
        Checkpoint {
            model: model.name(),
            tensors: model.state_tensors().into_iter().cloned().collect(),
        }
    }

    pub fn restore<M: Module + ?Sized>(&self, model: &mut M) -> Result<()> {
        if self.model != model.name() {
            return Err(Error::invalid(format!(
                "checkpoint was written by {}, cannot load into {}",
                self.model,
                model.name()
            )));
        }
        load_state(model, &self.tensors)
    }
}

pub fn save_checkpoint<M: Module + ?Sized>(model: &M, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let writer = std::io::BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer(writer, &Checkpoint::capture(model))?;
    tracing::info!(path = %path.display(), model = %model.name(), "saved checkpoint");
    Ok(())
}

pub fn load_checkpoint<M: Module + ?Sized>(model: &mut M, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let reader = std::io::BufReader::new(std::fs::File::open(path)?);
    let checkpoint: Checkpoint = serde_json::from_reader(reader)?;
    checkpoint.restore(model)?;
    tracing::info!(path = %path.display(), tensors = checkpoint.tensors.len(), "loaded checkpoint");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lenet::lenet;
    use crate::models::resnet::resnet18;
    use crate::models::variant::Style;

    #[test]
    fn restores_weights_into_a_fresh_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lenet.json");
        let source = lenet(1, 10).unwrap();
        save_checkpoint(&source, &path).unwrap();

        let mut target = lenet(1, 10).unwrap();
        load_checkpoint(&mut target, &path).unwrap();
        let a = source.state_tensors();
        let b = target.state_tensors();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!(x.data.iter().zip(y.data.iter()).all(|(u, v)| (u - v).abs() < 1e-12));
        }
    }

    #[test]
    fn refuses_a_different_architecture() {
        let source = lenet(1, 10).unwrap();
        let mut other = lenet(1, 5).unwrap();
        assert!(Checkpoint::capture(&source).restore(&mut other).is_err());
    }

    #[test]
    fn mismatched_head_leaves_the_model_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resnet18.json");
        save_checkpoint(&resnet18(3, 10, Style::Cifar).unwrap(), &path).unwrap();

        let mut target = resnet18(3, 100, Style::Cifar).unwrap();
        let before: Vec<Tensor> = target.state_tensors().into_iter().cloned().collect();
        assert!(load_checkpoint(&mut target, &path).is_err());
        let after = target.state_tensors();
        assert_eq!(before.len(), after.len());
        assert!(before.iter().zip(after).all(|(a, b)| a == b));
    }

    #[test]
    fn weights_reload_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lenet.json");
        let source = lenet(1, 10).unwrap();
        save_checkpoint(&source, &path).unwrap();
        let mut target = lenet(1, 10).unwrap();
        load_checkpoint(&mut target, &path).unwrap();
        assert!(source.state_tensors().iter().zip(target.state_tensors()).all(|(a, b)| *a == b));
    }
}
