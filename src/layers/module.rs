use crate::error::Result;
use crate::math::tensor::Tensor;

/// Weight initialisation schemes applied model-wide by [`Module::init_weights`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightInit {
    /// Kaiming normal with `fan_out` mode for convolutions, `N(0, std)` for linears,
    /// zero biases.
    KaimingFanOut { linear_std: f64 },
    /// Kaiming normal with `fan_out` mode for convolutions; linears keep their
    /// default uniform init.
    KaimingConvOnly,
}

/// A forward-computing building block.
///
/// Containers expose their sub-modules through `children` / `children_mut`;
/// the provided methods (parameter counting, train/eval switching, MC-dropout,
/// KL accumulation) recurse through them, so leaves only override what they own.
pub trait Module {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor>;

    fn name(&self) -> String;

    fn children(&self) -> Vec<&dyn Module> {
        Vec::new()
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        Vec::new()
    }

    /// Learnable tensors.
    fn parameters(&self) -> Vec<&Tensor> {
        self.children().into_iter().flat_map(|c| c.parameters()).collect()
    }

    /// Everything a checkpoint must carry: parameters, running statistics, masks.
    fn state_tensors(&self) -> Vec<&Tensor> {
        self.children().into_iter().flat_map(|c| c.state_tensors()).collect()
    }

    fn state_tensors_mut(&mut self) -> Vec<&mut Tensor> {
        self.children_mut()
            .into_iter()
            .flat_map(|c| c.state_tensors_mut())
            .collect()
    }

    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }

    /// Switches between training (`true`) and evaluation mode.
    fn train(&mut self, mode: bool) {
        for child in self.children_mut() {
            child.train(mode);
        }
    }

    /// Leaves without mode-dependent behaviour report `true`.
    fn is_training(&self) -> bool {
        self.children().iter().all(|c| c.is_training())
    }

    /// Keeps dropout active in evaluation mode (Monte-Carlo dropout).
    fn set_mc_dropout(&mut self, enabled: bool) {
        for child in self.children_mut() {
            child.set_mc_dropout(enabled);
        }
    }

    /// KL divergence of the last stochastic forward pass (Bayesian layers only).
    fn kl_divergence(&self) -> f64 {
        self.children().iter().map(|c| c.kl_divergence()).sum()
    }

    /// Freezes Bayesian layers to their posterior mean.
    fn freeze(&mut self, frozen: bool) {
        for child in self.children_mut() {
            child.freeze(frozen);
        }
    }

    fn init_weights(&mut self, init: WeightInit) {
        for child in self.children_mut() {
            child.init_weights(init);
        }
    }
}

/// Human-readable layer tree with parameter counts.
pub fn summary<M: Module + ?Sized>(module: &M) -> String {
    let mut out = String::new();
    write_summary(module, 0, &mut out);
    out.push_str(&format!("Total params: {}\n", module.num_parameters()));
    out
}

fn write_summary<M: Module + ?Sized>(module: &M, depth: usize, out: &mut String) {
    out.push_str(&format!(
        "{}{} ({} params)\n",
        "  ".repeat(depth),
        module.name(),
        module.num_parameters()
    ));
    for child in module.children() {
        write_summary(child, depth + 1, out);
    }
}

/// Copies a flat list of tensors into a module's state, in `state_tensors` order.
pub fn load_state<M: Module + ?Sized>(module: &mut M, state: &[Tensor]) -> Result<()> {
    let mut targets = module.state_tensors_mut();
    if targets.len() != state.len() {
        return Err(crate::error::Error::invalid(format!(
            "checkpoint holds {} tensors, model expects {}",
            state.len(),
            targets.len()
        )));
    }
    // Validate everything before touching the model so a bad checkpoint
    // leaves it unchanged.
    for (target, source) in targets.iter().zip(state.iter()) {
        source.expect_shape(&target.shape)?;
    }
    for (target, source) in targets.iter_mut().zip(state.iter()) {
        target.data.copy_from_slice(&source.data);
    }
    Ok(())
}
