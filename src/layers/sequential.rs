use crate::error::Result;
use crate::layers::module::Module;
use crate::math::tensor::Tensor;

/// Runs its modules in order.
#[derive(Default)]
pub struct Sequential {
    pub layers: Vec<Box<dyn Module>>,
}

impl Sequential {
    pub fn new() -> Sequential {
        Sequential { layers: Vec::new() }
    }

    pub fn push(&mut self, layer: impl Module + 'static) {
        self.layers.push(Box::new(layer));
    }

    pub fn push_boxed(&mut self, layer: Box<dyn Module>) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Module for Sequential {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let mut current = x.clone();
        for layer in self.layers.iter_mut() {
            current = layer.forward(&current)?;
        }
        Ok(current)
    }

    fn name(&self) -> String {
        "Sequential".into()
    }

    fn children(&self) -> Vec<&dyn Module> {
        self.layers.iter().map(|l| l.as_ref()).collect()
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        self.layers.iter_mut().map(|l| l.as_mut() as &mut dyn Module).collect()
    }
}
