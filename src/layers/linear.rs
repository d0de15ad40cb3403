use crate::error::{Error, Result};
use crate::layers::module::{Module, WeightInit};
use crate::math::tensor::Tensor;

/// Fully-connected layer: `y = x Wᵀ + b`, weight stored `[out, in]`.
#[derive(Debug, Clone)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Result<Linear> {
        if in_features == 0 || out_features == 0 {
            return Err(Error::invalid("linear layer needs non-zero features"));
        }
        let bound = 1.0 / (in_features as f64).sqrt();
        Ok(Linear {
            in_features,
            out_features,
            weight: Tensor::rand(&[out_features, in_features], -bound, bound),
            bias: bias.then(|| Tensor::rand(&[out_features], -bound, bound)),
        })
    }
}

/// `x [B, in] · w [out, in]ᵀ + b` shared by every dense flavour.
pub(crate) fn linear_forward(x: &Tensor, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor> {
    let (out_f, in_f) = (weight.shape[0], weight.shape[1]);
    if x.ndim() != 2 || x.shape[1] != in_f {
        return Err(Error::ShapeMismatch {
            expected: vec![x.batch(), in_f],
            got: x.shape.clone(),
        });
    }
    let b = x.shape[0];
    let mut out = vec![0.0; b * out_f];
    for bi in 0..b {
        let xs = x.sample(bi);
        for o in 0..out_f {
            let w = &weight.data[o * in_f..(o + 1) * in_f];
            let mut acc = bias.map(|t| t.data[o]).unwrap_or(0.0);
            for (xv, wv) in xs.iter().zip(w.iter()) {
                acc += xv * wv;
            }
            out[bi * out_f + o] = acc;
        }
    }
    Tensor::new(&[b, out_f], out)
}

impl Module for Linear {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        linear_forward(x, &self.weight, self.bias.as_ref())
    }

    fn name(&self) -> String {
        format!("Linear({}, {})", self.in_features, self.out_features)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        std::iter::once(&self.weight).chain(self.bias.as_ref()).collect()
    }

    fn state_tensors(&self) -> Vec<&Tensor> {
        self.parameters()
    }

    fn state_tensors_mut(&mut self) -> Vec<&mut Tensor> {
        std::iter::once(&mut self.weight).chain(self.bias.as_mut()).collect()
    }

    fn init_weights(&mut self, init: WeightInit) {
        if let WeightInit::KaimingFanOut { linear_std } = init {
            self.weight = Tensor::randn(&self.weight.shape, 0.0, linear_std);
            if let Some(b) = self.bias.as_mut() {
                *b = Tensor::zeros(&b.shape);
            }
        }
    }
}
