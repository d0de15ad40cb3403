use rand::Rng;

use crate::error::{Error, Result};
use crate::math::rng::with_rng;
use crate::math::tensor::Tensor;
use crate::transforms::{image_dims, Transform};

/// Zeroes a `length x length` square centred on a random pixel (clipped at
/// the borders) across every channel.
#[derive(Debug, Clone, Copy)]
pub struct Cutout {
    pub length: usize,
}

impl Cutout {
    pub fn new(length: usize) -> Result<Cutout> {
        if length == 0 {
            return Err(Error::invalid("cutout length must be positive"));
        }
        Ok(Cutout { length })
    }
}

impl Transform for Cutout {
    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let (c, h, w) = image_dims(x)?;
        let (cy, cx) = with_rng(|rng| (rng.gen_range(0..h), rng.gen_range(0..w)));
        let half = self.length / 2;
        let (y0, y1) = (cy.saturating_sub(half), (cy + half).min(h));
        let (x0, x1) = (cx.saturating_sub(half), (cx + half).min(w));
        let mut out = x.clone();
        for ch in 0..c {
            for y in y0..y1 {
                for xx in x0..x1 {
                    out.data[(ch * h + y) * w + xx] = 0.0;
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> String {
        "Cutout".into()
    }
}
