use rand::Rng;

use crate::error::{Error, Result};
use crate::math::rng::with_rng;
use crate::math::tensor::Tensor;
use crate::transforms::{image_dims, Transform};

/// Zero-pads by `padding` on every side, then crops a random `size x size`
/// window. Images still smaller than `size` are padded up to it.
#[derive(Debug, Clone, Copy)]
pub struct RandomCrop {
    pub size: usize,
    pub padding: usize,
}

impl RandomCrop {
    pub fn new(size: usize, padding: usize) -> Result<RandomCrop> {
        if size == 0 {
            return Err(Error::invalid("crop size must be positive"));
        }
        Ok(RandomCrop { size, padding })
    }
}

impl Transform for RandomCrop {
    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let (c, h, w) = image_dims(x)?;
        let ph = (h + 2 * self.padding).max(self.size);
        let pw = (w + 2 * self.padding).max(self.size);
        let (top_pad, left_pad) = ((ph - h) / 2, (pw - w) / 2);
        let (dy, dx) = with_rng(|rng| (rng.gen_range(0..=ph - self.size), rng.gen_range(0..=pw - self.size)));

        let mut out = Tensor::zeros(&[c, self.size, self.size]);
        for ch in 0..c {
            for y in 0..self.size {
                let src_y = (y + dy) as isize - top_pad as isize;
                if src_y < 0 || src_y >= h as isize {
                    continue;
                }
                for xx in 0..self.size {
                    let src_x = (xx + dx) as isize - left_pad as isize;
                    if src_x < 0 || src_x >= w as isize {
                        continue;
                    }
                    out.data[(ch * self.size + y) * self.size + xx] =
                        x.data[(ch * h + src_y as usize) * w + src_x as usize];
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> String {
        "RandomCrop".into()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RandomHorizontalFlip {
    pub p: f64,
}

impl Default for RandomHorizontalFlip {
    fn default() -> Self {
        RandomHorizontalFlip { p: 0.5 }
    }
}

impl Transform for RandomHorizontalFlip {
    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let (_, _, w) = image_dims(x)?;
        if with_rng(|rng| rng.gen::<f64>()) >= self.p {
            return Ok(x.clone());
        }
        let mut out = x.clone();
        for row in out.data.chunks_mut(w) {
            row.reverse();
        }
        Ok(out)
    }

    fn name(&self) -> String {
        "RandomHorizontalFlip".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_without_padding_is_identity() {
        let x = Tensor::rand(&[3, 5, 5], 0.0, 1.0);
        let y = RandomCrop::new(5, 0).unwrap().apply(&x).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn small_images_are_padded_up() {
        let x = Tensor::ones(&[1, 4, 4]);
        let y = RandomCrop::new(32, 4).unwrap().apply(&x).unwrap();
        assert_eq!(y.shape, vec![1, 32, 32]);
        assert_eq!(y.sum(), 16.0);
    }

    #[test]
    fn flip_mirrors_rows() {
        let x = Tensor::new(&[1, 1, 3], vec![1.0, 2.0, 3.0]).unwrap();
        let always = RandomHorizontalFlip { p: 1.0 };
        assert_eq!(always.apply(&x).unwrap().data, vec![3.0, 2.0, 1.0]);
        let never = RandomHorizontalFlip { p: 0.0 };
        assert_eq!(never.apply(&x).unwrap(), x);
    }
}
