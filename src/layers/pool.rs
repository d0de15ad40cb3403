use crate::error::{Error, Result};
use crate::layers::module::Module;
use crate::math::tensor::Tensor;

#[derive(Debug, Clone)]
pub struct MaxPool2d {
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
}

impl MaxPool2d {
    pub fn new(kernel_size: usize, stride: usize, padding: usize) -> MaxPool2d {
        MaxPool2d { kernel_size, stride, padding }
    }
}

impl Module for MaxPool2d {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        x.expect_ndim(4)?;
        let (b, c, h, w) = (x.shape[0], x.shape[1], x.shape[2], x.shape[3]);
        let (k, s, p) = (self.kernel_size, self.stride, self.padding);
        if h + 2 * p < k || w + 2 * p < k {
            return Err(Error::invalid(format!(
                "input {h}x{w} smaller than pooling window {k}"
            )));
        }
        let ho = (h + 2 * p - k) / s + 1;
        let wo = (w + 2 * p - k) / s + 1;
        let mut out = Vec::with_capacity(b * c * ho * wo);
        for plane in x.data.chunks(h * w) {
            for oh in 0..ho {
                for ow in 0..wo {
                    let mut best = f64::NEG_INFINITY;
                    for kh in 0..k {
                        let ih = (oh * s + kh) as isize - p as isize;
                        if ih < 0 || ih >= h as isize {
                            continue;
                        }
                        for kw in 0..k {
                            let iw = (ow * s + kw) as isize - p as isize;
                            if iw < 0 || iw >= w as isize {
                                continue;
                            }
                            best = best.max(plane[ih as usize * w + iw as usize]);
                        }
                    }
                    out.push(best);
                }
            }
        }
        Tensor::new(&[b, c, ho, wo], out)
    }

    fn name(&self) -> String {
        format!("MaxPool2d(kernel_size={}, stride={})", self.kernel_size, self.stride)
    }
}

/// Averages each plane into an `output_h x output_w` grid.
#[derive(Debug, Clone)]
pub struct AdaptiveAvgPool2d {
    pub output_h: usize,
    pub output_w: usize,
}

impl AdaptiveAvgPool2d {
    pub fn new(output_h: usize, output_w: usize) -> AdaptiveAvgPool2d {
        AdaptiveAvgPool2d { output_h, output_w }
    }
}

impl Module for AdaptiveAvgPool2d {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        x.expect_ndim(4)?;
        let (b, c, h, w) = (x.shape[0], x.shape[1], x.shape[2], x.shape[3]);
        let (oh_n, ow_n) = (self.output_h, self.output_w);
        let mut out = Vec::with_capacity(b * c * oh_n * ow_n);
        for plane in x.data.chunks(h * w) {
            for oh in 0..oh_n {
                let h0 = oh * h / oh_n;
                let h1 = ((oh + 1) * h + oh_n - 1) / oh_n;
                for ow in 0..ow_n {
                    let w0 = ow * w / ow_n;
                    let w1 = ((ow + 1) * w + ow_n - 1) / ow_n;
                    let mut sum = 0.0;
                    for ih in h0..h1 {
                        for iw in w0..w1 {
                            sum += plane[ih * w + iw];
                        }
                    }
                    out.push(sum / ((h1 - h0) * (w1 - w0)) as f64);
                }
            }
        }
        Tensor::new(&[b, c, oh_n, ow_n], out)
    }

    fn name(&self) -> String {
        format!("AdaptiveAvgPool2d(({}, {}))", self.output_h, self.output_w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_pool_halves_resolution() {
        let x = Tensor::new(&[1, 1, 2, 2], vec![1.0, 4.0, 3.0, 2.0]).unwrap();
        let y = MaxPool2d::new(2, 2, 0).forward(&x).unwrap();
        assert_eq!(y.shape, vec![1, 1, 1, 1]);
        assert_eq!(y.data, vec![4.0]);
    }

    #[test]
    fn global_average_pool() {
        let x = Tensor::new(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = AdaptiveAvgPool2d::new(1, 1).forward(&x).unwrap();
        assert_eq!(y.data, vec![2.5]);
    }

    #[test]
    fn adaptive_pool_upsamples_small_planes() {
        let x = Tensor::new(&[1, 1, 1, 1], vec![3.0]).unwrap();
        let y = AdaptiveAvgPool2d::new(7, 7).forward(&x).unwrap();
        assert_eq!(y.shape, vec![1, 1, 7, 7]);
        assert!(y.data.iter().all(|&v| v == 3.0));
    }
}
