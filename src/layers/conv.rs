use crate::error::{Error, Result};
use crate::layers::module::{Module, WeightInit};
use crate::math::tensor::Tensor;

/// Hyperparameters shared by every 2-D convolution flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvSpec {
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub groups: usize,
    pub bias: bool,
}

impl ConvSpec {
    pub fn new(kernel_size: usize, stride: usize, padding: usize) -> ConvSpec {
        ConvSpec { kernel_size, stride, padding, groups: 1, bias: true }
    }

    pub fn groups(mut self, groups: usize) -> ConvSpec {
        self.groups = groups;
        self
    }

    pub fn bias(mut self, bias: bool) -> ConvSpec {
        self.bias = bias;
        self
    }

    pub fn output_size(&self, input: usize) -> usize {
        (input + 2 * self.padding).saturating_sub(self.kernel_size) / self.stride + 1
    }
}

/// 2-D convolution over NCHW input with grouped channels.
#[derive(Debug, Clone)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub spec: ConvSpec,
    /// `[out, in / groups, k, k]`
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl Conv2d {
    pub fn new(in_channels: usize, out_channels: usize, spec: ConvSpec) -> Result<Conv2d> {
        if spec.groups == 0 || in_channels % spec.groups != 0 || out_channels % spec.groups != 0 {
            return Err(Error::invalid(format!(
                "channels ({in_channels} -> {out_channels}) must be divisible by groups ({})",
                spec.groups
            )));
        }
        if spec.kernel_size == 0 || spec.stride == 0 {
            return Err(Error::invalid("kernel size and stride must be positive"));
        }
        let k = spec.kernel_size;
        let fan_in = (in_channels / spec.groups * k * k) as f64;
        let bound = 1.0 / fan_in.sqrt();
        Ok(Conv2d {
            in_channels,
            out_channels,
            spec,
            weight: Tensor::rand(&[out_channels, in_channels / spec.groups, k, k], -bound, bound),
            bias: spec.bias.then(|| Tensor::rand(&[out_channels], -bound, bound)),
        })
    }

    pub fn kaiming_normal_fan_out(&mut self) {
        let k = self.spec.kernel_size;
        let std = (2.0 / (self.out_channels * k * k) as f64).sqrt();
        self.weight = Tensor::randn(&self.weight.shape, 0.0, std);
        if let Some(b) = self.bias.as_mut() {
            *b = Tensor::zeros(&b.shape);
        }
    }
}

/// Direct grouped convolution. `weight` is `[out, in / groups, k, k]`.
pub(crate) fn conv2d_forward(
    x: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    spec: &ConvSpec,
) -> Result<Tensor> {
    x.expect_ndim(4)?;
    let (b, c_in, h, w) = (x.shape[0], x.shape[1], x.shape[2], x.shape[3]);
    let (c_out, c_in_g, k) = (weight.shape[0], weight.shape[1], weight.shape[2]);
    if c_in_g * spec.groups != c_in {
        return Err(Error::ShapeMismatch {
            expected: vec![b, c_in_g * spec.groups, h, w],
            got: x.shape.clone(),
        });
    }
    let (ho, wo) = (spec.output_size(h), spec.output_size(w));
    let c_out_g = c_out / spec.groups;
    let (s, p) = (spec.stride as isize, spec.padding as isize);
    let mut out = vec![0.0; b * c_out * ho * wo];

    for bi in 0..b {
        let xs = x.sample(bi);
        for oc in 0..c_out {
            let g = oc / c_out_g;
            let plane = &mut out[((bi * c_out + oc) * ho * wo)..((bi * c_out + oc + 1) * ho * wo)];
            if let Some(bias) = bias {
                plane.iter_mut().for_each(|v| *v = bias.data[oc]);
            }
            for icg in 0..c_in_g {
                let ic = g * c_in_g + icg;
                let xin = &xs[ic * h * w..(ic + 1) * h * w];
                let wk = &weight.data[((oc * c_in_g + icg) * k * k)..((oc * c_in_g + icg + 1) * k * k)];
                for kh in 0..k {
                    for kw in 0..k {
                        let wv = wk[kh * k + kw];
                        if wv == 0.0 {
                            continue;
                        }
                        for oh in 0..ho {
                            let ih = oh as isize * s + kh as isize - p;
                            if ih < 0 || ih >= h as isize {
                                continue;
                            }
                            let row = &xin[ih as usize * w..(ih as usize + 1) * w];
                            for ow in 0..wo {
                                let iw = ow as isize * s + kw as isize - p;
                                if iw < 0 || iw >= w as isize {
                                    continue;
                                }
                                plane[oh * wo + ow] += wv * row[iw as usize];
                            }
                        }
                    }
                }
            }
        }
    }
    Tensor::new(&[b, c_out, ho, wo], out)
}

impl Module for Conv2d {
    fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        conv2d_forward(x, &self.weight, self.bias.as_ref(), &self.spec)
    }

    fn name(&self) -> String {
        format!(
            "Conv2d({}, {}, kernel_size={}, stride={}, padding={}, groups={})",
            self.in_channels,
            self.out_channels,
            self.spec.kernel_size,
            self.spec.stride,
            self.spec.padding,
            self.spec.groups
        )
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

    fn init_weights(&mut self, _init: WeightInit) {
        self.kaiming_normal_fan_out();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_shape_follows_stride_and_padding() {
        let mut conv = Conv2d::new(3, 8, ConvSpec::new(3, 2, 1)).unwrap();
        let y = conv.forward(&Tensor::zeros(&[2, 3, 8, 8])).unwrap();
        assert_eq!(y.shape, vec![2, 8, 4, 4]);
    }

    #[test]
    fn identity_kernel_copies_input() {
        let mut conv = Conv2d::new(1, 1, ConvSpec::new(3, 1, 1).bias(false)).unwrap();
        let mut w = vec![0.0; 9];
        w[4] = 1.0;
        conv.weight = Tensor::new(&[1, 1, 3, 3], w).unwrap();
        let x = Tensor::new(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(conv.forward(&x).unwrap().data, x.data);
    }

    #[test]
    fn grouped_convolution_keeps_groups_apart() {
        let mut conv = Conv2d::new(2, 2, ConvSpec::new(1, 1, 0).groups(2).bias(false)).unwrap();
        assert_eq!(conv.weight.shape, vec![2, 1, 1, 1]);
        conv.weight = Tensor::new(&[2, 1, 1, 1], vec![2.0, 3.0]).unwrap();
        let x = Tensor::new(&[1, 2, 1, 1], vec![1.0, 1.0]).unwrap();
        assert_eq!(conv.forward(&x).unwrap().data, vec![2.0, 3.0]);
    }

    #[test]
    fn rejects_indivisible_groups() {
        assert!(Conv2d::new(3, 4, ConvSpec::new(3, 1, 1).groups(2)).is_err());
    }
}
