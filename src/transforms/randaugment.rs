use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};
use crate::math::rng::{sample_standard_normal, with_rng};
use crate::math::tensor::Tensor;
use crate::transforms::{image_dims, Transform};

const MAX_MAGNITUDE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Identity,
    AutoContrast,
    Brightness,
    Contrast,
    Solarize,
    Posterize,
    TranslateX,
    TranslateY,
}

const OPS: [Op; 8] = [
    Op::Identity,
    Op::AutoContrast,
    Op::Brightness,
    Op::Contrast,
    Op::Solarize,
    Op::Posterize,
    Op::TranslateX,
    Op::TranslateY,
];

/// RandAugment: `num_ops` operations drawn uniformly per image, each at a
/// magnitude drawn from `N(magnitude, magnitude_std)` clipped to `[0, 10]`.
///
/// Parsed from policy strings such as `rand-m9-n2-mstd0.5`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandAugment {
    pub num_ops: usize,
    pub magnitude: f64,
    pub magnitude_std: f64,
}

impl Default for RandAugment {
    fn default() -> Self {
        RandAugment { num_ops: 2, magnitude: 9.0, magnitude_std: 0.0 }
    }
}

impl FromStr for RandAugment {
    type Err = Error;

    fn from_str(policy: &str) -> Result<RandAugment> {
        let mut parts = policy.split('-');
        if parts.next() != Some("rand") {
            return Err(Error::invalid(format!("augmentation policy {policy} must start with 'rand'")));
        }
        let mut ra = RandAugment::default();
        for part in parts {
            let bad = || Error::invalid(format!("invalid RandAugment option {part} in {policy}"));
            if let Some(v) = part.strip_prefix("mstd") {
                ra.magnitude_std = v.parse().map_err(|_| bad())?;
            } else if part.starts_with("inc") {
                // increasing-severity op set; every op here already scales with magnitude
            } else if let Some(v) = part.strip_prefix('m') {
                ra.magnitude = v.parse().map_err(|_| bad())?;
            } else if let Some(v) = part.strip_prefix('n') {
                ra.num_ops = v.parse().map_err(|_| bad())?;
            } else {
                return Err(bad());
            }
        }
        if !(0.0..=MAX_MAGNITUDE).contains(&ra.magnitude) || ra.magnitude_std < 0.0 {
            return Err(Error::invalid(format!("magnitude out of range in {policy}")));
        }
        Ok(ra)
    }
}

impl RandAugment {
    fn apply_op(op: Op, x: &Tensor, level: f64, sign: f64) -> Result<Tensor> {
        let (c, h, w) = image_dims(x)?;
        Ok(match op {
            Op::Identity => x.clone(),
            Op::AutoContrast => {
                let mut out = x.clone();
                for plane in out.data.chunks_mut(h * w) {
                    let lo = plane.iter().cloned().fold(f64::INFINITY, f64::min);
                    let hi = plane.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    if hi > lo {
                        plane.iter_mut().for_each(|v| *v = (*v - lo) / (hi - lo));
                    }
                }
                out
            }
            Op::Brightness => x.map(|v| (v * (1.0 + sign * 0.9 * level)).clamp(0.0, 1.0)),
            Op::Contrast => {
                let mean = x.mean();
                x.map(|v| (mean + (v - mean) * (1.0 + sign * 0.9 * level)).clamp(0.0, 1.0))
            }
            Op::Solarize => {
                let threshold = 1.0 - level;
                x.map(|v| if v >= threshold { 1.0 - v } else { v })
            }
            Op::Posterize => {
                let bits = 8 - (level * 4.0).round() as u32;
                let levels = (1u32 << bits) as f64;
                x.map(|v| ((v * 255.0) / 256.0 * levels).floor() / levels * 256.0 / 255.0)
            }
            Op::TranslateX | Op::TranslateY => {
                let extent = if op == Op::TranslateX { w } else { h };
                let shift = (sign * 0.45 * level * extent as f64).round() as isize;
                let mut out = Tensor::zeros(&[c, h, w]);
                for ch in 0..c {
                    for y in 0..h {
                        for xx in 0..w {
                            let (sy, sx) = if op == Op::TranslateX {
                                (y as isize, xx as isize - shift)
                            } else {
                                (y as isize - shift, xx as isize)
                            };
                            if sy >= 0 && sy < h as isize && sx >= 0 && sx < w as isize {
                                out.data[(ch * h + y) * w + xx] = x.data[(ch * h + sy as usize) * w + sx as usize];
                            }
                        }
                    }
                }
                out
            }
        })
    }
}

impl Transform for RandAugment {
    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let mut out = x.clone();
        for _ in 0..self.num_ops {
            let (op, magnitude, sign) = with_rng(|rng| {
                let op = *OPS.choose(rng).unwrap_or(&Op::Identity);
                let m = self.magnitude + self.magnitude_std * sample_standard_normal(rng);
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                (op, m.clamp(0.0, MAX_MAGNITUDE), sign)
            });
            out = RandAugment::apply_op(op, &out, magnitude / MAX_MAGNITUDE, sign)?;
        }
        Ok(out)
    }

    fn name(&self) -> String {
        "RandAugment".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_strings() {
        let ra: RandAugment = "rand-m9-n2-mstd0.5".parse().unwrap();
        assert_eq!(ra, RandAugment { num_ops: 2, magnitude: 9.0, magnitude_std: 0.5 });
        let ra: RandAugment = "rand-m7-mstd0.5-inc1".parse().unwrap();
        assert_eq!(ra.magnitude, 7.0);
        assert!("auto-m9".parse::<RandAugment>().is_err());
        assert!("rand-q3".parse::<RandAugment>().is_err());
        assert!("rand-m30".parse::<RandAugment>().is_err());
    }

    #[test]
    fn keeps_shape_and_range() {
        let ra: RandAugment = "rand-m9-n3".parse().unwrap();
        let x = Tensor::rand(&[3, 6, 6], 0.0, 1.0);
        let y = ra.apply(&x).unwrap();
        assert_eq!(y.shape, x.shape);
        assert!(y.data.iter().all(|v| (-1e-9..=1.0 + 1e-9).contains(v)));
    }
}
