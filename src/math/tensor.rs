use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::rng::{sample_standard_normal, with_rng};
use rand::Rng;

/// Dense row-major `f64` tensor. Image batches are laid out NCHW.
///
/// `shape.iter().product() == data.len()` holds for every constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn new(shape: &[usize], data: Vec<f64>) -> Result<Tensor> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Tensor { shape: shape.to_vec(), data })
    }

    /// Zero-dimensional tensor holding one value.
    pub fn scalar(value: f64) -> Tensor {
        Tensor { shape: Vec::new(), data: vec![value] }
    }

    /// The single value of a one-element tensor.
    pub fn item(&self) -> Result<f64> {
        match self.data.as_slice() {
            [v] => Ok(*v),
            _ => Err(Error::ShapeMismatch { expected: vec![], got: self.shape.clone() }),
        }
    }

    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor::full(shape, 0.0)
    }

    pub fn ones(shape: &[usize]) -> Tensor {
        Tensor::full(shape, 1.0)
    }

    pub fn full(shape: &[usize], value: f64) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }

    /// Samples from N(mean, std²).
    pub fn randn(shape: &[usize], mean: f64, std: f64) -> Tensor {
        let numel: usize = shape.iter().product();
        let data = with_rng(|rng| {
            (0..numel)
                .map(|_| mean + std * sample_standard_normal(rng))
                .collect()
        });
        Tensor { shape: shape.to_vec(), data }
    }

    /// Samples uniformly from [low, high).
    pub fn rand(shape: &[usize], low: f64, high: f64) -> Tensor {
        let numel: usize = shape.iter().product();
        let data = with_rng(|rng| (0..numel).map(|_| rng.gen_range(low..high)).collect());
        Tensor { shape: shape.to_vec(), data }
    }

    /// Builds a `[rows, cols]` tensor; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Tensor> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(Error::invalid("rows of unequal length"));
        }
        let data = rows.iter().flatten().copied().collect();
        Tensor::new(&[rows.len(), cols], data)
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dim(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    /// Leading (batch) dimension.
    pub fn batch(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of values per batch item.
    pub fn sample_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    pub fn sample(&self, idx: usize) -> &[f64] {
        let len = self.sample_len();
        &self.data[idx * len..(idx + 1) * len]
    }

    pub fn sample_mut(&mut self, idx: usize) -> &mut [f64] {
        let len = self.sample_len();
        &mut self.data[idx * len..(idx + 1) * len]
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor> {
        Tensor::new(shape, self.data.clone())
    }

    pub fn into_reshape(self, shape: &[usize]) -> Result<Tensor> {
        Tensor::new(shape, self.data)
    }

    /// Collapses everything after the batch dimension: `[B, ...] -> [B, N]`.
    pub fn flatten(&self) -> Tensor {
        Tensor {
            shape: vec![self.batch(), self.sample_len()],
            data: self.data.clone(),
        }
    }

    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    pub fn zip_map<F>(&self, other: &Tensor, f: F) -> Result<Tensor>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.expect_shape(&other.shape)?;
        Ok(Tensor {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_map(other, |a, b| a + b)
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum() / self.data.len() as f64
    }

    pub fn expect_shape(&self, shape: &[usize]) -> Result<()> {
        if self.shape != shape {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: self.shape.clone(),
            });
        }
        Ok(())
    }

    pub fn expect_ndim(&self, ndim: usize) -> Result<()> {
        if self.ndim() != ndim {
            return Err(Error::invalid(format!(
                "expected a {}-D tensor, got shape {:?}",
                ndim, self.shape
            )));
        }
        Ok(())
    }

    /// Concatenates tensors along the batch dimension.
    pub fn cat_batch(parts: &[Tensor]) -> Result<Tensor> {
        let first = parts
            .first()
            .ok_or_else(|| Error::invalid("cannot concatenate zero tensors"))?;
        let tail = &first.shape[1..];
        let mut batch = 0;
        let mut data = Vec::with_capacity(parts.iter().map(|p| p.numel()).sum());
        for part in parts {
            if &part.shape[1..] != tail {
                return Err(Error::ShapeMismatch {
                    expected: first.shape.clone(),
                    got: part.shape.clone(),
                });
            }
            batch += part.batch();
            data.extend_from_slice(&part.data);
        }
        let mut shape = vec![batch];
        shape.extend_from_slice(tail);
        Ok(Tensor { shape, data })
    }

    /// Splits the batch dimension into `n` equal chunks.
    pub fn split_batch(&self, n: usize) -> Result<Vec<Tensor>> {
        if n == 0 || self.batch() % n != 0 {
            return Err(Error::invalid(format!(
                "batch of {} cannot be split into {} groups",
                self.batch(),
                n
            )));
        }
        let per = self.batch() / n;
        let chunk = per * self.sample_len();
        let mut shape = self.shape.clone();
        shape[0] = per;
        Ok(self
            .data
            .chunks(chunk.max(1))
            .take(n)
            .map(|c| Tensor { shape: shape.clone(), data: c.to_vec() })
            .collect())
    }

    /// Gathers batch items by index.
    pub fn select_batch(&self, indices: &[usize]) -> Tensor {
        let mut shape = self.shape.clone();
        shape[0] = indices.len();
        let mut data = Vec::with_capacity(indices.len() * self.sample_len());
        for &i in indices {
            data.extend_from_slice(self.sample(i));
        }
        Tensor { shape, data }
    }

    /// `x.repeat(n, 1, ...)`: `n` copies stacked along the batch dimension.
    pub fn repeat_batch(&self, n: usize) -> Tensor {
        let mut shape = self.shape.clone();
        shape[0] *= n;
        let mut data = Vec::with_capacity(self.numel() * n);
        for _ in 0..n {
            data.extend_from_slice(&self.data);
        }
        Tensor { shape, data }
    }

    /// `x.repeat(1, n, 1, 1)`: channel block repeated `n` times per sample.
    pub fn repeat_channels(&self, n: usize) -> Tensor {
        let mut shape = self.shape.clone();
        shape[1] *= n;
        let mut data = Vec::with_capacity(self.numel() * n);
        for b in 0..self.batch() {
            let s = self.sample(b);
            for _ in 0..n {
                data.extend_from_slice(s);
            }
        }
        Tensor { shape, data }
    }

    /// `e (m c) ... -> (m e) c ...`: channel groups become batch groups.
    pub fn channels_to_batch(&self, m: usize) -> Result<Tensor> {
        let (e, mc) = (self.shape[0], self.shape[1]);
        if m == 0 || mc % m != 0 {
            return Err(Error::invalid(format!("{mc} channels not divisible by {m}")));
        }
        let block = self.sample_len() / m;
        let mut data = Vec::with_capacity(self.numel());
        for mi in 0..m {
            for ei in 0..e {
                let s = self.sample(ei);
                data.extend_from_slice(&s[mi * block..(mi + 1) * block]);
            }
        }
        let mut shape = self.shape.clone();
        shape[0] = e * m;
        shape[1] = mc / m;
        Ok(Tensor { shape, data })
    }

    /// `(m b) c ... -> b (m c) ...`: batch groups become channel groups.
    pub fn batch_to_channels(&self, m: usize) -> Result<Tensor> {
        let mb = self.shape[0];
        if m == 0 || mb % m != 0 {
            return Err(Error::invalid(format!("batch of {mb} not divisible by {m}")));
        }
        let b = mb / m;
        let mut data = Vec::with_capacity(self.numel());
        for bi in 0..b {
            for mi in 0..m {
                data.extend_from_slice(self.sample(mi * b + bi));
            }
        }
        let mut shape = self.shape.clone();
        shape[0] = b;
        shape[1] *= m;
        Ok(Tensor { shape, data })
    }

    /// `(m b) c -> b m c`: estimator-major logits to sample-major stacks.
    pub fn estimators_last(&self, m: usize) -> Result<Tensor> {
        self.expect_ndim(2)?;
        let (mb, c) = (self.shape[0], self.shape[1]);
        if m == 0 || mb % m != 0 {
            return Err(Error::invalid(format!("batch of {mb} not divisible by {m}")));
        }
        let b = mb / m;
        let mut data = Vec::with_capacity(self.numel());
        for bi in 0..b {
            for mi in 0..m {
                data.extend_from_slice(self.sample(mi * b + bi));
            }
        }
        Tensor::new(&[b, m, c], data)
    }

    /// Mean over dimension 1 of a 3-D tensor: `[B, M, C] -> [B, C]`.
    pub fn mean_dim1(&self) -> Result<Tensor> {
        self.expect_ndim(3)?;
        let (b, m, c) = (self.shape[0], self.shape[1], self.shape[2]);
        let mut data = vec![0.0; b * c];
        for bi in 0..b {
            for mi in 0..m {
                for ci in 0..c {
                    data[bi * c + ci] += self.data[(bi * m + mi) * c + ci] / m as f64;
                }
            }
        }
        Tensor::new(&[b, c], data)
    }

    /// Softmax over the last dimension.
    pub fn softmax_last(&self) -> Tensor {
        let c = *self.shape.last().unwrap_or(&1);
        let mut out = self.clone();
        for row in out.data.chunks_mut(c.max(1)) {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let mut total = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                total += *v;
            }
            for v in row.iter_mut() {
                *v /= total;
            }
        }
        out
    }

    /// `[n, k] x [k, m] -> [n, m]`
    pub fn matmul(&self, rhs: &Tensor) -> Result<Tensor> {
        self.expect_ndim(2)?;
        rhs.expect_ndim(2)?;
        let (n, k, m) = (self.shape[0], self.shape[1], rhs.shape[1]);
        if rhs.shape[0] != k {
            return Err(Error::ShapeMismatch { expected: vec![k, m], got: rhs.shape.clone() });
        }
        let mut out = vec![0.0; n * m];
        for i in 0..n {
            for p in 0..k {
                let a = self.data[i * k + p];
                if a == 0.0 {
                    continue;
                }
                let row = &rhs.data[p * m..(p + 1) * m];
                for (o, r) in out[i * m..(i + 1) * m].iter_mut().zip(row.iter()) {
                    *o += a * r;
                }
            }
        }
        Tensor::new(&[n, m], out)
    }

    /// Transpose of a 2-D tensor.
    pub fn t(&self) -> Tensor {
        let (r, c) = (self.shape[0], self.shape[1]);
        let mut data = vec![0.0; r * c];
        for i in 0..r {
            for j in 0..c {
                data[j * r + i] = self.data[i * c + j];
            }
        }
        Tensor { shape: vec![c, r], data }
    }

    /// Index of the maximum along the last dimension, per row.
    pub fn argmax_last(&self) -> Vec<usize> {
        let c = *self.shape.last().unwrap_or(&1);
        self.data.chunks(c.max(1)).map(argmax).collect()
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { shape: vec![0], data: Vec::new() }
    }
}

/// Index of the maximum element in a slice.
pub fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_wrong_length() {
        assert!(Tensor::new(&[2, 2], vec![1.0; 3]).is_err());
    }

    #[test]
    fn channels_to_batch_moves_estimator_groups() {
        // e=1, (m c) = 2*1, h=w=1
        let x = Tensor::new(&[1, 2, 1, 1], vec![1.0, 2.0]).unwrap();
        let y = x.channels_to_batch(2).unwrap();
        assert_eq!(y.shape, vec![2, 1, 1, 1]);
        assert_eq!(y.data, vec![1.0, 2.0]);
        assert_eq!(y.batch_to_channels(2).unwrap(), x);
    }

    #[test]
    fn estimators_last_interleaves() {
        // m=2, b=2, c=1 ; rows [m0b0, m0b1, m1b0, m1b1]
        let x = Tensor::new(&[4, 1], vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let y = x.estimators_last(2).unwrap();
        assert_eq!(y.shape, vec![2, 2, 1]);
        assert_eq!(y.data, vec![0.0, 2.0, 1.0, 3.0]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let x = Tensor::new(&[2, 3], vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]).unwrap();
        let p = x.softmax_last();
        for row in p.data.chunks(3) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
        assert_eq!(p.argmax_last(), vec![2, 0]);
    }

    #[test]
    fn matmul_and_transpose() {
        let a = Tensor::new(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let i = Tensor::new(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(a.matmul(&i).unwrap(), a);
        assert_eq!(a.t().data, vec![1.0, 3.0, 2.0, 4.0]);
        assert!(a.matmul(&Tensor::zeros(&[3, 1])).is_err());
    }

    #[test]
    fn repeat_and_split_batch() {
        let x = Tensor::new(&[1, 2], vec![1.0, 2.0]).unwrap();
        let r = x.repeat_batch(3);
        assert_eq!(r.shape, vec![3, 2]);
        let parts = r.split_batch(3).unwrap();
        assert!(parts.iter().all(|p| *p == x));
    }
}
