use std::path::Path;

use crate::datasets::{out_of_range, require_path, Dataset, Sample, Split, Target};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// MNIST (or any IDX-formatted digit set) read from `root/MNIST/raw`.
#[derive(Debug, Clone)]
pub struct Mnist {
    rows: usize,
    cols: usize,
    pixels: Vec<u8>,
    labels: Vec<usize>,
}

impl Mnist {
    pub fn new(root: impl AsRef<Path>, split: Split) -> Result<Mnist> {
        let dir = root.as_ref().join("MNIST").join("raw");
        let prefix = match split {
            Split::Train => "train",
            Split::Test => "t10k",
        };
        let image_path = dir.join(format!("{prefix}-images-idx3-ubyte"));
        let label_path = dir.join(format!("{prefix}-labels-idx1-ubyte"));
        require_path("MNIST", &image_path)?;
        require_path("MNIST", &label_path)?;
        let mnist = Mnist::from_idx_bytes(&std::fs::read(image_path)?, &std::fs::read(label_path)?, 10)?;
        tracing::info!(?split, samples = mnist.len(), "loaded MNIST");
        Ok(mnist)
    }

    /// Decodes an IDX3 image file and its IDX1 label file.
    ///
    /// Image header: two zero bytes, dtype `0x08`, `3` dimensions, then
    /// big-endian `u32` count, rows and cols. Label header: two zero bytes,
    /// dtype `0x08`, `1` dimension, then the big-endian `u32` count.
    pub fn from_idx_bytes(image_bytes: &[u8], label_bytes: &[u8], num_classes: usize) -> Result<Mnist> {
        check_header("image", image_bytes, 3, 16)?;
        check_header("label", label_bytes, 1, 8)?;

        let n_items = be_u32(image_bytes, 4);
        let rows = be_u32(image_bytes, 8);
        let cols = be_u32(image_bytes, 12);
        let n_pixels = rows
            .checked_mul(cols)
            .ok_or_else(|| Error::Parse(format!("IDX rows * cols overflows (rows={rows}, cols={cols})")))?;
        let needed = n_items
            .checked_mul(n_pixels)
            .and_then(|n| n.checked_add(16))
            .ok_or_else(|| Error::Parse("IDX image data length overflows".into()))?;
        if image_bytes.len() < needed {
            return Err(Error::Parse(format!(
                "IDX image file too short: header declares {n_items} items of {rows}x{cols} pixels \
                 but file is only {} bytes",
                image_bytes.len()
            )));
        }

        let label_count = be_u32(label_bytes, 4);
        if label_count != n_items {
            return Err(Error::Parse(format!(
                "IDX file mismatch: {n_items} images but {label_count} labels"
            )));
        }
        if label_bytes.len() < 8 + n_items {
            return Err(Error::Parse(format!(
                "IDX label file too short: {n_items} labels declared, {} bytes present",
                label_bytes.len()
            )));
        }

        let labels = label_bytes[8..8 + n_items]
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let class = c as usize;
                if class >= num_classes {
                    Err(Error::Parse(format!(
                        "IDX label at index {i}: class {class} out of range for {num_classes} classes"
                    )))
                } else {
                    Ok(class)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Mnist { rows, cols, pixels: image_bytes[16..needed].to_vec(), labels })
    }
}

fn check_header(kind: &str, bytes: &[u8], dims: u8, min_len: usize) -> Result<()> {
    if bytes.len() < min_len {
        return Err(Error::Parse(format!(
            "IDX {kind} file too short: expected at least {min_len} header bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[0] != 0 || bytes[1] != 0 {
        return Err(Error::Parse(format!("IDX {kind} file: reserved bytes must be zero")));
    }
    if bytes[2] != 0x08 {
        return Err(Error::Parse(format!("IDX {kind} file: dtype must be uint8, got 0x{:02X}", bytes[2])));
    }
    if bytes[3] != dims {
        return Err(Error::Parse(format!("IDX {kind} file: expected {dims} dimensions, got {}", bytes[3])));
    }
    Ok(())
}

fn be_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

impl Dataset for Mnist {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        if idx >= self.len() {
            return Err(out_of_range(idx, self.len()));
        }
        let n = self.rows * self.cols;
        let data = self.pixels[idx * n..(idx + 1) * n].iter().map(|&p| p as f64 / 255.0).collect();
        Ok(Sample { input: Tensor::new(&[1, self.rows, self.cols], data)?, target: Target::Class(self.labels[idx]) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx_pair(n: usize) -> (Vec<u8>, Vec<u8>) {
        let mut images = vec![0, 0, 8, 3];
        for v in [n as u32, 2, 2] {
            images.extend(v.to_be_bytes());
        }
        for i in 0..n {
            images.extend([i as u8 * 50; 4]);
        }
        let mut labels = vec![0, 0, 8, 1];
        labels.extend((n as u32).to_be_bytes());
        labels.extend((0..n).map(|i| i as u8));
        (images, labels)
    }

    #[test]
    fn decodes_idx() {
        let (img, lbl) = idx_pair(3);
        let ds = Mnist::from_idx_bytes(&img, &lbl, 10).unwrap();
        let s = ds.get(1).unwrap();
        assert_eq!(s.input.shape, vec![1, 2, 2]);
        assert!((s.input.data[0] - 50.0 / 255.0).abs() < 1e-12);
        assert_eq!(s.target, Target::Class(1));
    }

    #[test]
    fn rejects_inconsistent_files() {
        let (img, mut lbl) = idx_pair(3);
        lbl[3] = 3;
        assert!(Mnist::from_idx_bytes(&img, &lbl, 10).is_err());
        let (img, lbl) = idx_pair(3);
        assert!(Mnist::from_idx_bytes(&img, &lbl, 2).is_err());
        assert!(Mnist::from_idx_bytes(&img[..20], &lbl, 10).is_err());
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Mnist::new(dir.path(), Split::Train), Err(Error::DatasetNotFound { .. })));
    }
}
