use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::datasets::npy::{read_npy, NpyData};
use crate::datasets::{hwc_to_chw, out_of_range, require_path, Dataset, Sample, Split, Target};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

const SIDE: usize = 32;
const IMAGE_BYTES: usize = 3 * SIDE * SIDE;

/// The fifteen corruptions of CIFAR-10-C / CIFAR-100-C.
pub const CORRUPTIONS: [&str; 15] = [
    "gaussian_noise",
    "shot_noise",
    "impulse_noise",
    "defocus_blur",
    "glass_blur",
    "motion_blur",
    "zoom_blur",
    "snow",
    "frost",
    "fog",
    "brightness",
    "contrast",
    "elastic_transform",
    "pixelate",
    "jpeg_compression",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CifarVersion {
    Cifar10,
    Cifar100,
}

impl CifarVersion {
    pub fn num_classes(self) -> usize {
        match self {
            CifarVersion::Cifar10 => 10,
            CifarVersion::Cifar100 => 100,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CifarVersion::Cifar10 => "CIFAR-10",
            CifarVersion::Cifar100 => "CIFAR-100",
        }
    }

    fn binary_dir(self) -> &'static str {
        match self {
            CifarVersion::Cifar10 => "cifar-10-batches-bin",
            CifarVersion::Cifar100 => "cifar-100-binary",
        }
    }

    fn files(self, split: Split) -> Vec<String> {
        match (self, split) {
            (CifarVersion::Cifar10, Split::Train) => (1..=5).map(|i| format!("data_batch_{i}.bin")).collect(),
            (CifarVersion::Cifar10, Split::Test) => vec!["test_batch.bin".into()],
            (CifarVersion::Cifar100, Split::Train) => vec!["train.bin".into()],
            (CifarVersion::Cifar100, Split::Test) => vec!["test.bin".into()],
        }
    }

    /// Bytes before the image in one binary record: CIFAR-100 stores the
    /// coarse label first and the fine label second.
    fn label_bytes(self) -> usize {
        match self {
            CifarVersion::Cifar10 => 1,
            CifarVersion::Cifar100 => 2,
        }
    }

    fn corrupted_dir(self) -> &'static str {
        match self {
            CifarVersion::Cifar10 => "CIFAR-10-C",
            CifarVersion::Cifar100 => "CIFAR-100-C",
        }
    }
}

/// CIFAR-10 / CIFAR-100 read from the official binary release under `root`.
#[derive(Debug, Clone)]
pub struct Cifar {
    pub version: CifarVersion,
    images: Vec<u8>,
    labels: Vec<usize>,
}

impl Cifar {
    pub fn new(root: impl AsRef<Path>, version: CifarVersion, split: Split) -> Result<Cifar> {
        let dir = root.as_ref().join(version.binary_dir());
        require_path(version.name(), &dir)?;
        let record = version.label_bytes() + IMAGE_BYTES;
        let mut images = Vec::new();
        let mut labels = Vec::new();
        for file in version.files(split) {
            let path = dir.join(&file);
            require_path(version.name(), &path)?;
            let bytes = std::fs::read(&path)?;
            if bytes.len() % record != 0 {
                return Err(Error::Parse(format!(
                    "{} is not a whole number of {record}-byte records",
                    path.display()
                )));
            }
            for chunk in bytes.chunks_exact(record) {
                let label = chunk[version.label_bytes() - 1] as usize;
                if label >= version.num_classes() {
                    return Err(Error::Parse(format!("label {label} out of range in {}", path.display())));
                }
                labels.push(label);
                images.extend_from_slice(&chunk[version.label_bytes()..]);
            }
        }
        tracing::info!(dataset = version.name(), ?split, samples = labels.len(), "loaded CIFAR");
        Ok(Cifar { version, images, labels })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    fn image(&self, idx: usize) -> Result<Tensor> {
        // binary records are already channel-major
        let bytes = &self.images[idx * IMAGE_BYTES..(idx + 1) * IMAGE_BYTES];
        Tensor::new(&[3, SIDE, SIDE], bytes.iter().map(|&b| b as f64 / 255.0).collect())
    }
}

impl Dataset for Cifar {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        if idx >= self.len() {
            return Err(out_of_range(idx, self.len()));
        }
        Ok(Sample { input: self.image(idx)?, target: Target::Class(self.labels[idx]) })
    }
}

/// Corrupted CIFAR test sets: one `[5 * N, 32, 32, 3]` uint8 array per
/// corruption, severities stacked from 1 to 5, and a shared `labels.npy`.
#[derive(Debug, Clone)]
pub struct CifarC {
    pub version: CifarVersion,
    pub severity: usize,
    images: Vec<u8>,
    labels: Vec<usize>,
}

impl CifarC {
    pub fn new(root: impl AsRef<Path>, version: CifarVersion, severity: usize) -> Result<CifarC> {
        CifarC::with_corruptions(root, version, severity, &CORRUPTIONS)
    }

    pub fn with_corruptions(
        root: impl AsRef<Path>,
        version: CifarVersion,
        severity: usize,
        corruptions: &[&str],
    ) -> Result<CifarC> {
        if !(1..=5).contains(&severity) {
            return Err(Error::invalid(format!("corruption severity must be in 1..=5, got {severity}")));
        }
        let name = format!("{}-C", version.name());
        let dir = root.as_ref().join(version.corrupted_dir());
        require_path(&name, &dir)?;
        let label_path = dir.join("labels.npy");
        require_path(&name, &label_path)?;
        let all_labels: Vec<usize> = read_npy(&label_path)?.to_f64().into_iter().map(|v| v as usize).collect();
        let per_severity = all_labels.len() / 5;
        let range = (severity - 1) * per_severity..severity * per_severity;

        let mut images = Vec::new();
        let mut labels = Vec::new();
        for corruption in corruptions {
            let path = dir.join(format!("{corruption}.npy"));
            require_path(&name, &path)?;
            let array = read_npy(&path)?;
            if array.shape.len() != 4 || array.shape[1..] != [SIDE, SIDE, 3] || array.len() != all_labels.len() {
                return Err(Error::Parse(format!("unexpected shape {:?} in {}", array.shape, path.display())));
            }
            let bytes = match array.values {
                NpyData::Bytes(b) => b,
                NpyData::Floats(_) => return Err(Error::Parse(format!("{} is not uint8", path.display()))),
            };
            images.extend_from_slice(&bytes[range.start * IMAGE_BYTES..range.end * IMAGE_BYTES]);
            labels.extend_from_slice(&all_labels[range.clone()]);
        }
        tracing::info!(dataset = %name, severity, samples = labels.len(), "loaded corrupted CIFAR");
        Ok(CifarC { version, severity, images, labels })
    }
}

impl Dataset for CifarC {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        if idx >= self.len() {
            return Err(out_of_range(idx, self.len()));
        }
        let input = hwc_to_chw(&self.images[idx * IMAGE_BYTES..(idx + 1) * IMAGE_BYTES], SIDE, SIDE, 3)?;
        Ok(Sample { input, target: Target::Class(self.labels[idx]) })
    }
}

/// CIFAR-10 test images paired with the human annotator label distributions
/// of CIFAR-10H (`cifar-10h/cifar10h-probs.npy`, `[10000, 10]`).
#[derive(Debug, Clone)]
pub struct Cifar10H {
    images: Cifar,
    probs: Vec<f64>,
}

impl Cifar10H {
    pub fn new(root: impl AsRef<Path>) -> Result<Cifar10H> {
        let path = root.as_ref().join("cifar-10h").join("cifar10h-probs.npy");
        require_path("CIFAR-10H", &path)?;
        let images = Cifar::new(root.as_ref(), CifarVersion::Cifar10, Split::Test)?;
        let array = read_npy(&path)?;
        if array.shape != [images.len(), 10] {
            return Err(Error::Parse(format!(
                "CIFAR-10H probabilities have shape {:?}, expected [{}, 10]",
                array.shape,
                images.len()
            )));
        }
        Ok(Cifar10H { images, probs: array.to_f64() })
    }
}

impl Dataset for Cifar10H {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        if idx >= self.len() {
            return Err(out_of_range(idx, self.len()));
        }
        let input = self.images.image(idx)?;
        Ok(Sample { input, target: Target::Soft(self.probs[idx * 10..(idx + 1) * 10].to_vec()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::npy::{write_npy, NpyArray};

    fn write_cifar10_test(root: &Path, n: usize) {
        let dir = root.join("cifar-10-batches-bin");
        std::fs::create_dir_all(&dir).unwrap();
        let mut bytes = Vec::new();
        for i in 0..n {
            bytes.push((i % 10) as u8);
            bytes.extend(std::iter::repeat(i as u8).take(IMAGE_BYTES));
        }
        std::fs::write(dir.join("test_batch.bin"), bytes).unwrap();
    }

    #[test]
    fn reads_binary_records() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar10_test(dir.path(), 3);
        let ds = Cifar::new(dir.path(), CifarVersion::Cifar10, Split::Test).unwrap();
        assert_eq!(ds.len(), 3);
        let s = ds.get(2).unwrap();
        assert_eq!(s.target, Target::Class(2));
        assert_eq!(s.input.shape, vec![3, 32, 32]);
        assert!((s.input.data[0] - 2.0 / 255.0).abs() < 1e-12);
    }

    #[test]
    fn missing_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Cifar::new(dir.path(), CifarVersion::Cifar100, Split::Train),
            Err(Error::DatasetNotFound { .. })
        ));
        assert!(matches!(Cifar10H::new(dir.path()), Err(Error::DatasetNotFound { .. })));
    }

    #[test]
    fn corrupted_split_selects_severity() {
        let dir = tempfile::tempdir().unwrap();
        let c_dir = dir.path().join("CIFAR-10-C");
        std::fs::create_dir_all(&c_dir).unwrap();
        let labels: Vec<f64> = (0..10).map(|i| (i % 10) as f64).collect();
        write_npy(c_dir.join("labels.npy"), &NpyArray { shape: vec![10], values: NpyData::Floats(labels) }).unwrap();
        let mut pixels = Vec::new();
        for i in 0..10u8 {
            pixels.extend(std::iter::repeat(i).take(IMAGE_BYTES));
        }
        let images = NpyArray { shape: vec![10, 32, 32, 3], values: NpyData::Bytes(pixels) };
        write_npy(c_dir.join("fog.npy"), &images).unwrap();

        let ds = CifarC::with_corruptions(dir.path(), CifarVersion::Cifar10, 3, &["fog"]).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(0).unwrap().target, Target::Class(4));
        assert!(CifarC::with_corruptions(dir.path(), CifarVersion::Cifar10, 6, &["fog"]).is_err());
        assert!(matches!(
            CifarC::with_corruptions(dir.path(), CifarVersion::Cifar10, 1, &["snow"]),
            Err(Error::DatasetNotFound { .. })
        ));
    }

    #[test]
    fn soft_labels_pair_with_test_images() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar10_test(dir.path(), 2);
        let h_dir = dir.path().join("cifar-10h");
        std::fs::create_dir_all(&h_dir).unwrap();
        let mut probs = vec![0.0; 20];
        probs[3] = 0.5;
        probs[4] = 0.5;
        probs[19] = 1.0;
        write_npy(h_dir.join("cifar10h-probs.npy"), &NpyArray { shape: vec![2, 10], values: NpyData::Floats(probs) })
            .unwrap();
        let ds = Cifar10H::new(dir.path()).unwrap();
        match ds.get(0).unwrap().target {
            Target::Soft(p) => assert_eq!(p[3], 0.5),
            other => panic!("unexpected target {other:?}"),
        }
    }
}
