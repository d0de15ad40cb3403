use std::path::{Path, PathBuf};

use image::imageops::FilterType;

use crate::datasets::{hwc_to_chw, out_of_range, require_path, Dataset, Sample, Target};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

/// `root/<class>/<image>` layout; classes are the sorted sub-directory names.
/// Images are decoded lazily and resized to `size x size` RGB.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub classes: Vec<String>,
    pub size: u32,
    items: Vec<(PathBuf, usize)>,
}

impl ImageFolder {
    pub fn new(root: impl AsRef<Path>, size: u32) -> Result<ImageFolder> {
        ImageFolder::named("image folder", root.as_ref(), size)
    }

    fn named(name: &str, root: &Path, size: u32) -> Result<ImageFolder> {
        require_path(name, root)?;
        if size == 0 {
            return Err(Error::invalid("image size must be positive"));
        }
        let mut classes: Vec<String> = std::fs::read_dir(root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        classes.sort();

        let mut items = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(root.join(class))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                })
                .collect();
            files.sort();
            items.extend(files.into_iter().map(|p| (p, label)));
        }
        if items.is_empty() {
            return Err(Error::DatasetNotFound { name: name.to_string(), path: root.display().to_string() });
        }
        tracing::info!(dataset = name, classes = classes.len(), samples = items.len(), "indexed image folder");
        Ok(ImageFolder { classes, size, items })
    }

    fn load(&self, path: &Path) -> Result<Tensor> {
        let rgb = image::open(path)?.to_rgb8();
        let resized = image::imageops::resize(&rgb, self.size, self.size, FilterType::Triangle);
        let side = self.size as usize;
        hwc_to_chw(resized.as_raw(), side, side, 3)
    }
}

impl Dataset for ImageFolder {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        let (path, label) = self.items.get(idx).ok_or_else(|| out_of_range(idx, self.len()))?;
        Ok(Sample { input: self.load(path)?, target: Target::Class(*label) })
    }
}

/// ImageNet distribution-shift test sets, stored as image folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageNetVariant {
    /// Natural adversarial examples.
    A,
    /// Out-of-distribution images for OOD detection.
    O,
    /// Renditions.
    R,
}

impl ImageNetVariant {
    pub fn name(self) -> &'static str {
        match self {
            ImageNetVariant::A => "ImageNet-A",
            ImageNetVariant::O => "ImageNet-O",
            ImageNetVariant::R => "ImageNet-R",
        }
    }

    fn dir(self) -> &'static str {
        match self {
            ImageNetVariant::A => "imagenet-a",
            ImageNetVariant::O => "imagenet-o",
            ImageNetVariant::R => "imagenet-r",
        }
    }

    pub fn load(self, root: impl AsRef<Path>, size: u32) -> Result<ImageFolder> {
        ImageFolder::named(self.name(), &root.as_ref().join(self.dir()), size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_sorted_classes() {
        let dir = tempfile::tempdir().unwrap();
        for (class, shade) in [("cat", 10u8), ("ant", 200u8)] {
            std::fs::create_dir_all(dir.path().join(class)).unwrap();
            let img = image::RgbImage::from_pixel(4, 4, image::Rgb([shade, shade, shade]));
            img.save(dir.path().join(class).join("0.png")).unwrap();
        }
        let ds = ImageFolder::new(dir.path(), 2).unwrap();
        assert_eq!(ds.classes, vec!["ant".to_string(), "cat".to_string()]);
        let s = ds.get(1).unwrap();
        assert_eq!(s.input.shape, vec![3, 2, 2]);
        assert_eq!(s.target, Target::Class(1));
        assert!((s.input.data[0] - 10.0 / 255.0).abs() <= 1.0 / 255.0);
    }

    #[test]
    fn missing_imagenet_a() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(ImageNetVariant::A.load(dir.path(), 224), Err(Error::DatasetNotFound { .. })));
    }
}
