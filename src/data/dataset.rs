// ============================================================
// Image Folder Dataset
// ============================================================
// Classification dataset laid out one directory per class:
//
//   root/
//     cat/  001.jpg 002.png ...
//     dog/  101.jpg ...
//
// Class indices follow the sorted directory names, so every
// rank (and every run) agrees on the label mapping. Images are
// decoded lazily in get() so only the sampled files are read.
//
// Reference: Burn Book §4 (Datasets)

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::data::dataset::Dataset;
use image::RgbImage;

use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff", "webp"];

/// One decoded sample
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub image: RgbImage,
    pub label: usize,
}

#[derive(Debug, Clone)]
pub struct ImageFolder {
    root:    PathBuf,
    classes: Vec<String>,
    samples: Vec<(PathBuf, usize)>,
}

impl ImageFolder {
    /// Scan `root` for class directories and their image files
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        let mut classes: Vec<String> = fs::read_dir(&root)
            .map_err(|e| Error::Dataset(format!("Cannot read dataset root '{}': {e}", root.display())))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        classes.sort();

        let mut samples = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let mut files: Vec<PathBuf> = fs::read_dir(root.join(class))?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && has_image_extension(path))
                .collect();
            files.sort();
            samples.extend(files.into_iter().map(|path| (path, label)));
        }

        if samples.is_empty() {
            return Err(Error::Dataset(format!(
                "Found 0 images in '{}' (expected one sub-directory per class)",
                root.display()
            )));
        }

        tracing::info!(
            "ImageFolder '{}': {} images in {} classes",
            root.display(),
            samples.len(),
            classes.len()
        );
        Ok(Self { root, classes, samples })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Class names in label order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn label_of(&self, index: usize) -> Option<usize> {
        self.samples.get(index).map(|(_, label)| *label)
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl Dataset<ImageItem> for ImageFolder {
    // `None` ends the loader's pass; the trainer turns the short pass into an error
    fn get(&self, index: usize) -> Option<ImageItem> {
        let (path, label) = self.samples.get(index)?;
        match image::open(path) {
            Ok(img) => Some(ImageItem { image: img.to_rgb8(), label: *label }),
            Err(e) => {
                tracing::error!("Cannot decode '{}': {}", path.display(), e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Write a tiny solid-colour dataset, used by tests across modules.
#[cfg(test)]
pub(crate) fn write_fixture(root: &Path, classes: &[&str], per_class: usize) {
    for (c, class) in classes.iter().enumerate() {
        let dir = root.join(class);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let shade = (40 * c + i) as u8;
            let img = RgbImage::from_pixel(12 + i as u32, 9, image::Rgb([shade, 0, 255 - shade]));
            img.save(dir.join(format!("{i:03}.png"))).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classes_sorted_and_labelled() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path(), &["zebra", "ant", "moth"], 2);
        fs::write(tmp.path().join("ant").join("notes.txt"), "skip me").unwrap();

        let ds = ImageFolder::new(tmp.path()).unwrap();
        assert_eq!(ds.classes(), &["ant", "moth", "zebra"]);
        assert_eq!(ds.len(), 6);
        assert_eq!(ds.label_of(0), Some(0));
        assert_eq!(ds.label_of(5), Some(2));

        let item = ds.get(1).unwrap();
        assert_eq!(item.label, 0);
        assert_eq!(item.image.dimensions(), (13, 9));
    }

    #[test]
    fn test_empty_root_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(ImageFolder::new(tmp.path()).is_err());
        assert!(ImageFolder::new(tmp.path().join("missing")).is_err());
    }
}
