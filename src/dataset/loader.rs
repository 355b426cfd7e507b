//! Image folder loader
//!
//! Reads a directory tree of the form `root/<class>/<image>` and assigns
//! labels by the sorted position of each class folder.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::dataset::preprocess::is_image_file;
use crate::utils::error::{Error, Result};

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// Folder-labelled image collection
#[derive(Debug, Clone)]
pub struct ImageFolder {
    /// Root directory of the split
    pub root_dir: PathBuf,
    /// Sorted class names; a label is an index into this list
    pub classes: Vec<String>,
    /// Samples ordered by class, then by path
    pub samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan a split directory
    ///
    /// ```text
    /// root_dir/
    /// ├── J wave/
    /// │   ├── 0001.png
    /// │   └── 0002.png
    /// └── normal/
    ///     └── ...
    /// ```
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading image folder from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(Error::PathNotFound(root_dir));
        }

        let mut classes: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name().into_string().map_err(|name| {
                    Error::Dataset(format!(
                        "class folder name {:?} in {:?} is not valid UTF-8",
                        name, root_dir
                    ))
                })?;
                classes.push(name);
            }
        }
        classes.sort();

        if classes.is_empty() {
            return Err(Error::Dataset(format!(
                "no class folders found in {:?}",
                root_dir
            )));
        }

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let mut paths: Vec<PathBuf> = WalkDir::new(root_dir.join(class_name))
                .min_depth(1)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_image_file(p))
                .collect();
            paths.sort();

            if paths.is_empty() {
                return Err(Error::Dataset(format!(
                    "class folder '{}' in {:?} contains no images",
                    class_name, root_dir
                )));
            }

            debug!("Class '{}' (label {}): {} samples", class_name, label, paths.len());
            samples.extend(paths.into_iter().map(|path| ImageSample { path, label }));
        }

        info!(
            "Found {} samples in {} classes",
            samples.len(),
            classes.len()
        );

        Ok(Self {
            root_dir,
            classes,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Per-class sample counts
    pub fn stats(&self) -> DatasetStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            class_names: self.classes.clone(),
            class_counts,
        }
    }
}

/// Statistics about one split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_names: Vec<String>,
    pub class_counts: Vec<usize>,
}

impl DatasetStats {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Print statistics to console
    pub fn print(&self) {
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes());

        for (idx, (name, count)) in self
            .class_names
            .iter()
            .zip(self.class_counts.iter())
            .enumerate()
        {
            let bar_len =
                (*count as f32 / self.total_samples.max(1) as f32 * 40.0) as usize;
            println!("    {:3}. {:30} {:6} {}", idx, name, count, "█".repeat(bar_len));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    /// Write `counts[i]` small PNGs into `root/<classes[i]>/`
    pub(crate) fn write_image_folder(root: &Path, classes: &[&str], counts: &[usize]) {
        for (label, (class, &count)) in classes.iter().zip(counts).enumerate() {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..count {
                let shade = (label * 120 + i * 10) as u8;
                let img = ImageBuffer::from_pixel(12, 10, Rgb([shade, 255 - shade, shade / 2]));
                img.save(dir.join(format!("img_{:03}.png", i))).unwrap();
            }
        }
    }

    #[test]
    fn test_scan_sorts_classes_and_samples() {
        let tmp = TempDir::new().unwrap();
        write_image_folder(tmp.path(), &["normal", "J wave"], &[3, 2]);
        std::fs::write(tmp.path().join("normal").join("notes.txt"), "skip me").unwrap();

        let folder = ImageFolder::new(tmp.path()).unwrap();

        assert_eq!(folder.classes, vec!["J wave", "normal"]);
        assert_eq!(folder.len(), 5);
        assert_eq!(folder.samples[0].label, 0);
        assert_eq!(folder.samples[4].label, 1);
        assert!(folder.samples[2].path.ends_with("normal/img_000.png"));

        let stats = folder.stats();
        assert_eq!(stats.class_counts, vec![2, 3]);
        assert_eq!(stats.total_samples, 5);
    }

    #[test]
    fn test_missing_root() {
        let err = ImageFolder::new("/nonexistent/train_data").unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }

    #[test]
    fn test_root_without_classes() {
        let tmp = TempDir::new().unwrap();
        let err = ImageFolder::new(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Dataset(_)));
    }

    #[test]
    fn test_empty_class_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_image_folder(tmp.path(), &["J wave"], &[2]);
        std::fs::create_dir_all(tmp.path().join("normal")).unwrap();

        let err = ImageFolder::new(tmp.path()).unwrap_err();
        assert!(format!("{}", err).contains("normal"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_class_name_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        write_image_folder(tmp.path(), &["J wave", "normal"], &[1, 1]);
        let bad = tmp.path().join(OsStr::from_bytes(b"ab\xffcd"));
        if std::fs::create_dir(&bad).is_err() {
            // filesystem refuses non-UTF-8 names
            return;
        }

        let err = ImageFolder::new(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Dataset(_)));
        assert!(format!("{}", err).contains("UTF-8"));
    }
}
