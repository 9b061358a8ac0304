//! Template image cache
//!
//! Templates are loaded from the assets directory on first use and kept as
//! grayscale images. Failed loads are not cached, so a file that appears
//! later is picked up on the next attempt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::GrayImage;

use super::VisionError;

/// Grayscale templates keyed by file name
#[derive(Debug, Default)]
pub struct TemplateCache {
    dir: PathBuf,
    images: HashMap<String, GrayImage>,
}

impl TemplateCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            images: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Point the cache at another directory, dropping entries loaded from disk
    pub fn set_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if dir != self.dir {
            self.images.clear();
            self.dir = dir;
        }
    }

    /// Get a template, loading it if needed
    pub fn get(&mut self, name: &str) -> Result<&GrayImage, VisionError> {
        if !self.images.contains_key(name) {
            let image = self.load(name)?;
            self.images.insert(name.to_string(), image);
        }
        self.images.get(name).ok_or_else(|| VisionError::TemplateLoad {
            name: name.to_string(),
            reason: "not cached".to_string(),
        })
    }

    /// Load a template without touching the cache
    pub fn load(&self, name: &str) -> Result<GrayImage, VisionError> {
        let path = self.dir.join(name);
        let image = image::open(&path).map_err(|e| VisionError::TemplateLoad {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        log::debug!("Loaded template {}", path.display());
        Ok(image.to_luma8())
    }

    /// Put an already decoded template in the cache
    pub fn insert(&mut self, name: impl Into<String>, image: GrayImage) {
        self.images.insert(name.into(), image);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_loads_from_disk_once() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(4, 3, Luma([200]))
            .save(dir.path().join("ok.png"))
            .unwrap();

        let mut cache = TemplateCache::new(dir.path());
        assert_eq!(cache.get("ok.png").unwrap().dimensions(), (4, 3));
        assert!(cache.contains("ok.png"));

        std::fs::remove_file(dir.path().join("ok.png")).unwrap();
        assert!(cache.get("ok.png").is_ok());
    }

    #[test]
    fn test_missing_file_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TemplateCache::new(dir.path());

        let err = cache.get("late.png").unwrap_err();
        assert!(matches!(err, VisionError::TemplateLoad { ref name, .. } if name == "late.png"));
        assert!(cache.is_empty());

        GrayImage::from_pixel(2, 2, Luma([1]))
            .save(dir.path().join("late.png"))
            .unwrap();
        assert!(cache.get("late.png").is_ok());
    }

    #[test]
    fn test_set_dir_clears_only_on_change() {
        let mut cache = TemplateCache::new("a");
        cache.insert("x.png", GrayImage::new(1, 1));

        cache.set_dir("a");
        assert_eq!(cache.len(), 1);

        cache.set_dir("b");
        assert!(cache.is_empty());
        assert_eq!(cache.dir(), Path::new("b"));
    }
}
