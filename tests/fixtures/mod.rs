//! Image directories for orchestrator tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Smallest JPEG header the client needs; the mock service never decodes it.
const FAKE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

pub const CLASSES: &[&str] = &["person", "car", "dog"];

pub fn classes() -> Vec<String> {
    CLASSES.iter().map(|s| s.to_string()).collect()
}

/// A temporary directory of numbered images, `img000.jpg` onwards.
pub struct ImageDir {
    dir: TempDir,
}

impl ImageDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn images(&self, n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| {
                let path = self.dir.path().join(format!("img{i:03}.jpg"));
                std::fs::write(&path, FAKE_JPEG).unwrap();
                path
            })
            .collect()
    }

    pub fn missing(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn label_of(image: &Path) -> PathBuf {
    image.with_extension("txt")
}

pub fn read_label(image: &Path) -> Option<String> {
    std::fs::read_to_string(label_of(image)).ok()
}
