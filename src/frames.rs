//! Finding the frames to encode
//!
//! A frame sequence is every `*.png` file directly inside a folder, sorted by file name.

use crate::error::CatResult;
use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// How file names are ordered
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Byte-wise comparison of file names, so `frame10.png` comes before `frame2.png`
    #[default]
    Lexicographic,
    /// Runs of digits compare as numbers, so `frame2.png` comes before `frame10.png`
    Natural,
}

impl SortOrder {
    fn compare(self, a: &OsStr, b: &OsStr) -> Ordering {
        match self {
            Self::Lexicographic => a.cmp(b),
            Self::Natural => natord::compare(&a.to_string_lossy(), &b.to_string_lossy())
                .then_with(|| a.cmp(b)),
        }
    }
}

/// Ordered list of PNG files found in a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSequence {
    paths: Vec<PathBuf>,
}

impl FrameSequence {
    /// Lists `folder` (not recursively) and keeps regular files matching `*.png`.
    ///
    /// Like shell globbing, the match is case-sensitive and skips names starting with a dot.
    pub fn scan(folder: &Path, order: SortOrder) -> CatResult<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(folder)? {
            let entry = entry?;
            let name = entry.file_name();
            if !is_png_name(&name) {
                continue;
            }
            let path = entry.path();
            // follows symlinks
            if !path.is_file() {
                continue;
            }
            paths.push(path);
        }
        Ok(Self::from_paths(paths, order))
    }

    /// Sorts the given paths by their file names
    pub fn from_paths(mut paths: Vec<PathBuf>, order: SortOrder) -> Self {
        paths.sort_by(|a, b| {
            let a = a.file_name().unwrap_or(a.as_os_str());
            let b = b.file_name().unwrap_or(b.as_os_str());
            order.compare(a, b)
        });
        Self { paths }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.paths.iter()
    }

    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&Path> {
        self.paths.first().map(|p| p.as_path())
    }
}

impl<'a> IntoIterator for &'a FrameSequence {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

fn is_png_name(name: &OsStr) -> bool {
    let name = name.as_encoded_bytes();
    name.len() > 4 && name[0] != b'.' && name.ends_with(b".png")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(seq: &FrameSequence) -> Vec<String> {
        seq.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn lexicographic_order() {
        let seq = FrameSequence::from_paths(vec!["x/frame10.png".into(), "x/frame2.png".into(), "x/frame1.png".into()], SortOrder::Lexicographic);
        assert_eq!(names(&seq), ["frame1.png", "frame10.png", "frame2.png"]);
    }

    #[test]
    fn natural_order() {
        let seq = FrameSequence::from_paths(vec!["x/frame10.png".into(), "x/frame2.png".into(), "x/frame1.png".into()], SortOrder::Natural);
        assert_eq!(names(&seq), ["frame1.png", "frame2.png", "frame10.png"]);
    }

    #[test]
    fn sorts_by_file_name_not_directory() {
        let seq = FrameSequence::from_paths(vec!["b/a.png".into(), "a/b.png".into()], SortOrder::Lexicographic);
        assert_eq!(seq.first(), Some(Path::new("b/a.png")));
    }

    #[test]
    fn png_name_matching() {
        assert!(is_png_name(OsStr::new("a.png")));
        assert!(is_png_name(OsStr::new("a b.c.png")));
        assert!(!is_png_name(OsStr::new("a.PNG")));
        assert!(!is_png_name(OsStr::new(".hidden.png")));
        assert!(!is_png_name(OsStr::new("a.png.txt")));
        assert!(!is_png_name(OsStr::new("apng")));
    }
}
