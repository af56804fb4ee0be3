//! Document source: the folder of identity and contract documents.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions picked up from the documents folder (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "jpg", "jpeg", "png", "txt"];

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to access documents folder {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How text is obtained from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
    Text,
}

impl DocumentKind {
    /// Dispatch by extension. Anything that is not a PDF or an image is read as text.
    pub fn from_path(path: &Path) -> Self {
        match extension_of(path).as_deref() {
            Some("pdf") => DocumentKind::Pdf,
            Some("jpg" | "jpeg" | "png") => DocumentKind::Image,
            _ => DocumentKind::Text,
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

pub fn is_supported(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// List supported documents in `folder`, sorted by path.
///
/// The folder is created when absent, so a fresh checkout yields an empty list.
pub fn list_documents(folder: impl AsRef<Path>) -> Result<Vec<PathBuf>, DocumentError> {
    let folder = folder.as_ref();
    let io_err = |source| DocumentError::Io {
        path: folder.to_path_buf(),
        source,
    };

    fs::create_dir_all(folder).map_err(io_err)?;

    let mut documents = Vec::new();
    for entry in fs::read_dir(folder).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && is_supported(&path) {
            documents.push(path);
        }
    }
    documents.sort();

    tracing::info!(
        folder = %folder.display(),
        count = documents.len(),
        "Listed documents"
    );
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_folder_yields_empty_list() {
        let dir = TempDir::new().unwrap();
        assert!(list_documents(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_folder_is_created() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("data");
        assert!(list_documents(&folder).unwrap().is_empty());
        assert!(folder.is_dir());
    }

    #[test]
    fn test_filters_by_extension_case_insensitively() {
        let dir = TempDir::new().unwrap();
        for name in ["b.PDF", "a.txt", "scan.Jpeg", "notes.md", "photo.png", "archive.zip"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let names: Vec<String> = list_documents(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.PDF", "photo.png", "scan.Jpeg"]);
    }

    #[test]
    fn test_kind_dispatch() {
        assert_eq!(DocumentKind::from_path(Path::new("x.PDF")), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_path(Path::new("x.jpg")), DocumentKind::Image);
        assert_eq!(DocumentKind::from_path(Path::new("x.txt")), DocumentKind::Text);
        assert_eq!(DocumentKind::from_path(Path::new("README")), DocumentKind::Text);
    }
}
