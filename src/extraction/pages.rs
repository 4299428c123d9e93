use std::path::{Path, PathBuf};

use super::traits::PageSource;
use super::types::PageImage;
use super::ExtractionError;

/// File extensions accepted as rendered pages.
const PAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Pages already rendered by the caller, in page order.
pub struct InMemoryPages {
    pages: Vec<Vec<u8>>,
}

impl InMemoryPages {
    pub fn new(pages: Vec<Vec<u8>>) -> Self {
        Self { pages }
    }
}

impl PageSource for InMemoryPages {
    fn load_pages(&self) -> Result<Vec<PageImage>, ExtractionError> {
        Ok(self
            .pages
            .iter()
            .enumerate()
            .map(|(i, bytes)| PageImage::new(i + 1, bytes.clone()))
            .collect())
    }

    fn describe(&self) -> String {
        format!("in-memory ({} pages)", self.pages.len())
    }
}

/// A directory of page images, one file per page, ordered by file name
/// (`page-001.png`, `page-002.png`, ...).
pub struct ImageDirectoryPages {
    dir: PathBuf,
}

impl ImageDirectoryPages {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn unreadable(&self, reason: impl std::fmt::Display) -> ExtractionError {
        ExtractionError::PageSourceUnreadable {
            source_name: self.dir.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn page_files(&self) -> Result<Vec<PathBuf>, ExtractionError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| self.unreadable(e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| self.unreadable(e))?.path();
            if path.is_file() && has_page_extension(&path) {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }
}

fn has_page_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| PAGE_EXTENSIONS.contains(&e.as_str()))
}

impl PageSource for ImageDirectoryPages {
    fn load_pages(&self) -> Result<Vec<PageImage>, ExtractionError> {
        let files = self.page_files()?;

        let mut pages = Vec::with_capacity(files.len());
        for (i, path) in files.iter().enumerate() {
            let page_number = i + 1;
            let bytes = std::fs::read(path)
                .map_err(|e| self.unreadable(format!("{}: {e}", path.display())))?;

            image::load_from_memory(&bytes).map_err(|e| ExtractionError::PageSourceDecode {
                page: page_number,
                reason: format!("{}: {e}", path.display()),
            })?;

            pages.push(PageImage::new(page_number, bytes));
        }

        tracing::debug!(dir = %self.dir.display(), pages = pages.len(), "Loaded page images");
        Ok(pages)
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}
