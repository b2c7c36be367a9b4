//! The shelf: ordered set of ingested files shown to the model on every turn.

use gemdesk_types::{Category, FileRef, UploadedFile};
use thiserror::Error;

pub const DEFAULT_MAX_FILES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShelfError {
    #[error("Maximum {max} files")]
    Full { max: usize },
    #[error("No file at position {index} (shelf holds {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered URIs a cache was built from.
///
/// Two shelves with the same files in the same order produce equal
/// fingerprints; any add or remove changes it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShelfFingerprint(Vec<String>);

impl ShelfFingerprint {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Files in one category group, with their shelf positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfGroup<'a> {
    pub category: Category,
    pub entries: Vec<(usize, &'a UploadedFile)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shelf {
    files: Vec<UploadedFile>,
    max_files: usize,
}

impl Default for Shelf {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILES)
    }
}

impl Shelf {
    #[must_use]
    pub fn new(max_files: usize) -> Self {
        Self {
            files: Vec::new(),
            max_files,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn max_files(&self) -> usize {
        self.max_files
    }

    #[must_use]
    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&UploadedFile> {
        self.files.get(index)
    }

    /// Whether `incoming` more files fit. Checked before uploading, since an
    /// upload cannot be taken back.
    pub fn check_capacity(&self, incoming: usize) -> Result<(), ShelfError> {
        if self.files.len().saturating_add(incoming) > self.max_files {
            return Err(ShelfError::Full {
                max: self.max_files,
            });
        }
        Ok(())
    }

    pub fn add(&mut self, file: UploadedFile) -> Result<(), ShelfError> {
        self.check_capacity(1)?;
        self.files.push(file);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<UploadedFile, ShelfError> {
        if index >= self.files.len() {
            return Err(ShelfError::IndexOutOfRange {
                index,
                len: self.files.len(),
            });
        }
        Ok(self.files.remove(index))
    }

    /// Non-empty category groups in display order. Within a group, shelf order.
    #[must_use]
    pub fn grouped(&self) -> Vec<ShelfGroup<'_>> {
        Category::ORDER
            .into_iter()
            .filter_map(|category| {
                let entries: Vec<_> = self
                    .files
                    .iter()
                    .enumerate()
                    .filter(|(_, file)| file.category() == category)
                    .collect();
                (!entries.is_empty()).then_some(ShelfGroup { category, entries })
            })
            .collect()
    }

    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.files.iter().map(UploadedFile::token_count).sum()
    }

    #[must_use]
    pub fn file_refs(&self) -> Vec<FileRef> {
        self.files.iter().map(UploadedFile::file_ref).collect()
    }

    #[must_use]
    pub fn fingerprint(&self) -> ShelfFingerprint {
        ShelfFingerprint(
            self.files
                .iter()
                .map(|f| f.remote_uri().to_string())
                .collect(),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use gemdesk_types::{FileState, RemoteFile};

    pub(crate) fn uploaded(display_name: &str, mime_type: &str, tokens: u64) -> UploadedFile {
        let remote = RemoteFile {
            name: format!("files/{display_name}"),
            uri: format!("https://fake.test/files/{display_name}"),
            mime_type: mime_type.to_string(),
            state: FileState::Active,
        };
        UploadedFile::new(display_name, &remote, tokens, None)
    }

    #[test]
    fn add_beyond_max_leaves_shelf_unchanged() {
        let mut shelf = Shelf::new(2);
        shelf.add(uploaded("a.pdf", "application/pdf", 1)).unwrap();
        shelf.add(uploaded("b.pdf", "application/pdf", 1)).unwrap();
        let before = shelf.clone();

        let err = shelf.add(uploaded("c.pdf", "application/pdf", 1)).unwrap_err();
        assert_eq!(err, ShelfError::Full { max: 2 });
        assert_eq!(err.to_string(), "Maximum 2 files");
        assert_eq!(shelf, before);
    }

    #[test]
    fn check_capacity_counts_incoming_batch() {
        let mut shelf = Shelf::new(3);
        shelf.add(uploaded("a.txt", "text/plain", 1)).unwrap();
        assert!(shelf.check_capacity(2).is_ok());
        assert!(shelf.check_capacity(3).is_err());
    }

    #[test]
    fn remove_returns_file_and_rejects_bad_index() {
        let mut shelf = Shelf::default();
        shelf.add(uploaded("a.txt", "text/plain", 5)).unwrap();
        shelf.add(uploaded("b.png", "image/png", 7)).unwrap();

        let removed = shelf.remove(0).unwrap();
        assert_eq!(removed.display_name(), "a.txt");
        assert_eq!(shelf.len(), 1);
        assert_eq!(
            shelf.remove(4),
            Err(ShelfError::IndexOutOfRange { index: 4, len: 1 })
        );
    }

    #[test]
    fn duplicates_are_allowed() {
        let mut shelf = Shelf::default();
        shelf.add(uploaded("a.txt", "text/plain", 5)).unwrap();
        shelf.add(uploaded("a.txt", "text/plain", 5)).unwrap();
        assert_eq!(shelf.len(), 2);
        assert_eq!(shelf.total_tokens(), 10);
    }

    #[test]
    fn grouped_follows_category_order_with_shelf_indices() {
        let mut shelf = Shelf::default();
        shelf.add(uploaded("clip.mp4", "video/mp4", 1)).unwrap();
        shelf.add(uploaded("notes.pdf", "application/pdf", 1)).unwrap();
        shelf.add(uploaded("🔗 https://example.com/...", "text/plain", 1)).unwrap();
        shelf.add(uploaded("deck.pptx", "text/plain", 1)).unwrap();

        let groups = shelf.grouped();
        let categories: Vec<_> = groups.iter().map(|g| g.category).collect();
        assert_eq!(
            categories,
            vec![Category::Documents, Category::Videos, Category::Links]
        );
        let documents: Vec<_> = groups[0].entries.iter().map(|(i, _)| *i).collect();
        assert_eq!(documents, vec![1, 3]);
    }

    #[test]
    fn fingerprint_tracks_order_and_membership() {
        let mut shelf = Shelf::default();
        assert!(shelf.fingerprint().is_empty());
        shelf.add(uploaded("a.txt", "text/plain", 1)).unwrap();
        let one = shelf.fingerprint();
        shelf.add(uploaded("b.txt", "text/plain", 1)).unwrap();
        assert_ne!(shelf.fingerprint(), one);
        shelf.remove(1).unwrap();
        assert_eq!(shelf.fingerprint(), one);
        assert_eq!(shelf.file_refs()[0].mime_type, "text/plain");
    }
}
