//! Local file storage for clinic logos and attached documents.
//!
//! Files live under a root directory as `<entity_type>/<uuid>-<name>`; the
//! `documents` table keeps the metadata and the path relative to the root.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::db::{Database, DbError};
use crate::models::{new_id, now_rfc3339, Document};

/// Maximum stored file size (10MB)
const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Accepted logo formats
const LOGO_FORMATS: &[&str] = &["png", "jpg", "jpeg", "webp", "svg"];

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("Document not found: {0}")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Keep ASCII letters, digits, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

pub struct DocumentStorage<'a> {
    db: &'a Database,
    root: PathBuf,
}

impl<'a> DocumentStorage<'a> {
    pub fn new<P: AsRef<Path>>(db: &'a Database, root: P) -> Self {
        Self {
            db,
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a file and record it against an entity.
    pub fn store(
        &self,
        entity_type: &str,
        entity_id: Option<&str>,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> StorageResult<Document> {
        if bytes.is_empty() {
            return Err(StorageError::InvalidFile("File is empty".into()));
        }
        if bytes.len() > MAX_FILE_SIZE {
            return Err(StorageError::InvalidFile(format!(
                "File too large. Maximum size is {}MB",
                MAX_FILE_SIZE / 1024 / 1024
            )));
        }

        let folder = sanitize_file_name(entity_type);
        let id = new_id();
        let safe_name = sanitize_file_name(file_name);
        let relative = format!("{}/{}-{}", folder, id, safe_name);

        let path = self.root.join(&relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;

        let doc = Document {
            id,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(String::from),
            file_name: safe_name,
            storage_path: relative,
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as u64,
            uploaded_at: now_rfc3339(),
        };
        if let Err(e) = self.db.insert_document(&doc) {
            // Don't leave an orphan file behind
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        info!(
            document_id = %doc.id,
            entity_type,
            size = doc.size_bytes,
            "Stored document"
        );
        Ok(doc)
    }

    /// Contents of a stored document.
    pub fn read(&self, document: &Document) -> StorageResult<Vec<u8>> {
        let path = self.resolve(&document.storage_path)?;
        Ok(fs::read(path)?)
    }

    /// Remove a document's file and its record.
    pub fn delete(&self, document_id: &str) -> StorageResult<()> {
        let doc = self
            .db
            .get_document(document_id)?
            .ok_or_else(|| StorageError::NotFound(document_id.to_string()))?;

        let path = self.resolve(&doc.storage_path)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(document_id, path = %path.display(), "Document file already missing");
            }
            Err(e) => return Err(e.into()),
        }
        self.db.delete_document(&doc.id)?;

        info!(document_id, "Deleted document");
        Ok(())
    }

    /// Store the clinic logo and point the settings at it.
    pub fn store_logo(&self, bytes: &[u8], file_name: &str) -> StorageResult<Document> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !LOGO_FORMATS.contains(&ext.as_str()) {
            return Err(StorageError::InvalidFile(format!(
                "Unsupported logo format '{}'. Supported: {}",
                ext,
                LOGO_FORMATS.join(", ")
            )));
        }
        let content_type = match ext.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            _ => "image/svg+xml",
        };

        let doc = self.store("clinic", None, file_name, content_type, bytes)?;
        let mut settings = self.db.get_clinic_settings()?;
        settings.logo_path = Some(doc.storage_path.clone());
        settings.updated_at = now_rfc3339();
        self.db.save_clinic_settings(&settings)?;

        info!(path = %doc.storage_path, "Updated clinic logo");
        Ok(doc)
    }

    /// Absolute path of a stored relative path, refusing anything outside the root.
    fn resolve(&self, relative: &str) -> StorageResult<PathBuf> {
        let rel = Path::new(relative);
        if rel.is_absolute() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(StorageError::InvalidFile(format!("Invalid storage path: {}", relative)));
        }
        Ok(self.root.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("invoice 2025.pdf"), "invoice_2025.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\quote#1.pdf"), "quote_1.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn test_store_read_delete() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let storage = DocumentStorage::new(&db, dir.path());

        let doc = storage
            .store("purchase_order", Some("po-1"), "delivery note.pdf", "application/pdf", b"%PDF-1.4")
            .unwrap();
        assert!(doc.storage_path.starts_with("purchase_order/"));
        assert!(doc.storage_path.ends_with("-delivery_note.pdf"));
        assert_eq!(doc.size_bytes, 8);
        assert_eq!(storage.read(&doc).unwrap(), b"%PDF-1.4");

        let listed = db.list_documents("purchase_order", Some("po-1")).unwrap();
        assert_eq!(listed, vec![doc.clone()]);

        storage.delete(&doc.id).unwrap();
        assert!(db.get_document(&doc.id).unwrap().is_none());
        assert!(!dir.path().join(&doc.storage_path).exists());
        assert!(matches!(storage.delete(&doc.id), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_rejects_empty_and_traversal() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let storage = DocumentStorage::new(&db, dir.path());

        assert!(matches!(
            storage.store("clinic", None, "a.txt", "text/plain", b""),
            Err(StorageError::InvalidFile(_))
        ));

        let mut doc = storage.store("clinic", None, "a.txt", "text/plain", b"x").unwrap();
        doc.storage_path = "../outside.txt".into();
        assert!(matches!(storage.read(&doc), Err(StorageError::InvalidFile(_))));
    }

    #[test]
    fn test_store_logo() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let storage = DocumentStorage::new(&db, dir.path());

        let doc = storage.store_logo(b"\x89PNG", "Logo.PNG").unwrap();
        assert_eq!(doc.content_type, "image/png");
        assert_eq!(
            db.get_clinic_settings().unwrap().logo_path.as_deref(),
            Some(doc.storage_path.as_str())
        );

        assert!(matches!(
            storage.store_logo(b"data", "logo.exe"),
            Err(StorageError::InvalidFile(_))
        ));
    }
}
