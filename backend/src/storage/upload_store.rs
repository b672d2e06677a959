use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MAX_FILENAME_LEN: usize = 255;
const DEFAULT_PUBLIC_PATH: &str = "/static/uploads";
const FALLBACK_STEM: &str = "upload";
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

/// Writes uploaded images into the publicly served uploads directory.
#[derive(Clone, Debug)]
pub struct UploadStore {
    uploads_dir: PathBuf,
    public_path: String,
    max_size: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unsupported file extension: {0}")]
    InvalidFormat(String),
    #[error("File too large: {size} bytes exceeds {max}")]
    FileTooLarge { size: usize, max: usize },
}

/// A file persisted by [`UploadStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub filename: String,
    pub path: PathBuf,
}

impl UploadStore {
    pub fn new(uploads_dir: PathBuf, max_size: usize) -> Self {
        Self {
            uploads_dir,
            public_path: DEFAULT_PUBLIC_PATH.to_string(),
            max_size,
        }
    }

    /// URL prefix the uploads directory is served under.
    pub fn with_public_path(mut self, public_path: impl Into<String>) -> Self {
        self.public_path = public_path.into();
        self
    }

    pub fn public_url(&self, filename: &str) -> String {
        format!(
            "{}/{}",
            self.public_path.trim_end_matches('/'),
            urlencoding::encode(filename)
        )
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn validate_image_size(&self, size: usize) -> Result<(), StorageError> {
        if size > self.max_size {
            return Err(StorageError::FileTooLarge {
                size,
                max: self.max_size,
            });
        }
        Ok(())
    }

    /// Writes `data` to a private temporary file next to its final location.
    ///
    /// Nothing is visible under the sanitized name until [`UploadStore::commit`].
    /// Dropping the returned handle uncommitted removes the temporary file.
    pub fn stage(&self, client_filename: &str, data: &[u8]) -> Result<StagedUpload, StorageError> {
        self.validate_image_size(data.len())?;
        let filename = sanitize_filename(client_filename);
        check_extension(&filename)?;

        fs::create_dir_all(&self.uploads_dir).map_err(|source| StorageError::Io {
            path: self.uploads_dir.clone(),
            source,
        })?;

        let tmp_path = self
            .uploads_dir
            .join(format!(".{}.{}.part", filename, Uuid::new_v4().simple()));
        let staged = StagedUpload {
            filename,
            tmp_path,
            committed: false,
        };
        write_file(&staged.tmp_path, data).map_err(|source| StorageError::Io {
            path: staged.tmp_path.clone(),
            source,
        })?;
        Ok(staged)
    }

    /// Renames a staged upload into place. Concurrent commits of one name
    /// leave exactly one complete file (the last rename wins).
    pub fn commit(&self, mut staged: StagedUpload) -> Result<StoredUpload, StorageError> {
        let path = self.uploads_dir.join(&staged.filename);
        fs::rename(&staged.tmp_path, &path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        staged.committed = true;

        log::debug!("Stored upload {}", path.display());
        Ok(StoredUpload {
            filename: std::mem::take(&mut staged.filename),
            path,
        })
    }
}

/// An upload written to disk but not yet published under its name.
#[derive(Debug)]
pub struct StagedUpload {
    filename: String,
    tmp_path: PathBuf,
    committed: bool,
}

impl StagedUpload {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn staging_path(&self) -> &Path {
        &self.tmp_path
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {}", self.tmp_path.display(), e);
            }
        }
    }
}

fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Reduces a client-supplied name to a single safe path component.
pub fn sanitize_filename(client_filename: &str) -> String {
    let base = client_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = cleaned.trim_start_matches('.');

    if name.is_empty() || name.chars().all(|c| c == '_') {
        return FALLBACK_STEM.to_string();
    }
    truncate_keeping_extension(name.to_string())
}

fn truncate_keeping_extension(name: String) -> String {
    if name.len() <= MAX_FILENAME_LEN {
        return name;
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if ext.len() < 16 => {
            let keep = MAX_FILENAME_LEN - ext.len() - 1;
            format!("{}.{}", &stem[..keep.min(stem.len())], ext)
        }
        _ => name[..MAX_FILENAME_LEN].to_string(),
    }
}

fn check_extension(filename: &str) -> Result<(), StorageError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(StorageError::InvalidFormat(filename.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn save(store: &UploadStore, name: &str, data: &[u8]) -> Result<StoredUpload, StorageError> {
        let staged = store.stage(name, data)?;
        store.commit(staged)
    }

    #[test]
    fn keeps_ordinary_names() {
        assert_eq!(sanitize_filename("millet_01.JPG"), "millet_01.JPG");
        assert_eq!(sanitize_filename("leaf-scan.v2.png"), "leaf-scan.v2.png");
    }

    #[test]
    fn strips_directories_and_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\farmer\\ear.png"), "ear.png");
        assert_eq!(sanitize_filename("/abs/path/ear.jpeg"), "ear.jpeg");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[test]
    fn replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("my photo (1).png"), "my_photo__1_.png");
        assert_eq!(sanitize_filename("बाजरा.jpg"), "_____.jpg");
    }

    #[test]
    fn hidden_and_empty_names_fall_back() {
        assert_eq!(sanitize_filename(".htaccess"), "htaccess");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("dir/"), "upload");
        assert_eq!(sanitize_filename("???"), "upload");
    }

    #[test]
    fn long_names_keep_their_extension() {
        let long = format!("{}.png", "a".repeat(400));
        let name = sanitize_filename(&long);
        assert_eq!(name.len(), MAX_FILENAME_LEN);
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn public_url_is_percent_encoded() {
        let store = UploadStore::new(PathBuf::from("static/uploads"), 1024);
        assert_eq!(store.public_url("ear.png"), "/static/uploads/ear.png");
        let store = store.with_public_path("/media/");
        assert_eq!(store.public_url("a b.png"), "/media/a%20b.png");
    }

    #[test]
    fn save_writes_under_uploads_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads"), 1024);

        let stored = save(&store, "../escape.png", b"pixels").unwrap();
        assert_eq!(stored.filename, "escape.png");
        assert_eq!(stored.path, dir.path().join("uploads").join("escape.png"));
        assert_eq!(fs::read(&stored.path).unwrap(), b"pixels");
        assert!(!dir.path().join("escape.png").exists());
    }

    #[test]
    fn save_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf(), 1024);
        save(&store, "a.png", b"one").unwrap();
        save(&store, "a.png", b"two").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["a.png".to_string()]);
        assert_eq!(fs::read(dir.path().join("a.png")).unwrap(), b"two");
    }

    #[test]
    fn rejects_oversized_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf(), 4);
        let err = save(&store, "big.png", b"12345").unwrap_err();
        assert!(matches!(err, StorageError::FileTooLarge { size: 5, max: 4 }));
        assert!(!dir.path().join("big.png").exists());
    }

    #[test]
    fn rejects_non_image_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf(), 1024);
        assert!(matches!(
            save(&store, "shell.php", b"<?php"),
            Err(StorageError::InvalidFormat(_))
        ));
        assert!(matches!(
            save(&store, "noext", b"data"),
            Err(StorageError::InvalidFormat(_))
        ));
        assert!(save(&store, "UPPER.JPEG", b"data").is_ok());
    }

    #[test]
    fn concurrent_same_name_saves_are_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(UploadStore::new(dir.path().to_path_buf(), 1 << 20));
        let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 64 * 1024]).collect();

        let handles: Vec<_> = payloads
            .iter()
            .cloned()
            .map(|payload| {
                let store = Arc::clone(&store);
                thread::spawn(move || save(&store, "same.png", &payload).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = fs::read(dir.path().join("same.png")).unwrap();
        assert!(payloads.contains(&stored));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn staged_upload_is_invisible_until_committed() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf(), 1024);
        save(&store, "ear.png", b"first").unwrap();

        let staged = store.stage("ear.png", b"second").unwrap();
        assert_eq!(staged.filename(), "ear.png");
        assert_eq!(fs::read(staged.staging_path()).unwrap(), b"second");
        assert_eq!(fs::read(dir.path().join("ear.png")).unwrap(), b"first");

        store.commit(staged).unwrap();
        assert_eq!(fs::read(dir.path().join("ear.png")).unwrap(), b"second");
    }

    #[test]
    fn dropping_a_staged_upload_keeps_the_published_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf(), 1024);
        save(&store, "ear.png", b"good").unwrap();

        let staged = store.stage("ear.png", b"junk").unwrap();
        let tmp = staged.staging_path().to_path_buf();
        drop(staged);

        assert!(!tmp.exists());
        assert_eq!(fs::read(dir.path().join("ear.png")).unwrap(), b"good");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
