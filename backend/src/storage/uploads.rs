use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// URL prefix under which the upload directory is served.
pub const PUBLIC_PREFIX: &str = "uploads";

const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp"];

const MAX_NAME_ATTEMPTS: u32 = 10_000;

#[derive(Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Unsupported file type '{0}'. Upload a DICOM (.dcm) or PNG/JPEG/BMP/GIF/TIFF/WebP image.")]
    UnsupportedType(String),
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },
    #[error("Upload storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Dicom,
    Raster,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn ensure_dir(&self) -> Result<(), UploadError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn validate_size(&self, size: usize) -> Result<(), UploadError> {
        if size > self.max_bytes {
            return Err(UploadError::FileTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Writes `data` under a fresh name derived from an already sanitized file name.
    ///
    /// Existing files are never replaced: `scan.png` is stored as `scan-1.png`,
    /// `scan-2.png` and so on once the plain name is taken.
    pub fn save(&self, file_name: &str, data: &[u8]) -> Result<PathBuf, UploadError> {
        self.validate_size(data.len())?;
        let (path, mut file) = self.create_unique(file_name)?;
        if let Err(e) = file.write_all(data) {
            discard(&[&path]);
            return Err(e.into());
        }
        log::info!("File saved to {}", path.display());
        Ok(path)
    }

    /// Claims an empty PNG next to a converted DICOM file, keeping its stem when free.
    pub fn reserve_png_sibling(&self, path: &Path) -> Result<PathBuf, UploadError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (png_path, _) = self.create_unique(&format!("{}.png", stem))?;
        Ok(png_path)
    }

    fn create_unique(&self, file_name: &str) -> Result<(PathBuf, File), UploadError> {
        let name = Path::new(file_name);
        let stem = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = name.extension().map(|e| e.to_string_lossy().into_owned());

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = match (attempt, &extension) {
                (0, _) => file_name.to_string(),
                (n, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
                (n, None) => format!("{}-{}", stem, n),
            };
            let path = self.dir.join(candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(UploadError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free upload name for {}", file_name),
        )))
    }

    /// Path relative to the static root, as shown to the browser and stored with feedback.
    pub fn public_path(path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", PUBLIC_PREFIX, name)
    }
}

/// Removes files written for an upload that did not produce a classification.
pub fn discard(paths: &[&Path]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => log::info!("Removed {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

pub fn upload_kind(file_name: &str) -> Result<UploadKind, UploadError> {
    let extension = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if extension == "dcm" {
        Ok(UploadKind::Dicom)
    } else if RASTER_EXTENSIONS.contains(&extension.as_str()) {
        Ok(UploadKind::Raster)
    } else {
        Err(UploadError::UnsupportedType(extension))
    }
}

/// Reduces a client-supplied file name to a flat ASCII name safe to join onto the upload directory.
///
/// Path separators become word breaks, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9_.-]` is dropped and leading/trailing dots and
/// underscores are stripped. Returns `None` when nothing usable remains.
pub fn secure_filename(name: &str) -> Option<String> {
    let spaced: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
