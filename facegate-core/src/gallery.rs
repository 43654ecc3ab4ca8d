use image::{ImageFormat, RgbImage};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("Gallery storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write reference image {path}: {reason}")]
    Write { path: PathBuf, reason: String },
    #[error("Please provide a username")]
    EmptyName,
    #[error("Invalid username {0:?}: names cannot contain path separators")]
    InvalidName(String),
}

/// One registered user: the name is the stored file's base name.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub name: String,
    pub image: RgbImage,
}

/// Directory of reference images, one `<name>.<ext>` file per user.
///
/// There is no index beyond the directory listing; the gallery is expected
/// to hold tens of entries.
#[derive(Debug, Clone)]
pub struct ReferenceGallery {
    dir: PathBuf,
    extension: String,
}

/// Trim a requested name and check it can be used as a file base name.
pub fn validate_name(raw: &str) -> Result<String, GalleryError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GalleryError::EmptyName);
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(GalleryError::InvalidName(name.to_string()));
    }
    Ok(name.to_string())
}

impl ReferenceGallery {
    pub fn new<P: AsRef<Path>>(dir: P, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, self.extension))
    }

    fn ensure_dir(&self) -> Result<(), GalleryError> {
        fs::create_dir_all(&self.dir).map_err(|source| GalleryError::StorageUnavailable {
            path: self.dir.clone(),
            source,
        })
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> Result<Vec<String>, GalleryError> {
        Ok(self
            .sorted_paths()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// `(name, path)` pairs for every file carrying the gallery extension.
    fn sorted_paths(&self) -> Result<Vec<(String, PathBuf)>, GalleryError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            // Nothing registered yet
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(GalleryError::StorageUnavailable {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut paths: Vec<(String, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| ext.eq_ignore_ascii_case(&self.extension))
            })
            .filter_map(|path| {
                let name = path.file_stem()?.to_str()?.to_string();
                Some((name, path))
            })
            .collect();

        paths.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(paths)
    }

    /// Lazily iterate the gallery in ascending name order.
    ///
    /// Images are decoded as the iterator advances. Files that fail to decode
    /// are skipped with a warning.
    pub fn list(&self) -> Result<GalleryIter, GalleryError> {
        let paths = self.sorted_paths()?;
        log::debug!(
            "Gallery {} has {} entries",
            self.dir.display(),
            paths.len()
        );
        Ok(GalleryIter {
            paths: paths.into_iter(),
        })
    }

    /// Store `image` as the reference for `name`, replacing any previous one.
    pub fn add(&self, name: &str, image: &RgbImage) -> Result<PathBuf, GalleryError> {
        let name = validate_name(name)?;
        self.ensure_dir()?;

        let path = self.entry_path(&name);
        let format = ImageFormat::from_extension(&self.extension).unwrap_or(ImageFormat::Jpeg);
        if path.exists() {
            log::info!("Replacing existing reference image for {}", name);
        }

        image
            .save_with_format(&path, format)
            .map_err(|e| match e {
                image::ImageError::IoError(source) => GalleryError::StorageUnavailable {
                    path: path.clone(),
                    source,
                },
                other => GalleryError::Write {
                    path: path.clone(),
                    reason: other.to_string(),
                },
            })?;

        log::info!("Registered {} at {}", name, path.display());
        Ok(path)
    }
}

/// Iterator returned by [`ReferenceGallery::list`].
pub struct GalleryIter {
    paths: std::vec::IntoIter<(String, PathBuf)>,
}

impl Iterator for GalleryIter {
    type Item = GalleryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        for (name, path) in self.paths.by_ref() {
            match image::open(&path) {
                Ok(img) => {
                    return Some(GalleryEntry {
                        name,
                        image: img.to_rgb8(),
                    })
                }
                Err(e) => {
                    log::warn!("Skipping unreadable reference image {}: {}", path.display(), e);
                }
            }
        }
        None
    }
}
