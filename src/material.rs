//! What a caller brings: the source material and the target class/subject/chapter.
//!
//! [`SourceMaterial`] is validated once, at construction: every file exists,
//! is readable, non-empty, within its size cap and of a supported kind, and
//! documents and images are never mixed. Everything downstream can take
//! those facts for granted.
//!
//! URL inputs are downloaded into a [`TempDir`] that the material keeps alive
//! (shared through an `Arc`) until the last clone is dropped, so pdfium and
//! the image decoder always see an ordinary path.

use crate::error::StudyKitError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// PDF size cap in megabytes.
pub const MAX_PDF_MB: u64 = 100;
/// Per-image size cap in megabytes.
pub const MAX_IMAGE_MB: u64 = 50;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

/// The class/grade, subject and chapter a request targets.
///
/// Passed unchanged through every stage and echoed into the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMetadata {
    pub standard: String,
    pub subject: String,
    pub chapter: String,
}

impl TargetMetadata {
    /// Build from raw strings, trimming surrounding whitespace.
    pub fn new(
        standard: impl Into<String>,
        subject: impl Into<String>,
        chapter: impl Into<String>,
    ) -> Self {
        Self {
            standard: standard.into().trim().to_string(),
            subject: subject.into().trim().to_string(),
            chapter: chapter.into().trim().to_string(),
        }
    }

    /// Reject empty fields and standards that name no level.
    ///
    /// The standard must mention "class", "grade" or "standard"
    /// (e.g. `"Class 5"`, `"Grade 3"`), case-insensitively.
    pub fn validate(&self) -> Result<(), StudyKitError> {
        for (name, value) in [
            ("standard", &self.standard),
            ("subject", &self.subject),
            ("chapter", &self.chapter),
        ] {
            if value.is_empty() {
                return Err(StudyKitError::InvalidTarget(format!("{name} is required")));
            }
        }
        let lower = self.standard.to_lowercase();
        if !["class", "grade", "standard"].iter().any(|k| lower.contains(k)) {
            return Err(StudyKitError::InvalidTarget(format!(
                "standard '{}' should name a level, e.g. 'Class 5' or 'Grade 3'",
                self.standard
            )));
        }
        Ok(())
    }
}

/// One validated file on disk.
///
/// Cheap to clone; a downloaded file's temp directory lives until the last
/// clone is gone.
#[derive(Debug, Clone)]
pub struct InputFile {
    path: PathBuf,
    _download: Option<Arc<TempDir>>,
}

impl InputFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Either one PDF or an ordered list of images. Never both.
#[derive(Debug, Clone)]
pub enum SourceMaterial {
    Document(InputFile),
    Images(Vec<InputFile>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Pdf,
    Image,
}

impl SourceMaterial {
    /// A local PDF.
    pub fn document(path: impl AsRef<Path>) -> Result<Self, StudyKitError> {
        let path = path.as_ref().to_path_buf();
        check_file(&path, FileKind::Pdf)?;
        Ok(SourceMaterial::Document(InputFile {
            path,
            _download: None,
        }))
    }

    /// Local images, in reading order.
    pub fn images<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self, StudyKitError> {
        let files = paths
            .into_iter()
            .map(|p| {
                let path = p.as_ref().to_path_buf();
                check_file(&path, FileKind::Image)?;
                Ok(InputFile {
                    path,
                    _download: None,
                })
            })
            .collect::<Result<Vec<_>, StudyKitError>>()?;
        if files.is_empty() {
            return Err(StudyKitError::NoSources);
        }
        Ok(SourceMaterial::Images(files))
    }

    /// Resolve local paths and HTTP(S) URLs into material, classifying each.
    ///
    /// A single PDF becomes [`SourceMaterial::Document`]; one or more images
    /// become [`SourceMaterial::Images`]. Anything else is rejected.
    pub async fn resolve<S: AsRef<str>>(
        inputs: &[S],
        download_timeout_secs: u64,
    ) -> Result<Self, StudyKitError> {
        if inputs.is_empty() {
            return Err(StudyKitError::NoSources);
        }

        let mut files = Vec::with_capacity(inputs.len());
        for input in inputs {
            let input = input.as_ref().trim();
            let file = if is_url(input) {
                download_url(input, download_timeout_secs).await?
            } else {
                InputFile {
                    path: PathBuf::from(input),
                    _download: None,
                }
            };
            let kind = classify(&file.path)?;
            check_file(&file.path, kind)?;
            files.push((kind, file));
        }

        let pdfs = files.iter().filter(|(k, _)| *k == FileKind::Pdf).count();
        let images = files.len() - pdfs;
        match (pdfs, images) {
            (1, 0) => {
                let (_, file) = files.remove(0);
                Ok(SourceMaterial::Document(file))
            }
            (0, _) => Ok(SourceMaterial::Images(
                files.into_iter().map(|(_, f)| f).collect(),
            )),
            _ => Err(StudyKitError::MixedSources {
                detail: format!(
                    "{pdfs} PDF(s) and {images} image(s); send one PDF or only images"
                ),
            }),
        }
    }

    /// `"pdf"` or `"images"`.
    pub fn content_type(&self) -> &'static str {
        match self {
            SourceMaterial::Document(_) => "pdf",
            SourceMaterial::Images(_) => "images",
        }
    }

    pub fn files_processed(&self) -> usize {
        match self {
            SourceMaterial::Document(_) => 1,
            SourceMaterial::Images(files) => files.len(),
        }
    }

    pub fn is_images(&self) -> bool {
        matches!(self, SourceMaterial::Images(_))
    }

    pub fn paths(&self) -> Vec<&Path> {
        match self {
            SourceMaterial::Document(f) => vec![f.path()],
            SourceMaterial::Images(files) => files.iter().map(InputFile::path).collect(),
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn classify(path: &Path) -> Result<FileKind, StudyKitError> {
    match extension(path).as_deref() {
        Some("pdf") => Ok(FileKind::Pdf),
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Ok(FileKind::Image),
        _ => Err(StudyKitError::UnsupportedFile {
            path: path.to_path_buf(),
        }),
    }
}

/// Existence, permission, emptiness, size cap, and kind-specific checks.
fn check_file(path: &Path, kind: FileKind) -> Result<(), StudyKitError> {
    if !path.exists() {
        return Err(StudyKitError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    if kind == FileKind::Image && classify(path)? != FileKind::Image {
        return Err(StudyKitError::UnsupportedFile {
            path: path.to_path_buf(),
        });
    }

    let size = std::fs::metadata(path)
        .map_err(|e| map_open_error(path, e))?
        .len();
    if size == 0 {
        return Err(StudyKitError::EmptyFile {
            path: path.to_path_buf(),
        });
    }
    let limit_mb = match kind {
        FileKind::Pdf => MAX_PDF_MB,
        FileKind::Image => MAX_IMAGE_MB,
    };
    if size > limit_mb * 1024 * 1024 {
        return Err(StudyKitError::FileTooLarge {
            path: path.to_path_buf(),
            size_mb: size as f64 / (1024.0 * 1024.0),
            limit_mb,
        });
    }

    let mut f = std::fs::File::open(path).map_err(|e| map_open_error(path, e))?;
    if kind == FileKind::Pdf {
        use std::io::Read;
        let mut magic = [0u8; 4];
        if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
            return Err(StudyKitError::NotAPdf {
                path: path.to_path_buf(),
                magic,
            });
        }
    }

    debug!("Accepted {:?} source: {}", kind, path.display());
    Ok(())
}

fn map_open_error(path: &Path, e: std::io::Error) -> StudyKitError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        StudyKitError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        StudyKitError::FileNotFound {
            path: path.to_path_buf(),
        }
    }
}

/// Download a URL into a fresh temp directory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<InputFile, StudyKitError> {
    info!("Downloading source from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StudyKitError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            StudyKitError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            StudyKitError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(StudyKitError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = filename_for(url, content_type.as_deref());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| StudyKitError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let temp_dir = TempDir::new().map_err(|e| StudyKitError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| StudyKitError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(InputFile {
        path: file_path,
        _download: Some(Arc::new(temp_dir)),
    })
}

/// Pick a file name whose extension matches what was downloaded.
fn filename_for(url: &str, content_type: Option<&str>) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && classify(Path::new(last)).is_ok() {
                    return last.to_string();
                }
            }
        }
    }

    let ext = match content_type.map(|c| c.split(';').next().unwrap_or(c).trim()) {
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        Some("image/bmp") => "bmp",
        Some("image/tiff") => "tiff",
        _ => "pdf",
    };
    format!("downloaded.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.path().join(name);
        let mut f = std::fs::File::create(&p).unwrap();
        f.write_all(bytes).unwrap();
        p
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn document_requires_pdf_magic() {
        let dir = TempDir::new().unwrap();
        let good = write_temp(&dir, "a.pdf", b"%PDF-1.7\n...");
        let bad = write_temp(&dir, "b.pdf", b"hello world");
        assert!(SourceMaterial::document(&good).is_ok());
        assert!(matches!(
            SourceMaterial::document(&bad),
            Err(StudyKitError::NotAPdf { .. })
        ));
    }

    #[test]
    fn missing_and_empty_files_rejected() {
        let dir = TempDir::new().unwrap();
        let empty = write_temp(&dir, "empty.png", b"");
        assert!(matches!(
            SourceMaterial::images([dir.path().join("nope.png")]),
            Err(StudyKitError::FileNotFound { .. })
        ));
        assert!(matches!(
            SourceMaterial::images([&empty]),
            Err(StudyKitError::EmptyFile { .. })
        ));
    }

    #[test]
    fn images_reject_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let gif = write_temp(&dir, "anim.gif", b"GIF89a");
        assert!(matches!(
            SourceMaterial::images([&gif]),
            Err(StudyKitError::UnsupportedFile { .. })
        ));
    }

    #[test]
    fn empty_image_list_rejected() {
        let none: [&Path; 0] = [];
        assert!(matches!(
            SourceMaterial::images(none),
            Err(StudyKitError::NoSources)
        ));
    }

    #[test]
    fn resolve_classifies_and_rejects_mixing() {
        let dir = TempDir::new().unwrap();
        let pdf = write_temp(&dir, "ch1.pdf", b"%PDF-1.4 body");
        let png = write_temp(&dir, "p1.png", b"\x89PNG....");
        let jpg = write_temp(&dir, "p2.JPG", b"\xFF\xD8\xFF....");

        let pdf_s = pdf.to_string_lossy().to_string();
        let png_s = png.to_string_lossy().to_string();
        let jpg_s = jpg.to_string_lossy().to_string();

        let doc = tokio_test::block_on(SourceMaterial::resolve(&[pdf_s.clone()], 5)).unwrap();
        assert_eq!(doc.content_type(), "pdf");
        assert_eq!(doc.files_processed(), 1);

        let imgs =
            tokio_test::block_on(SourceMaterial::resolve(&[png_s.clone(), jpg_s], 5)).unwrap();
        assert_eq!(imgs.content_type(), "images");
        assert_eq!(imgs.files_processed(), 2);
        assert!(imgs.is_images());

        let mixed = tokio_test::block_on(SourceMaterial::resolve(&[pdf_s.clone(), png_s], 5));
        assert!(matches!(mixed, Err(StudyKitError::MixedSources { .. })));

        let two_pdfs = tokio_test::block_on(SourceMaterial::resolve(&[pdf_s.clone(), pdf_s], 5));
        assert!(matches!(two_pdfs, Err(StudyKitError::MixedSources { .. })));
    }

    #[test]
    fn target_validation() {
        assert!(TargetMetadata::new("Class 5", "Science", "Plants").validate().is_ok());
        assert!(TargetMetadata::new("grade 3", "Maths", "Fractions").validate().is_ok());
        assert!(TargetMetadata::new("  ", "Maths", "Fractions").validate().is_err());
        assert!(TargetMetadata::new("Class 5", "", "Fractions").validate().is_err());
        let err = TargetMetadata::new("Fifth", "Maths", "Fractions")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("should name a level"));
    }

    #[test]
    fn filename_prefers_url_then_content_type() {
        assert_eq!(filename_for("https://x.org/a/notes.pdf", None), "notes.pdf");
        assert_eq!(
            filename_for("https://x.org/img?id=3", Some("image/png; charset=binary")),
            "downloaded.png"
        );
        assert_eq!(filename_for("https://x.org/get", None), "downloaded.pdf");
    }
}
