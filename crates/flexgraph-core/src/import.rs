//! # Import
//!
//! Turns user files into Image content items.
//!
//! Decoding is split from registration: [`decode_file`] is pure and can run
//! as background work, [`ImportBatch::apply`] registers the results with a
//! session on the main loop. Files without an image extension are skipped;
//! a file that fails to decode is reported and the batch carries on.

use crate::session::Session;
use crate::{ContentId, FlexError};
use image::ImageFormat;
use std::path::{Path, PathBuf};

/// Suffix marking a nine-patch image.
pub const NINE_PATCH_SUFFIX: &str = ".9.png";

/// A decoded file, ready for [`Session::add_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub is_nine_patch: bool,
}

/// Whether `path` names a file the importer can decode. Formats the image
/// crate knows but was built without are not candidates.
#[must_use]
pub fn is_image_path(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok_and(|format| format.reading_enabled())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Decode in-memory file contents.
pub fn decode_bytes(name: &str, bytes: &[u8]) -> Result<DecodedImage, FlexError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| FlexError::DecodeError(e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        name: name.to_string(),
        width,
        height,
        rgba: rgba.into_raw(),
        is_nine_patch: name.to_lowercase().ends_with(NINE_PATCH_SUFFIX),
    })
}

/// Read and decode one file. `Ok(None)` means the file is not an image.
pub fn decode_file(path: &Path) -> Result<Option<DecodedImage>, FlexError> {
    if !is_image_path(path) {
        return Ok(None);
    }
    let bytes = std::fs::read(path).map_err(|e| FlexError::IoError(e.to_string()))?;
    decode_bytes(&display_name(path), &bytes).map(Some)
}

// =============================================================================
// BATCH
// =============================================================================

/// Per-file outcome of a decode pass.
#[derive(Debug, Default)]
pub struct ImportBatch {
    pub decoded: Vec<DecodedImage>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Result of registering a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: Vec<ContentId>,
    pub skipped: Vec<PathBuf>,
    /// `(file, reason)` for every file that could not be imported.
    pub failed: Vec<(String, String)>,
}

impl ImportBatch {
    /// Decode every path.
    pub fn decode<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut batch = Self::default();
        for path in paths {
            let path = path.as_ref();
            match decode_file(path) {
                Ok(Some(image)) => batch.decoded.push(image),
                Ok(None) => {
                    tracing::debug!(path = %path.display(), "Skipping non-image file");
                    batch.skipped.push(path.to_path_buf());
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Image decode failed");
                    batch.failed.push((path.to_path_buf(), e.to_string()));
                }
            }
        }
        batch
    }

    /// Register every decoded image with `session`.
    pub fn apply(self, session: &mut Session) -> ImportReport {
        let mut report = ImportReport {
            skipped: self.skipped,
            failed: self
                .failed
                .into_iter()
                .map(|(p, reason)| (display_name(&p), reason))
                .collect(),
            ..ImportReport::default()
        };
        for image in self.decoded {
            let name = image.name.clone();
            match session.add_image(
                &image.name,
                image.width,
                image.height,
                image.rgba,
                image.is_nine_patch,
            ) {
                Ok(id) => report.imported.push(id),
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "Image rejected");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        report
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HeadlessEngine;
    use image::{ImageBuffer, Rgba};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(w, h, Rgba([10, 20, 30, 255]));
        img.save(&path).expect("write png");
        path
    }

    #[test]
    fn extension_decides_candidates() {
        assert!(is_image_path(Path::new("a/b/photo.PNG")));
        assert!(is_image_path(Path::new("x.jpg")));
        assert!(!is_image_path(Path::new("notes.txt")));
        assert!(!is_image_path(Path::new("noext")));
    }

    #[test]
    fn formats_without_a_decoder_are_skipped() {
        assert!(!is_image_path(Path::new("anim.gif")));
        assert!(!is_image_path(Path::new("photo.webp")));

        let dir = TempDir::new().expect("tempdir");
        let gif = dir.path().join("anim.gif");
        std::fs::write(&gif, b"GIF89a").expect("write");
        let batch = ImportBatch::decode(std::slice::from_ref(&gif));
        assert!(batch.decoded.is_empty());
        assert!(batch.failed.is_empty());
        assert_eq!(batch.skipped, [gif]);
    }

    #[test]
    fn batch_skips_reports_and_continues() {
        let dir = TempDir::new().expect("tempdir");
        let good = write_png(dir.path(), "button.9.png", 3, 2);
        let text = dir.path().join("readme.txt");
        std::fs::write(&text, "hello").expect("write");
        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"not a png").expect("write");

        let batch = ImportBatch::decode(&[&text, &broken, &good]);
        assert_eq!(batch.skipped, [text]);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.decoded.len(), 1);
        assert!(batch.decoded[0].is_nine_patch);
        assert_eq!(batch.decoded[0].rgba.len(), 3 * 2 * 4);

        let mut session = Session::new(Box::new(HeadlessEngine::new()));
        let report = batch.apply(&mut session);
        assert_eq!(report.imported.len(), 1);
        assert_eq!(report.failed[0].0, "broken.png");
        let item = session.library().get(&report.imported[0]).expect("item");
        assert_eq!(item.name, "button.9.png");
        assert!(item.is_nine_patch);
        assert!(session.pending_requests().save);
    }

    #[test]
    fn decode_bytes_rejects_garbage() {
        assert!(matches!(
            decode_bytes("x.png", b"\x89PNG garbage"),
            Err(FlexError::DecodeError(_))
        ));
    }
}
