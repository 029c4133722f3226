//! Image preparation for the vision API: load, downscale, base64 PNG.
//!
//! PNG keeps rendered text crisp; JPEG artefacts around glyphs hurt
//! transcription. `detail: "high"` lets GPT-4-class models tile the image
//! instead of reading a single 512 px overview.

use crate::error::StudyKitError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Encode an image as a base64 PNG attachment.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Shrink `img` so its longest edge is at most `max_edge`, keeping aspect.
pub fn fit_within(img: DynamicImage, max_edge: u32) -> DynamicImage {
    let longest = img.width().max(img.height());
    if max_edge == 0 || longest <= max_edge {
        return img;
    }
    debug!(
        "Downscaling {}x{} to fit {} px",
        img.width(),
        img.height(),
        max_edge
    );
    img.resize(max_edge, max_edge, FilterType::Lanczos3)
}

/// Decode an uploaded photo and fit it within `max_edge`.
pub fn load_image(path: &Path, max_edge: u32) -> Result<DynamicImage, StudyKitError> {
    let img = image::open(path).map_err(|e| StudyKitError::ImageDecodeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(fit_within(img, max_edge))
}
