// Copyright 2023 Remi Bernotavicius

use crate::error::{AppError, AppResult};
use base64::Engine as _;
use image::ImageFormat;
use std::path::Path;

pub const MEDIA_URL: &str = "/media/";
const IMAGE_DIR: &str = "recipes/images";
const ACCEPTED: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

#[derive(Debug)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

/// Accepts `data:image/<type>;base64,<payload>` or a bare base64 payload. The
/// declared type is ignored; the format is sniffed from the bytes.
pub fn decode_inline(value: &str) -> AppResult<DecodedImage> {
    let value = value.trim();
    let payload = match value.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| AppError::invalid("image", "malformed data URI"))?;
            if !header.ends_with(";base64") {
                return Err(AppError::invalid("image", "data URI must be base64 encoded"));
            }
            data
        }
        None => value,
    };
    if payload.is_empty() {
        return Err(AppError::invalid("image", "no image data was submitted"));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| AppError::invalid("image", format!("invalid base64: {e}")))?;
    let format = image::guess_format(&bytes)
        .ok()
        .filter(|f| ACCEPTED.contains(f))
        .ok_or_else(|| AppError::invalid("image", "upload a PNG, JPEG, GIF or WebP image"))?;

    Ok(DecodedImage { format, bytes })
}

/// Writes the image under `media_root` and returns its path relative to it.
pub fn store(media_root: &Path, image: &DecodedImage) -> AppResult<String> {
    let extension = image.format.extensions_str().first().copied().unwrap_or("img");
    let relative = format!("{IMAGE_DIR}/{}.{extension}", uuid::Uuid::new_v4().simple());

    let absolute = media_root.join(&relative);
    if let Some(parent) = absolute.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&absolute, &image.bytes)?;
    log::debug!("stored image {}", absolute.display());
    Ok(relative)
}

pub fn remove(media_root: &Path, relative: &str) {
    let absolute = media_root.join(relative);
    if let Err(e) = std::fs::remove_file(&absolute) {
        log::warn!("failed to remove image {}: {e}", absolute.display());
    }
}

pub fn url(relative: &str) -> String {
    format!("{MEDIA_URL}{relative}")
}

#[cfg(test)]
pub const TINY_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

#[cfg(test)]
pub fn temp_media_root() -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("foodgram-media-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&path).unwrap();
    path
}

#[test]
fn decode_data_uri_and_bare_payload() {
    let image = decode_inline(TINY_PNG).unwrap();
    assert_eq!(image.format, ImageFormat::Png);

    let bare = TINY_PNG.split_once(',').unwrap().1;
    assert_eq!(decode_inline(bare).unwrap().bytes, image.bytes);
}

#[test]
fn decode_rejects_garbage() {
    for bad in [
        "",
        "data:image/png;base64,",
        "data:image/png,iVBORw0KGgo=",
        "data:image/png;base64,!!!",
        // valid base64, but plain text
        "data:image/png;base64,aGVsbG8gd29ybGQ=",
    ] {
        assert!(
            matches!(decode_inline(bad), Err(AppError::Validation(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn store_and_remove() {
    let root = temp_media_root();
    let image = decode_inline(TINY_PNG).unwrap();

    let relative = store(&root, &image).unwrap();
    assert!(relative.starts_with("recipes/images/"));
    assert!(relative.ends_with(".png"));
    assert_eq!(std::fs::read(root.join(&relative)).unwrap(), image.bytes);
    assert_eq!(url(&relative), format!("/media/{relative}"));

    remove(&root, &relative);
    assert!(!root.join(&relative).exists());
    std::fs::remove_dir_all(root).unwrap();
}
