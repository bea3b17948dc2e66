use anyhow::{anyhow, Result};
use base64::Engine;
use image::DynamicImage;

/// Photos larger than this on either side are scaled down before use.
const MAX_SIDE: u32 = 2048;

/// Save a DynamicImage as a webp vector.
///
/// This is useful because the image crate only supports lossless webp,
/// but the webp crate supports lossy webp.
pub fn convert_to_webp(img: &DynamicImage, quality: f32) -> Result<Vec<u8>> {
    let img_webp = webp::Encoder::from_image(img)
        .map_err(|st| anyhow!("Webp encoder error: {}", st))?
        .encode(quality);
    Ok(img_webp.to_vec())
}

/// Decode an uploaded or captured photo, bound its size, and re-encode it as lossy WebP.
pub fn prepare_photo(bytes: &[u8]) -> Result<Vec<u8>> {
    anyhow::ensure!(bytes.len() < 20_000_000, "Image is too large");
    let mut img = image::load_from_memory(bytes)?;
    if (img.height() * img.width()) > 2 << 20 {
        tracing::warn!(
            "Image is probably larger than it needs to be. ({h}x{w}) Resizing.",
            h = img.height(),
            w = img.width()
        );
    }
    if img.width() > MAX_SIDE || img.height() > MAX_SIDE {
        img = img.resize(MAX_SIDE, MAX_SIDE, image::imageops::FilterType::Lanczos3);
    }
    // The webp encoder only takes 8-bit RGB(A).
    let img = DynamicImage::ImageRgba8(img.into_rgba8());
    convert_to_webp(&img, 75.0)
}

/// Convert a webp image to a data URL
pub fn to_data_url(bytes: &[u8]) -> String {
    format!(
        "data:image/webp;base64,{}",
        // For the purpose of data urls, you do NOT need to use the URL_SAFE variant
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
