use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageResult, RgbImage};

/// JPEG-encode an RGB image at the given quality (1-100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let _span = tracing::debug_span!("encode_jpeg").entered();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(image)?;
    Ok(bytes)
}

/// Decode the encoded bytes of a still capture.
pub fn decode_still(bytes: &[u8]) -> ImageResult<DynamicImage> {
    image::load_from_memory(bytes)
}

/// Mirror horizontally, then rotate 90° clockwise.
///
/// Front-camera stills arrive mirrored and in sensor orientation.
pub fn mirror_and_rotate(image: &DynamicImage) -> DynamicImage {
    image.fliph().rotate90()
}
