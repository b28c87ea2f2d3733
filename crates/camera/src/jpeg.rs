use anyhow::{bail, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

const SOI: [u8; 2] = [0xFF, 0xD8];
const COM: [u8; 2] = [0xFF, 0xFE];
/// Segment length field counts itself.
const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize - 2;

pub fn encode(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(image)?;
    Ok(out)
}

/// Inserts the tags, one per line, as COM segments right after SOI.
pub fn embed_tags(jpeg: &[u8], tags: &[String]) -> Result<Vec<u8>> {
    if !jpeg.starts_with(&SOI) {
        bail!("not a JPEG stream");
    }
    if tags.is_empty() {
        return Ok(jpeg.to_vec());
    }

    let text = tags.join("\n");
    let mut out = Vec::with_capacity(jpeg.len() + text.len() + 8);
    out.extend_from_slice(&SOI);
    for chunk in text.as_bytes().chunks(MAX_SEGMENT_PAYLOAD) {
        out.extend_from_slice(&COM);
        out.extend_from_slice(&((chunk.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(chunk);
    }
    out.extend_from_slice(&jpeg[SOI.len()..]);
    Ok(out)
}
