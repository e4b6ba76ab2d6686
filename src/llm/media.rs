use std::fmt;
use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Failed to read image file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Image file {0} is empty")]
    Empty(String),
    #[error("Not an image payload (detected mime: {0})")]
    NotAnImage(String),
    #[error("Malformed data URL")]
    MalformedDataUrl,
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Image conversion failed: {0}")]
    Convert(#[from] image::ImageError),
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn normalize_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

fn mime_for_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" | "heif" => Some("image/heic"),
        _ => None,
    }
}

/// Binary image payload together with its MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    bytes: Vec<u8>,
    mime_type: String,
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageData {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: normalize_mime_type(&mime_type.into()),
        }
    }

    /// Builds an image from raw bytes, sniffing the MIME type and falling back
    /// to JPEG when the content is unrecognised.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| "image/jpeg".to_string());
        Self::new(bytes, mime_type)
    }

    pub fn from_base64(data: &str, mime_type: &str) -> Result<Self, MediaError> {
        let bytes = general_purpose::STANDARD.decode(data.trim())?;
        Ok(Self::new(bytes, mime_type))
    }

    pub fn from_data_url(url: &str) -> Result<Self, MediaError> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or(MediaError::MalformedDataUrl)?;
        let (header, payload) = rest.split_once(',').ok_or(MediaError::MalformedDataUrl)?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or(MediaError::MalformedDataUrl)?;
        if !mime_type.starts_with("image/") {
            return Err(MediaError::NotAnImage(mime_type.to_string()));
        }
        Self::from_base64(payload, mime_type)
    }

    pub fn load(path: &Path) -> Result<Self, MediaError> {
        let bytes = std::fs::read(path).map_err(|source| MediaError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(MediaError::Empty(path.display().to_string()));
        }
        let mime_type = detect_mime_type(&bytes)
            .or_else(|| mime_for_extension(path).map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        if !mime_type.starts_with("image/") {
            return Err(MediaError::NotAnImage(mime_type));
        }
        Ok(Self::new(bytes, mime_type))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// Returns the payload encoded as JPEG, re-encoding other formats.
    pub fn to_jpeg_bytes(&self) -> Result<Vec<u8>, MediaError> {
        if self.mime_type == "image/jpeg" {
            return Ok(self.bytes.clone());
        }
        let decoded = image::load_from_memory(&self.bytes)?;
        let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());
        let mut out = Cursor::new(Vec::new());
        rgb.write_to(&mut out, ImageFormat::Jpeg)?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([200, 30, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn sniffs_png_bytes() {
        let image = ImageData::from_bytes(tiny_png());
        assert_eq!(image.mime_type(), "image/png");
    }

    #[test]
    fn parses_data_url_payload() {
        let original = ImageData::new(vec![1, 2, 3, 4], "image/jpg");
        let parsed = ImageData::from_data_url(&original.to_data_url()).unwrap();
        assert_eq!(parsed, ImageData::new(vec![1, 2, 3, 4], "image/jpeg"));
    }

    #[test]
    fn rejects_non_image_data_url() {
        let err = ImageData::from_data_url("data:text/plain;base64,aGk=").unwrap_err();
        assert!(matches!(err, MediaError::NotAnImage(_)));
        assert!(matches!(
            ImageData::from_data_url("not a data url"),
            Err(MediaError::MalformedDataUrl)
        ));
    }

    #[test]
    fn converts_png_to_jpeg() {
        let image = ImageData::from_bytes(tiny_png());
        let jpeg = image.to_jpeg_bytes().unwrap();
        assert_eq!(detect_mime_type(&jpeg).as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn jpeg_passes_through_unchanged() {
        let image = ImageData::new(vec![0xFF, 0xD8, 0xFF, 0x00], "image/jpeg");
        assert_eq!(image.to_jpeg_bytes().unwrap(), image.bytes());
    }

    #[test]
    fn load_reads_file_and_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        std::fs::write(&path, tiny_png()).unwrap();
        let image = ImageData::load(&path).unwrap();
        assert_eq!(image.mime_type(), "image/png");

        let empty = dir.path().join("empty.jpg");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(ImageData::load(&empty), Err(MediaError::Empty(_))));
    }
}
