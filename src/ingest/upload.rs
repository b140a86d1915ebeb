use std::fmt;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use image::ImageFormat;

/// A user-selected image file, held in memory for preview and submission.
///
/// Only files whose extension maps to an image MIME type are accepted; the
/// content itself is not inspected.
#[derive(Clone)]
pub struct UploadedImage {
    file_name: String,
    mime_type: &'static str,
    bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("upload path {} has no file name", path.display()))?
            .to_string();
        let mime_type = image_mime_type(path)?;
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read image {}", path.display()))?;
        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }

    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Result<Self> {
        let mime_type = image_mime_type(Path::new(file_name))?;
        Ok(Self {
            file_name: file_name.to_string(),
            mime_type,
            bytes,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:` URL used for the local preview.
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            BASE64_STANDARD.encode(&self.bytes)
        )
    }
}

// Image bytes stay out of debug output.
impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn image_mime_type(path: &Path) -> Result<&'static str> {
    let format = ImageFormat::from_path(path)
        .map_err(|_| anyhow!("{} is not a supported image file", path.display()))?;
    let mime = format.to_mime_type();
    if !mime.starts_with("image/") {
        return Err(anyhow!("{} is not an image ({})", path.display(), mime));
    }
    Ok(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_mime_type_from_extension() -> Result<()> {
        assert_eq!(
            UploadedImage::from_bytes("a.PNG", vec![])?.mime_type(),
            "image/png"
        );
        assert_eq!(
            UploadedImage::from_bytes("b.jpeg", vec![])?.mime_type(),
            "image/jpeg"
        );
        Ok(())
    }

    #[test]
    fn rejects_non_image_files() {
        assert!(UploadedImage::from_bytes("notes.txt", vec![1, 2, 3]).is_err());
        assert!(UploadedImage::from_bytes("no_extension", vec![]).is_err());
    }

    #[test]
    fn data_url_is_base64_encoded() -> Result<()> {
        let image = UploadedImage::from_bytes("x.png", b"hi".to_vec())?;
        assert_eq!(image.data_url(), "data:image/png;base64,aGk=");
        Ok(())
    }

    #[test]
    fn reads_file_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("road.jpg");
        std::fs::write(&path, b"\xFF\xD8\xFF\xD9")?;
        let image = UploadedImage::from_path(&path)?;
        assert_eq!(image.file_name(), "road.jpg");
        assert_eq!(image.len(), 4);
        Ok(())
    }
}
