//! Filesystem enrollment samples.
//!
//! Sample images live at `<root>/<label>/<n>.jpg`, numbered from 1, the
//! layout the enrollment images are deployed in.

use image::ImageReader;
use std::path::PathBuf;
use tally_core::enrollment::{SampleError, SampleSource};
use tally_core::FramePixels;

pub struct DirSamples {
    root: PathBuf,
}

impl DirSamples {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn sample_path(&self, label: &str, index: usize) -> PathBuf {
        self.root.join(label).join(format!("{}.jpg", index + 1))
    }
}

impl SampleSource for DirSamples {
    fn sample(&self, label: &str, index: usize) -> Result<FramePixels, SampleError> {
        let path = self.sample_path(label, index);
        if !path.exists() {
            return Err(SampleError::NotFound(path.display().to_string()));
        }

        let image = ImageReader::open(&path)
            .map_err(|e| SampleError::Unreadable(format!("{}: {e}", path.display())))?
            .decode()
            .map_err(|e| SampleError::Unreadable(format!("{}: {e}", path.display())))?
            .to_luma8();

        Ok(FramePixels {
            width: image.width(),
            height: image.height(),
            data: image.into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sample_is_not_found() {
        let samples = DirSamples::new("/nonexistent/tally-samples");
        match samples.sample("daniel", 0) {
            Err(SampleError::NotFound(path)) => assert!(path.ends_with("daniel/1.jpg")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn garbage_file_is_unreadable() {
        let dir = std::env::temp_dir().join(format!("tally-samples-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("daniel")).unwrap();
        std::fs::write(dir.join("daniel/1.jpg"), b"not an image").unwrap();

        let samples = DirSamples::new(&dir);
        assert!(matches!(
            samples.sample("daniel", 0),
            Err(SampleError::Unreadable(_))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn valid_image_decodes_to_grayscale() {
        let dir = std::env::temp_dir().join(format!("tally-samples-ok-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("daniel")).unwrap();
        let img = image::GrayImage::from_pixel(4, 2, image::Luma([128u8]));
        img.save(dir.join("daniel/1.jpg")).unwrap();

        let samples = DirSamples::new(&dir);
        let frame = samples.sample("daniel", 0).unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(frame.data.len(), 8);

        std::fs::remove_dir_all(&dir).ok();
    }
}
