use super::VideoBackend;
use image::RgbImage;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// A file backend that plays a directory of still images, in file name order,
/// one image per frame. A path to a single image plays as a one-frame clip.
#[derive(Debug, Clone, Default)]
pub struct ImageSequenceBackend {
    paths: Vec<PathBuf>,
    cursor: usize,
    opened: bool,
    fps: Option<f64>,
}

impl ImageSequenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `fps` as the native rate, which the frame source paces to.
    pub fn with_fps(fps: f64) -> Self {
        Self {
            fps: Some(fps),
            ..Self::default()
        }
    }

    /// Number of images found by the last successful `open`.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn list(path: &Path) -> Vec<PathBuf> {
        if path.is_file() {
            return vec![path.to_path_buf()];
        }
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "cannot list image directory");
                return Vec::new();
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        paths.sort();
        paths
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

impl VideoBackend for ImageSequenceBackend {
    fn open(&mut self, descriptor: &str) -> bool {
        self.paths = Self::list(Path::new(descriptor));
        self.cursor = 0;
        self.opened = !self.paths.is_empty();
        tracing::debug!(descriptor, images = self.paths.len(), "image sequence opened");
        self.opened
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn read(&mut self) -> Option<RgbImage> {
        if !self.opened {
            return None;
        }
        while let Some(path) = self.paths.get(self.cursor) {
            self.cursor += 1;
            match image::open(path) {
                Ok(img) => return Some(img.to_rgb8()),
                Err(err) => tracing::warn!(path = %path.display(), %err, "skipping unreadable image"),
            }
        }
        None
    }

    fn release(&mut self) {
        self.paths.clear();
        self.cursor = 0;
        self.opened = false;
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn seek_to_start(&mut self) -> bool {
        if self.opened {
            self.cursor = 0;
        }
        self.opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, names: &[&str]) {
        for (i, name) in names.iter().enumerate() {
            let img = RgbImage::from_pixel(8, 6, Rgb([i as u8 * 10, 0, 0]));
            img.save(dir.join(name)).expect("write test image");
        }
    }

    #[test]
    fn plays_images_in_name_order_and_rewinds() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_frames(dir.path(), &["b.png", "a.png", "c.bmp"]);
        std::fs::write(dir.path().join("notes.txt"), "not an image").expect("write note");

        let mut backend = ImageSequenceBackend::new();
        assert!(backend.open(dir.path().to_str().expect("utf-8 path")));
        assert_eq!(backend.len(), 3);

        let reds: Vec<u8> = std::iter::from_fn(|| backend.read()).map(|img| img.get_pixel(0, 0).0[0]).collect();
        // a.png was written second, b.png first, c.bmp third.
        assert_eq!(reds, vec![10, 0, 20]);

        assert!(backend.seek_to_start());
        assert_eq!(backend.read().map(|img| img.dimensions()), Some((8, 6)));
    }

    #[test]
    fn single_file_is_a_one_frame_clip() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_frames(dir.path(), &["only.png"]);
        let mut backend = ImageSequenceBackend::with_fps(12.0);

        assert!(backend.open(dir.path().join("only.png").to_str().expect("utf-8 path")));
        assert!(backend.read().is_some());
        assert!(backend.read().is_none());
        assert_eq!(backend.fps(), Some(12.0));
    }

    #[test]
    fn empty_or_missing_directories_do_not_open() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut backend = ImageSequenceBackend::new();
        assert!(!backend.open(dir.path().to_str().expect("utf-8 path")));
        assert!(!backend.open("/definitely/not/here"));
        assert!(!backend.is_opened());
        assert!(!backend.seek_to_start());
    }
}
