//! Picks the `VideoBackend` that can handle a source descriptor.

use roi_vision::VideoBackend;

#[cfg(not(feature = "opencv"))]
pub fn for_descriptor(descriptor: &str) -> anyhow::Result<Box<dyn VideoBackend>> {
    use roi_vision::{ImageSequenceBackend, SourceKind};

    match SourceKind::classify(descriptor) {
        SourceKind::File => Ok(Box::new(ImageSequenceBackend::new())),
        kind => anyhow::bail!(
            "`{descriptor}` is a {kind}; build with `--features opencv` to capture from it"
        ),
    }
}

/// OpenCV's `VideoCapture` handles every kind of descriptor.
#[cfg(feature = "opencv")]
pub fn for_descriptor(_descriptor: &str) -> anyhow::Result<Box<dyn VideoBackend>> {
    Ok(Box::new(opencv_capture::OpencvBackend::new()))
}

#[cfg(feature = "opencv")]
mod opencv_capture {
    use image::RgbImage;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture},
    };
    use roi_vision::{SourceKind, VideoBackend};

    /// Devices, video files and network streams through `opencv::videoio`.
    #[derive(Default)]
    pub struct OpencvBackend {
        capture: Option<VideoCapture>,
    }

    impl OpencvBackend {
        pub fn new() -> Self {
            Self::default()
        }

        fn open_capture(descriptor: &str) -> opencv::Result<VideoCapture> {
            match SourceKind::classify(descriptor) {
                SourceKind::LocalDevice => {
                    let index = descriptor.parse::<i32>().unwrap_or(0);
                    VideoCapture::new(index, videoio::CAP_ANY)
                }
                SourceKind::File | SourceKind::NetworkStream => {
                    VideoCapture::from_file(descriptor, videoio::CAP_ANY)
                }
            }
        }

        fn to_rgb(frame: &Mat) -> opencv::Result<Option<RgbImage>> {
            let mut rgb = Mat::default();
            imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
            let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
            Ok(RgbImage::from_raw(width, height, rgb.data_bytes()?.to_vec()))
        }
    }

    impl VideoBackend for OpencvBackend {
        fn open(&mut self, descriptor: &str) -> bool {
            match Self::open_capture(descriptor) {
                Ok(capture) if capture.is_opened().unwrap_or(false) => {
                    self.capture = Some(capture);
                    true
                }
                Ok(_) => false,
                Err(err) => {
                    tracing::warn!(descriptor, %err, "opencv could not open source");
                    false
                }
            }
        }

        fn is_opened(&self) -> bool {
            self.capture
                .as_ref()
                .is_some_and(|c| c.is_opened().unwrap_or(false))
        }

        fn read(&mut self) -> Option<RgbImage> {
            let capture = self.capture.as_mut()?;
            let mut frame = Mat::default();
            match capture.read(&mut frame) {
                Ok(true) if !frame.empty() => match Self::to_rgb(&frame) {
                    Ok(image) => image,
                    Err(err) => {
                        tracing::warn!(%err, "frame conversion failed");
                        None
                    }
                },
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(%err, "error reading frame");
                    None
                }
            }
        }

        fn release(&mut self) {
            if let Some(mut capture) = self.capture.take() {
                if let Err(err) = capture.release() {
                    tracing::warn!(%err, "error releasing capture");
                }
            }
        }

        fn fps(&self) -> Option<f64> {
            let fps = self.capture.as_ref()?.get(videoio::CAP_PROP_FPS).ok()?;
            (fps > 0.0).then_some(fps)
        }

        fn seek_to_start(&mut self) -> bool {
            self.capture
                .as_mut()
                .and_then(|c| c.set(videoio::CAP_PROP_POS_FRAMES, 0.0).ok())
                .unwrap_or(false)
        }
    }
}

#[cfg(all(test, not(feature = "opencv")))]
mod tests {
    use super::*;

    #[test]
    fn files_use_the_image_sequence_backend() {
        assert!(for_descriptor("clips/frames").is_ok());
    }

    #[test]
    fn devices_and_streams_need_opencv() {
        let err = for_descriptor("0").err().expect("device rejected");
        assert!(err.to_string().contains("opencv"));
        assert!(for_descriptor("rtsp://camera/live").is_err());
    }
}
