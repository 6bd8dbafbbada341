use image::GrayImage;

/// Running estimate of the empty scene inside the ROI, one `f32` per pixel of
/// the blurred grayscale crop.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    values: Vec<f32>,
    width: u32,
    height: u32,
}

impl BackgroundModel {
    /// Seeds the model from a single frame.
    pub fn seed(frame: &GrayImage) -> Self {
        let (width, height) = frame.dimensions();
        Self {
            values: frame.as_raw().iter().map(|&p| f32::from(p)).collect(),
            width,
            height,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether `frame` can be compared against this model pixel for pixel.
    pub fn matches(&self, frame: &GrayImage) -> bool {
        frame.dimensions() == self.dimensions()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Blends `frame` into the model: `bg = bg * (1 - alpha) + frame * alpha`.
    pub fn accumulate(&mut self, frame: &GrayImage, alpha: f64) {
        let alpha = alpha as f32;
        for (bg, &px) in self.values.iter_mut().zip(frame.as_raw()) {
            *bg = *bg * (1.0 - alpha) + f32::from(px) * alpha;
        }
    }

    /// The model rounded back to 8 bits.
    pub fn to_image(&self) -> GrayImage {
        let pixels = self
            .values
            .iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        GrayImage::from_raw(self.width, self.height, pixels)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn seeding_copies_the_frame() {
        let frame = GrayImage::from_fn(4, 2, |x, y| Luma([(x * 10 + y) as u8]));
        let model = BackgroundModel::seed(&frame);
        assert_eq!(model.dimensions(), (4, 2));
        assert_eq!(model.to_image(), frame);
    }

    #[test]
    fn accumulate_moves_towards_the_new_frame() {
        let mut model = BackgroundModel::seed(&GrayImage::from_pixel(2, 2, Luma([0])));
        let bright = GrayImage::from_pixel(2, 2, Luma([200]));

        model.accumulate(&bright, 0.25);
        assert!(model.values().iter().all(|&v| (v - 50.0).abs() < 1e-4));

        model.accumulate(&bright, 1.0);
        assert!(model.values().iter().all(|&v| (v - 200.0).abs() < 1e-4));
    }

    #[test]
    fn size_mismatch_is_detected() {
        let model = BackgroundModel::seed(&GrayImage::new(8, 8));
        assert!(model.matches(&GrayImage::new(8, 8)));
        assert!(!model.matches(&GrayImage::new(8, 9)));
    }
}
