//! Image operations used by the detector, expressed over `image` buffers and
//! `imageproc` primitives.

use crate::roi::PixelRect;
use image::{GrayImage, Rgb, RgbImage, imageops};
use imageproc::contours::{BorderType, find_contours};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::morphology::{Mask, grayscale_dilate};
use imageproc::point::Point;
use imageproc::rect::Rect;

pub(crate) const ROI_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub(crate) const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// The 5x5 elliptical structuring element: full rows at -1..=1, a single
/// column at the top and bottom.
const DILATE_ELLIPSE: [[u8; 5]; 5] = [
    [0, 0, 1, 0, 0],
    [1, 1, 1, 1, 1],
    [1, 1, 1, 1, 1],
    [1, 1, 1, 1, 1],
    [0, 0, 1, 0, 0],
];
const DILATE_PASSES: usize = 2;

/// Crops `frame` to `rect` and converts the result to 8-bit luma.
pub(crate) fn crop_gray(frame: &RgbImage, rect: PixelRect) -> GrayImage {
    let cropped = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
    imageops::grayscale(&cropped)
}

/// Standard deviation used for a Gaussian kernel of `size` taps when none is
/// given explicitly.
pub(crate) fn sigma_for_kernel(size: u32) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian weights of odd length `size`.
pub(crate) fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = sigma_for_kernel(size);
    let center = (size / 2) as f32;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Separable Gaussian blur with a `kernel_size` x `kernel_size` window.
/// A size of 1 returns the input unchanged.
pub(crate) fn blur(gray: GrayImage, kernel_size: u32) -> GrayImage {
    if kernel_size <= 1 {
        return gray;
    }
    let kernel = gaussian_kernel(kernel_size);
    imageproc::filter::separable_filter_equal(&gray, &kernel)
}

/// Pixels of `blurred` that differ from `background` by strictly more than
/// `threshold` become 255, all others 0. The background is rounded to 8 bits
/// before comparing.
pub(crate) fn threshold_difference(
    blurred: &GrayImage,
    background: &[f32],
    threshold: u8,
) -> GrayImage {
    let mask = blurred
        .as_raw()
        .iter()
        .zip(background)
        .map(|(&px, &bg)| {
            let bg = bg.round().clamp(0.0, 255.0) as u8;
            if px.abs_diff(bg) > threshold { 255 } else { 0 }
        })
        .collect();
    // Same dimensions as `blurred` by construction.
    GrayImage::from_raw(blurred.width(), blurred.height(), mask)
        .unwrap_or_else(|| GrayImage::new(blurred.width(), blurred.height()))
}

/// Grows foreground regions so that nearby fragments of one moving object
/// merge into a single contour.
pub(crate) fn dilate(mask: GrayImage) -> GrayImage {
    let element = dilate_element();
    (0..DILATE_PASSES).fold(mask, |acc, _| grayscale_dilate(&acc, &element))
}

fn dilate_element() -> Mask {
    let shape = GrayImage::from_fn(5, 5, |x, y| {
        image::Luma([DILATE_ELLIPSE[y as usize][x as usize] * 255])
    });
    Mask::from_image(&shape, 2, 2)
}

/// Outermost contours of the foreground in `mask`. Holes and regions nested
/// inside other regions are skipped.
pub(crate) fn external_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}

/// Area enclosed by the polygon through `points`, by the shoelace formula.
pub(crate) fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    twice.abs() as f64 / 2.0
}

/// Smallest rectangle containing every point, shifted by `(dx, dy)`.
pub(crate) fn bounding_rect(points: &[Point<i32>], dx: u32, dy: u32) -> Option<PixelRect> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    Some(PixelRect::new(
        min_x.max(0) as u32 + dx,
        min_y.max(0) as u32 + dy,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// Draws a closed two-pixel outline through `points`, shifted by `(dx, dy)`.
pub(crate) fn draw_contour(canvas: &mut RgbImage, points: &[Point<i32>], dx: u32, dy: u32) {
    let (dx, dy) = (dx as f32, dy as f32);
    for (a, b) in points.iter().zip(points.iter().cycle().skip(1)) {
        for offset in [0.0, 1.0] {
            let start = (a.x as f32 + dx + offset, a.y as f32 + dy);
            let end = (b.x as f32 + dx + offset, b.y as f32 + dy);
            draw_line_segment_mut(canvas, start, end, CONTOUR_COLOR);
            let start = (a.x as f32 + dx, a.y as f32 + dy + offset);
            let end = (b.x as f32 + dx, b.y as f32 + dy + offset);
            draw_line_segment_mut(canvas, start, end, CONTOUR_COLOR);
        }
    }
}

/// Draws a two-pixel rectangle just inside the edges of `rect`.
pub(crate) fn draw_roi(canvas: &mut RgbImage, rect: PixelRect) {
    for inset in 0..2u32 {
        if rect.width <= inset * 2 || rect.height <= inset * 2 {
            break;
        }
        let outline = Rect::at((rect.x + inset) as i32, (rect.y + inset) as i32)
            .of_size(rect.width - inset * 2, rect.height - inset * 2);
        draw_hollow_rect_mut(canvas, outline, ROI_COLOR);
    }
}
