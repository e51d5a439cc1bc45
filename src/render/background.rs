use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, VizError};

/// How the background image is placed on the output canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FitMode {
    /// Scale to fill the frame, cropping the overflow.
    #[default]
    Cover,
    /// Scale to fit inside the frame, letterboxed on black.
    Contain,
}

impl FromStr for FitMode {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cover" => Ok(FitMode::Cover),
            "contain" => Ok(FitMode::Contain),
            other => Err(VizError::input(format!(
                "unsupported image mode '{}', expected 'cover' or 'contain'",
                other
            ))),
        }
    }
}

/// Size of the scaled source image before cropping (cover) or centering (contain).
pub fn fitted_size(src_w: u32, src_h: u32, width: u32, height: u32, mode: FitMode) -> (u32, u32) {
    let src_ratio = src_w as f64 / src_h as f64;
    let target_ratio = width as f64 / height as f64;
    let by_width = (width, ((width as f64 / src_ratio).round() as u32).max(1));
    let by_height = (((height as f64 * src_ratio).round() as u32).max(1), height);

    match mode {
        FitMode::Contain if src_ratio > target_ratio => by_width,
        FitMode::Contain => by_height,
        FitMode::Cover if src_ratio < target_ratio => (width, by_width.1.max(height)),
        FitMode::Cover => (by_height.0.max(width), height),
    }
}

/// Opaque background at output resolution.
pub struct Background {
    image: RgbImage,
}

impl Background {
    pub fn load(path: &Path, width: u32, height: u32, mode: FitMode) -> Result<Self> {
        let img = image::open(path).map_err(|e| {
            VizError::input(format!(
                "failed to read background image {}: {}",
                path.display(),
                e
            ))
        })?;
        log::info!(
            "Background: {} ({}x{}, {:?})",
            path.display(),
            img.width(),
            img.height(),
            mode
        );
        Ok(Self::fit(img, width, height, mode))
    }

    pub fn fit(img: DynamicImage, width: u32, height: u32, mode: FitMode) -> Self {
        let src = img.to_rgb8();
        let (new_w, new_h) = fitted_size(src.width(), src.height(), width, height, mode);
        let resized = imageops::resize(&src, new_w, new_h, FilterType::Lanczos3);

        let image = match mode {
            FitMode::Cover => {
                let x = (new_w - width) / 2;
                let y = (new_h - height) / 2;
                imageops::crop_imm(&resized, x, y, width, height).to_image()
            }
            FitMode::Contain => {
                let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
                let x = (width - new_w) / 2;
                let y = (height - new_h) / 2;
                imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
                canvas
            }
        };

        Self { image }
    }

    #[cfg(test)]
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb(color)),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Source-over `frame` onto the background. Returns opaque RGBA bytes.
    pub fn composite(&self, frame: &RgbaImage) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.image.as_raw().len() / 3 * 4);
        for (bg, fg) in self.image.pixels().zip(frame.pixels()) {
            let a = fg.0[3] as u32;
            let inv = 255 - a;
            for c in 0..3 {
                let blended = (fg.0[c] as u32 * a + bg.0[c] as u32 * inv + 127) / 255;
                out.push(blended as u8);
            }
            out.push(255);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn parses_fit_modes() {
        assert_eq!("cover".parse::<FitMode>().unwrap(), FitMode::Cover);
        assert_eq!("CONTAIN".parse::<FitMode>().unwrap(), FitMode::Contain);
        assert!(matches!("stretch".parse::<FitMode>(), Err(VizError::Input(_))));
    }

    #[test]
    fn cover_fills_the_frame() {
        // Tall source into a wide frame: width drives, height overflows
        assert_eq!(fitted_size(100, 200, 160, 90, FitMode::Cover), (160, 320));
        // Wide source into a wide frame: height drives
        assert_eq!(fitted_size(400, 100, 160, 90, FitMode::Cover), (360, 90));
    }

    #[test]
    fn contain_fits_inside() {
        assert_eq!(fitted_size(100, 200, 160, 90, FitMode::Contain), (45, 90));
        assert_eq!(fitted_size(400, 100, 160, 90, FitMode::Contain), (160, 40));
    }

    #[test]
    fn contain_letterboxes_on_black() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 10, Rgb([200, 50, 50])));
        let bg = Background::fit(src, 40, 40, FitMode::Contain);
        assert_eq!(bg.dimensions(), (40, 40));
        assert_eq!(bg.image.get_pixel(20, 0).0, [0, 0, 0]);
        assert_eq!(bg.image.get_pixel(20, 20).0, [200, 50, 50]);
    }

    #[test]
    fn cover_crops_to_output_size() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 40, Rgb([10, 20, 30])));
        let bg = Background::fit(src, 32, 18, FitMode::Cover);
        assert_eq!(bg.dimensions(), (32, 18));
        assert!(bg.image.pixels().all(|p| p.0 == [10, 20, 30]));
    }

    #[test]
    fn composite_respects_alpha() {
        let bg = Background::solid(3, 1, [0, 0, 100]);
        let mut frame = RgbaImage::new(3, 1);
        frame.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        frame.put_pixel(2, 0, Rgba([255, 255, 255, 128]));

        let out = bg.composite(&frame);
        assert_eq!(out.len(), 12);
        assert_eq!(&out[0..4], &[0, 0, 100, 255]);
        assert_eq!(&out[4..8], &[255, 255, 255, 255]);
        assert_eq!(&out[8..12], &[128, 128, 178, 255]);
    }
}
