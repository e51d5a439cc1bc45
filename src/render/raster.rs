use image::{Rgba, RgbaImage};

use super::ring::{Circle, Segment};
use crate::config::Config;

/// Stroke width and opacity of one glow overdraw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlowPass {
    pub width: f32,
    pub alpha: f32,
}

#[derive(Clone, Debug)]
pub struct RasterConfig {
    pub width: u32,
    pub height: u32,
    pub bar_thickness: f32,
    pub color: [u8; 3],
    /// Opacity of the base ring stroke (0.0-1.0)
    pub ring_alpha: f32,
    pub glow_steps: u32,
    /// Opacity of the innermost glow pass (0.0-1.0)
    pub glow_alpha: f32,
    pub glow_expand: f32,
}

impl RasterConfig {
    pub fn from_config(config: &Config) -> Self {
        let glow = &config.glow;
        Self {
            width: config.output.width,
            height: config.output.height,
            bar_thickness: config.ring.bar_thickness,
            color: config.ring.color,
            ring_alpha: config.ring.ring_alpha as f32 / 255.0,
            glow_steps: if glow.enabled { glow.steps } else { 0 },
            glow_alpha: glow.alpha as f32 / 255.0,
            glow_expand: glow.expand,
        }
    }

    /// Glow passes in drawing order: widest and faintest first.
    pub fn glow_passes(&self) -> Vec<GlowPass> {
        let steps = self.glow_steps;
        (1..=steps)
            .rev()
            .map(|j| GlowPass {
                width: self.bar_thickness + j as f32 * self.glow_expand,
                alpha: self.glow_alpha * (steps - j + 1) as f32 / steps as f32,
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Blend {
    /// Source-over.
    Over,
    /// Saturating sum, so overlapping passes brighten.
    Add,
}

/// Single-color coverage canvas. Every stroke shares the bar color, so only alpha is stored.
pub struct Canvas {
    width: u32,
    height: u32,
    alpha: Vec<f32>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: vec![0.0; width as usize * height as usize],
        }
    }

    fn blend(&mut self, x: u32, y: u32, coverage: f32, opacity: f32, mode: Blend) {
        let a = (coverage * opacity).clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        let dst = &mut self.alpha[(y * self.width + x) as usize];
        *dst = match mode {
            Blend::Over => a + *dst * (1.0 - a),
            Blend::Add => (*dst + a).min(1.0),
        };
    }

    /// Pixel rectangle (x0..x1, y0..y1) covering the given bounds, clipped to the canvas.
    fn clip(&self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Option<(u32, u32, u32, u32)> {
        let x0 = min_x.floor().max(0.0);
        let y0 = min_y.floor().max(0.0);
        let x1 = (max_x.ceil() + 1.0).min(self.width as f32);
        let y1 = (max_y.ceil() + 1.0).min(self.height as f32);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    /// Flat-capped line of the given width, anti-aliased by signed distance.
    fn stroke_segment(&mut self, seg: &Segment, width: f32, opacity: f32, mode: Blend) {
        let len = seg.length();
        if len < 1e-6 {
            return;
        }
        let ux = (seg.outer.x - seg.inner.x) / len;
        let uy = (seg.outer.y - seg.inner.y) / len;
        let half = width.max(1.0) / 2.0;

        let pad = half + 1.0;
        let bounds = self.clip(
            seg.inner.x.min(seg.outer.x) - pad,
            seg.inner.y.min(seg.outer.y) - pad,
            seg.inner.x.max(seg.outer.x) + pad,
            seg.inner.y.max(seg.outer.y) + pad,
        );
        let Some((x0, y0, x1, y1)) = bounds else {
            return;
        };

        for y in y0..y1 {
            for x in x0..x1 {
                let px = x as f32 + 0.5 - seg.inner.x;
                let py = y as f32 + 0.5 - seg.inner.y;
                let along = px * ux + py * uy;
                let across = (px * -uy + py * ux).abs();
                let dist = (across - half).max((-along).max(along - len));
                let coverage = (0.5 - dist).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    self.blend(x, y, coverage, opacity, mode);
                }
            }
        }
    }

    fn stroke_circle(&mut self, circle: &Circle, opacity: f32, mode: Blend) {
        let half = circle.width / 2.0;
        let pad = circle.radius + half + 1.0;
        let bounds = self.clip(
            circle.center.x - pad,
            circle.center.y - pad,
            circle.center.x + pad,
            circle.center.y + pad,
        );
        let Some((x0, y0, x1, y1)) = bounds else {
            return;
        };

        for y in y0..y1 {
            for x in x0..x1 {
                let px = x as f32 + 0.5 - circle.center.x;
                let py = y as f32 + 0.5 - circle.center.y;
                let dist = (px.hypot(py) - circle.radius).abs() - half;
                let coverage = (0.5 - dist).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    self.blend(x, y, coverage, opacity, mode);
                }
            }
        }
    }

    /// Straight-alpha RGBA. Uncovered pixels are (0, 0, 0, 0).
    pub fn into_image(self, color: [u8; 3]) -> RgbaImage {
        let mut img = RgbaImage::new(self.width, self.height);
        for (pixel, &a) in img.pixels_mut().zip(self.alpha.iter()) {
            let alpha = (a * 255.0).round() as u8;
            if alpha > 0 {
                *pixel = Rgba([color[0], color[1], color[2], alpha]);
            }
        }
        img
    }
}

/// Draw one frame: base ring, glow passes, then the sharp spokes on top.
pub fn rasterize(config: &RasterConfig, ring: Option<&Circle>, segments: &[Segment]) -> RgbaImage {
    let mut canvas = Canvas::new(config.width, config.height);

    if let Some(circle) = ring {
        canvas.stroke_circle(circle, config.ring_alpha, Blend::Over);
    }

    for pass in config.glow_passes() {
        for seg in segments {
            canvas.stroke_segment(seg, pass.width, pass.alpha, Blend::Add);
        }
    }

    for seg in segments {
        canvas.stroke_segment(seg, config.bar_thickness, 1.0, Blend::Over);
    }

    canvas.into_image(config.color)
}
