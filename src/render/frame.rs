use image::RgbaImage;

use super::raster::{rasterize, RasterConfig};
use super::ring::{Levels, RingGeometry, Segment};
use crate::audio::features::SmoothedLevels;
use crate::config::Config;
use crate::error::{Result, Stage, VizError};

/// Frame index -> RGBA image.
///
/// Holds everything a frame depends on, read-only, so any index can be
/// rendered independently and from any thread.
pub struct FrameSynth {
    levels: SmoothedLevels,
    geometry: RingGeometry,
    raster: RasterConfig,
}

impl FrameSynth {
    pub fn new(levels: SmoothedLevels, geometry: RingGeometry, raster: RasterConfig) -> Self {
        Self {
            levels,
            geometry,
            raster,
        }
    }

    pub fn from_config(levels: SmoothedLevels, config: &Config) -> Self {
        Self::new(
            levels,
            RingGeometry::from_config(config),
            RasterConfig::from_config(config),
        )
    }

    pub fn total_frames(&self) -> usize {
        self.levels.len()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.raster.width, self.raster.height)
    }

    fn frame_levels(&self, index: usize) -> Result<Levels<'_>> {
        let level = *self.levels.level.get(index).ok_or_else(|| {
            VizError::render(
                Stage::Geometry,
                index,
                format!("frame index out of range (total {})", self.total_frames()),
            )
        })?;

        let Some(bands) = self.levels.bands.as_ref() else {
            if !level.is_finite() {
                return Err(VizError::render(Stage::Smoothing, index, "level is not finite"));
            }
            return Ok(Levels::Uniform(level));
        };

        let values = bands
            .get(index)
            .ok_or_else(|| VizError::render(Stage::Smoothing, index, "missing band levels"))?;
        if values.len() != self.geometry.spokes() {
            return Err(VizError::render(
                Stage::Geometry,
                index,
                format!(
                    "{} band levels for {} spokes",
                    values.len(),
                    self.geometry.spokes()
                ),
            ));
        }
        if let Some(k) = values.iter().position(|v| !v.is_finite()) {
            return Err(VizError::render(
                Stage::Smoothing,
                index,
                format!("band level {} is not finite", k),
            ));
        }
        Ok(Levels::PerSpoke(values))
    }

    pub fn segments(&self, index: usize) -> Result<Vec<Segment>> {
        let levels = self.frame_levels(index)?;
        Ok(self.geometry.segments(levels))
    }

    pub fn render(&self, index: usize) -> Result<RgbaImage> {
        let segments = self.segments(index)?;
        let ring = self.geometry.base_circle();
        let image = rasterize(&self.raster, ring.as_ref(), &segments);
        if image.dimensions() != self.dimensions() {
            return Err(VizError::render(
                Stage::Rasterization,
                index,
                "canvas size does not match output resolution",
            ));
        }
        log::debug!("Rendered frame {} ({} segments)", index, segments.len());
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ring::Point;

    fn small_config(spokes: usize) -> Config {
        let mut cfg = Config::default();
        cfg.output.width = 160;
        cfg.output.height = 120;
        cfg.ring.center_x = Some(80.0);
        cfg.ring.center_y = Some(60.0);
        cfg.ring.base_radius = 20.0;
        cfg.ring.bar_min = 4.0;
        cfg.ring.bar_max_extra = 30.0;
        cfg.ring.spokes = spokes;
        cfg
    }

    fn uniform(levels: Vec<f32>) -> SmoothedLevels {
        SmoothedLevels {
            level: levels,
            bands: None,
        }
    }

    #[test]
    fn renders_every_index_at_output_resolution() {
        let synth = FrameSynth::from_config(uniform(vec![0.0, 0.5, 1.0]), &small_config(12));
        assert_eq!(synth.total_frames(), 3);
        for i in 0..3 {
            assert_eq!(synth.render(i).unwrap().dimensions(), (160, 120));
        }
    }

    #[test]
    fn louder_frames_draw_longer_spokes() {
        let synth = FrameSynth::from_config(uniform(vec![0.0, 1.0]), &small_config(12));
        let quiet = synth.segments(0).unwrap();
        let loud = synth.segments(1).unwrap();
        assert!((quiet[0].length() - 4.0).abs() < 1e-3);
        assert!((loud[0].length() - 34.0).abs() < 1e-3);

        let lit = |img: &RgbaImage| img.pixels().filter(|p| p.0[3] > 0).count();
        assert!(lit(&synth.render(1).unwrap()) > lit(&synth.render(0).unwrap()));
    }

    #[test]
    fn out_of_range_index_is_a_render_error() {
        let synth = FrameSynth::from_config(uniform(vec![0.3]), &small_config(4));
        match synth.render(5) {
            Err(VizError::Render { frame, stage, .. }) => {
                assert_eq!(frame, 5);
                assert_eq!(stage, Stage::Geometry);
            }
            other => panic!("expected render error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn non_finite_level_names_the_frame() {
        let synth = FrameSynth::from_config(uniform(vec![0.1, f32::NAN, 0.2]), &small_config(4));
        assert!(synth.render(0).is_ok());
        match synth.render(1) {
            Err(VizError::Render { frame, .. }) => assert_eq!(frame, 1),
            other => panic!("expected render error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn per_spoke_levels_drive_individual_spokes() {
        let levels = SmoothedLevels {
            level: vec![0.5],
            bands: Some(vec![vec![0.0, 1.0, 0.0, 1.0]]),
        };
        let synth = FrameSynth::from_config(levels, &small_config(4));
        let segs = synth.segments(0).unwrap();
        assert!((segs[0].length() - 4.0).abs() < 1e-3);
        assert!((segs[1].length() - 34.0).abs() < 1e-3);
        assert_eq!(segs[1].inner, Point { x: 80.0, y: 80.0 });
    }

    #[test]
    fn band_count_mismatch_is_rejected() {
        let levels = SmoothedLevels {
            level: vec![0.5],
            bands: Some(vec![vec![0.0, 1.0]]),
        };
        let synth = FrameSynth::from_config(levels, &small_config(4));
        assert!(matches!(
            synth.render(0),
            Err(VizError::Render { stage: Stage::Geometry, .. })
        ));
    }

    #[test]
    fn rendering_is_deterministic() {
        let synth = FrameSynth::from_config(uniform(vec![0.37]), &small_config(24));
        let a = synth.render(0).unwrap();
        let b = synth.render(0).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }
}
