use std::f64::consts::TAU;

use crate::config::Config;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// One spoke for one frame: from the base radius outwards along the spoke angle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub inner: Point,
    pub outer: Point,
}

impl Segment {
    pub fn length(&self) -> f32 {
        (self.outer.x - self.inner.x).hypot(self.outer.y - self.inner.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f32,
    pub width: f32,
}

/// Level source for one frame.
#[derive(Clone, Copy, Debug)]
pub enum Levels<'a> {
    /// Same level for every spoke.
    Uniform(f32),
    /// One level per spoke, in spoke order.
    PerSpoke(&'a [f32]),
}

/// Static ring layout: center, radii and the unit direction of every spoke.
#[derive(Clone, Debug)]
pub struct RingGeometry {
    center: Point,
    base_radius: f32,
    bar_min: f32,
    bar_max_extra: f32,
    response: f32,
    base_ring_width: Option<f32>,
    directions: Vec<(f32, f32)>,
}

impl RingGeometry {
    pub fn new(
        center: Point,
        base_radius: f32,
        bar_min: f32,
        bar_max_extra: f32,
        spokes: usize,
    ) -> Self {
        let directions = (0..spokes)
            .map(|k| {
                let angle = k as f64 * TAU / spokes as f64;
                (angle.cos() as f32, angle.sin() as f32)
            })
            .collect();
        Self {
            center,
            base_radius,
            bar_min,
            bar_max_extra,
            response: 1.0,
            base_ring_width: None,
            directions,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let (cx, cy) = config.center();
        let ring = &config.ring;
        let mut geometry = Self::new(
            Point { x: cx, y: cy },
            ring.base_radius,
            ring.bar_min,
            ring.bar_max_extra,
            ring.spokes,
        )
        .with_response(ring.response);
        if ring.base_ring && ring.base_ring_width > 0.0 {
            geometry = geometry.with_base_ring(ring.base_ring_width);
        }
        geometry
    }

    pub fn with_response(mut self, response: f32) -> Self {
        self.response = response;
        self
    }

    pub fn with_base_ring(mut self, width: f32) -> Self {
        self.base_ring_width = Some(width);
        self
    }

    pub fn spokes(&self) -> usize {
        self.directions.len()
    }

    /// BAR_MIN + v^response * BAR_MAX_EXTRA, with v clamped to [0, 1].
    pub fn bar_length(&self, v: f32) -> f32 {
        let v = v.clamp(0.0, 1.0);
        self.bar_min + v.powf(self.response) * self.bar_max_extra
    }

    /// Full-circle stroke at the base radius, drawn before the spokes.
    pub fn base_circle(&self) -> Option<Circle> {
        self.base_ring_width.map(|width| Circle {
            center: self.center,
            radius: self.base_radius,
            width,
        })
    }

    pub fn segments(&self, levels: Levels<'_>) -> Vec<Segment> {
        self.directions
            .iter()
            .enumerate()
            .map(|(k, &(cos, sin))| {
                let v = match levels {
                    Levels::Uniform(v) => v,
                    Levels::PerSpoke(values) => values.get(k).copied().unwrap_or(0.0),
                };
                let outer_radius = self.base_radius + self.bar_length(v);
                Segment {
                    inner: Point {
                        x: self.center.x + self.base_radius * cos,
                        y: self.center.y + self.base_radius * sin,
                    },
                    outer: Point {
                        x: self.center.x + outer_radius * cos,
                        y: self.center.y + outer_radius * sin,
                    },
                }
            })
            .collect()
    }
}
