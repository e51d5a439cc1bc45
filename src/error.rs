use std::fmt;

use thiserror::Error;

/// Pipeline stage a per-frame failure originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Smoothing,
    Geometry,
    Rasterization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extraction => write!(f, "extraction"),
            Stage::Smoothing => write!(f, "smoothing"),
            Stage::Geometry => write!(f, "geometry"),
            Stage::Rasterization => write!(f, "rasterization"),
        }
    }
}

#[derive(Debug, Error)]
pub enum VizError {
    /// Invalid geometry, frequency band or resolution. Raised before any frame is rendered.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unreadable or unsupported input, or an empty waveform.
    #[error("input error: {0}")]
    Input(String),

    /// A single frame could not be synthesized. Aborts the whole render.
    #[error("render error in {stage} at frame {frame}: {reason}")]
    Render {
        stage: Stage,
        frame: usize,
        reason: String,
    },

    #[error("render cancelled")]
    Cancelled,
}

impl VizError {
    pub fn config(msg: impl Into<String>) -> Self {
        VizError::Configuration(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        VizError::Input(msg.into())
    }

    pub fn render(stage: Stage, frame: usize, reason: impl Into<String>) -> Self {
        VizError::Render {
            stage,
            frame,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VizError>;
