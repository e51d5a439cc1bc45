pub mod background;
pub mod frame;
pub mod pipeline;
pub mod raster;
pub mod ring;
