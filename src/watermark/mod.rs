//! Per-image watermarking
//!
//! - `render`: composites the mark and encodes outputs
//! - `precompress`: shrinks oversized inputs before compositing
//! - `naming`: maps inputs to output paths
//! - `task`: the pipeline tying them together for one image

pub mod naming;
pub mod precompress;
pub mod render;
pub mod task;

pub use naming::{OutputNamer, random_suffix};
pub use precompress::{PrecompressionGate, target_dimensions};
pub use render::{Placement, WatermarkRenderer};
pub use task::WatermarkTask;
