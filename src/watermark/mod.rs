//! Static watermark detection and removal

pub mod mask;
pub mod pipeline;
pub mod restorer;
pub mod sampler;

pub use mask::{WatermarkMask, WatermarkMaskBuilder};
pub use pipeline::{PreviewFrame, WatermarkRemovalPipeline};
pub use restorer::FrameRestorer;
pub use sampler::FrameSampler;
