// Cover image: geometry compositor, single-shot acquisition lock, the image-service
// seams (synthesis / refinement) and object storage for composited covers.
// CPU-bound compositing must run inside tokio::task::spawn_blocking.

pub mod acquisition;
pub mod compositor;
pub mod prompts;
pub mod services;
pub mod store;

pub use acquisition::{
    acquire_cover, AcquisitionToken, CoverSources, ImageAcquisitionResult,
    ImageLock,
};
pub use compositor::CanvasSpec;
