//! The durable page buffer and its background drain loop.

pub mod drain;
pub mod page;

pub use drain::BufferDrainService;
pub use page::{BufferedPage, PageBuffer};
