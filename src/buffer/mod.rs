//! Named, shared sample buffers and scoped read access to them.

pub mod handle;
pub mod store;

pub use handle::{BufferHandle, BufferLock};
pub use store::{BufferData, BufferEvent, BufferId, BufferInfo, BufferRegistry, BufferStore};
