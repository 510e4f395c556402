//! Buffer pool for TernDB.
//!
//! Pages fetched through the pool are pinned; a pinned page cannot be
//! evicted until every holder has unpinned it, and a page modified while
//! pinned must be unpinned with the dirty flag so the owner can write it
//! back. Eviction uses the clock algorithm over unpinned frames.

mod frame;
mod page_table;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use page_table::PageTable;
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, EvictedPage};
pub use replacer::{ClockReplacer, Replacer};
