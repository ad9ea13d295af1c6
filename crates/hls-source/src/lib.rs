//! Adaptive HLS media source.
//!
//! ```text
//! ┌──────────┐ load_next_segment ┌───────────────┐  next_segment  ┌──────────┐
//! │          ├──────────────────►│               ├───────────────►│          │
//! │ Consumer │  read_next_block  │ StreamSession │      seek      │ Playlist │
//! │          ├──────────────────►│               ├───────────────►│          │
//! └──────────┘                   └───────┬───────┘                └────▲─────┘
//!                                        │ open                        │ merge
//!                                 ┌──────▼──────┐  fetch_text  ┌──────┴─────────┐
//!                                 │ ByteSource  │◄─────────────┤ PlaylistLoader │
//!                                 └─────────────┘              └────────────────┘
//! ```

pub mod cache;
pub mod container;
pub mod context;
pub mod error;
pub mod hls;
pub mod options;
pub mod source;
pub mod util;

pub use cache::{MemoryResultCache, ResultCache};
pub use container::ContainerKind;
pub use context::HlsContext;
pub use error::{HlsError, HlsResult};
pub use hls::{LoadedSegment, Property, SessionCloser, StreamSession};
pub use options::HlsOptions;
pub use source::{ByteSource, DefaultSource, FileSource, HttpSource, MemorySource, OpenedSource};
