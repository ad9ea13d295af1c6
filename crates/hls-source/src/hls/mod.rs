pub mod loader;
pub mod parser;
pub mod playlist;
pub mod property;
pub mod session;
pub mod variant;

pub use loader::{LoaderCommands, LoaderHandle, PlaylistLoader, PlaylistTree};
pub use parser::{ParsedPlaylist, PlaylistParser};
pub use playlist::{NextSegment, Playlist};
pub use property::Property;
pub use session::{LoadedSegment, SessionCloser, SessionState, StreamSession, SwitchSlot};
pub use variant::{AudioExtMedia, ExtStreamInf, Selection, VariantPlaylist};
