/// Properties a consumer can query on a session, with the numeric ids of
/// the pull interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    /// Total duration in milliseconds, `-1` while live.
    Duration,
    /// Always `1`, marks the source as segmented.
    HlsMode,
    /// Container code, see [`crate::ContainerKind::mime_type_code`].
    MimeType,
    /// Loads the next segment and returns its signed length.
    LoadSegment,
    /// Start of the current segment in milliseconds.
    SegmentStartTime,
    HasAudioExtStream,
}

impl Property {
    pub fn id(&self) -> i32 {
        match self {
            Self::Duration => 1,
            Self::HlsMode => 2,
            Self::MimeType => 3,
            Self::LoadSegment => 4,
            Self::SegmentStartTime => 5,
            Self::HasAudioExtStream => 6,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Some(match id {
            1 => Self::Duration,
            2 => Self::HlsMode,
            3 => Self::MimeType,
            4 => Self::LoadSegment,
            5 => Self::SegmentStartTime,
            6 => Self::HasAudioExtStream,
            _ => return None,
        })
    }
}
