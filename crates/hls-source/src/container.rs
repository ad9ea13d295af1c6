use crate::util::file_name;

/// Container format of the media segments in a playlist, sniffed once from
/// the first segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerKind {
    Ts,
    Mp3,
    FragmentedMp4,
    Aac,
    #[default]
    Unknown,
}

impl ContainerKind {
    pub fn from_uri(uri: &str) -> Self {
        let (_, ext) = file_name(uri).rsplit_once('.').unwrap_or(("", ""));
        match ext.to_ascii_lowercase().as_str() {
            "ts" => Self::Ts,
            "mp3" => Self::Mp3,
            "mp4" | "m4s" => Self::FragmentedMp4,
            "aac" => Self::Aac,
            _ => Self::Unknown,
        }
    }

    pub fn is_fragmented(&self) -> bool {
        matches!(self, Self::FragmentedMp4)
    }

    /// Mime type code reported through the property surface.
    pub fn mime_type_code(&self) -> i64 {
        match self {
            Self::Ts => 1,
            Self::Mp3 => 2,
            Self::FragmentedMp4 => 3,
            Self::Aac => 4,
            Self::Unknown => -1,
        }
    }
}
