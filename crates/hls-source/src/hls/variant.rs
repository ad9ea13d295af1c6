use std::sync::Arc;

use url::Url;

use super::playlist::Playlist;
use crate::error::{HlsError, HlsResult};

/// A bitrate variant declared by `#EXT-X-STREAM-INF`.
pub struct ExtStreamInf {
    pub bandwidth: u64,
    pub audio_group_id: Option<String>,
    pub url: Url,
    pub playlist: Arc<Playlist>,
}

/// An alternate audio rendition declared by `#EXT-X-MEDIA`.
pub struct AudioExtMedia {
    pub group_id: String,
    pub url: Url,
    pub playlist: Arc<Playlist>,
}

/// Outcome of a bitrate based variant selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Highest variant below the measured bitrate.
    Matched(usize),
    /// No variant fits the measured bitrate, the lowest one is used.
    Stalled(usize),
}

impl Selection {
    pub fn index(&self) -> usize {
        match self {
            Self::Matched(index) | Self::Stalled(index) => *index,
        }
    }
}

/// A master playlist whose variant and audio playlists are loaded.
pub struct VariantPlaylist {
    url: Url,
    variants: Vec<ExtStreamInf>,
    audio: Vec<AudioExtMedia>,
}

impl VariantPlaylist {
    /// Builds the variant set and drops entries the session can not switch
    /// between. Fails when no variant survives.
    pub fn new(
        url: Url,
        variants: Vec<ExtStreamInf>,
        audio: Vec<AudioExtMedia>,
    ) -> HlsResult<Self> {
        let mut playlist = Self {
            url,
            variants,
            audio,
        };
        playlist.validate()?;
        playlist.align_audio();
        Ok(playlist)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn variants(&self) -> &[ExtStreamInf] {
        &self.variants
    }

    pub fn audio_media(&self) -> &[AudioExtMedia] {
        &self.audio
    }

    pub fn has_audio_media(&self) -> bool {
        !self.audio.is_empty()
    }

    pub fn playlist(&self, index: usize) -> Option<Arc<Playlist>> {
        self.variants.get(index).map(|v| v.playlist.clone())
    }

    /// Keeps variants sharing the container of the first one. When the first
    /// variant has a separate audio group, variants without one are dropped
    /// too. Audio renditions are filtered the same way.
    pub fn validate(&mut self) -> HlsResult<()> {
        if let Some(first) = self.variants.first() {
            let container = first.playlist.container();
            let needs_group = first.audio_group_id.is_some();
            let before = self.variants.len();
            self.variants.retain(|v| {
                v.playlist.container() == container
                    && (!needs_group || v.audio_group_id.is_some())
            });
            if self.variants.len() != before {
                tracing::warn!(
                    "Dropped {} incompatible variants from {}",
                    before - self.variants.len(),
                    self.url
                );
            }
        }
        if self.variants.is_empty() {
            return Err(HlsError::malformed(format!(
                "{} has no playable variant",
                self.url
            )));
        }

        if let Some(container) = self.audio.first().map(|a| a.playlist.container()) {
            self.audio.retain(|a| a.playlist.container() == container);
        }
        Ok(())
    }

    /// Raw audio starts at zero while fragmented video starts after its
    /// header, so audio start times are shifted by the video target duration.
    fn align_audio(&self) {
        let Some(video) = self.variants.first() else {
            return;
        };
        let video_fragmented = video.playlist.container().is_fragmented();
        let offset = video.playlist.target_duration();
        for audio in &self.audio {
            if video_fragmented && !audio.playlist.container().is_fragmented() {
                audio.playlist.set_alignment_offset(offset);
            }
        }
    }

    /// Picks the variant with the highest bandwidth strictly below
    /// `measured` bits per second, or the lowest variant when none qualifies.
    pub fn select_by_bitrate(&self, measured: u64) -> Selection {
        let matched = self
            .variants
            .iter()
            .enumerate()
            .filter(|(_, v)| v.bandwidth < measured)
            .max_by_key(|(_, v)| v.bandwidth)
            .map(|(index, _)| index);
        if let Some(index) = matched {
            return Selection::Matched(index);
        }

        let lowest = self
            .variants
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.bandwidth)
            .map(|(index, _)| index)
            .unwrap_or_default();
        tracing::warn!("Measured bitrate {measured} is below every variant, using the lowest");
        Selection::Stalled(lowest)
    }

    /// Audio rendition of `group_id`.
    pub fn audio_for(&self, group_id: Option<&str>) -> Option<Arc<Playlist>> {
        let group_id = group_id?;
        self.audio
            .iter()
            .find(|a| a.group_id == group_id)
            .map(|a| a.playlist.clone())
    }
}
