use m3u8_rs::{AlternativeMediaType, MasterPlaylist, MediaPlaylist, Playlist};
use url::Url;

use crate::{
    error::{HlsError, HlsResult},
    util::resolve_location,
};

const FORMAT_MARKER: &str = "#EXTM3U";

/// One entry of a media playlist, with its uri already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSegment {
    pub url: Url,
    pub duration: f64,
    pub discontinuity: bool,
    /// Entry created from `#EXT-X-MAP`, carrying the container header.
    pub is_header: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMedia {
    pub target_duration: f64,
    pub media_sequence: u64,
    pub end_list: bool,
    pub segments: Vec<ParsedSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVariant {
    pub url: Url,
    pub bandwidth: u64,
    pub audio_group_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAudioMedia {
    pub group_id: String,
    pub url: Url,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMaster {
    pub variants: Vec<ParsedVariant>,
    pub audio: Vec<ParsedAudioMedia>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPlaylist {
    Media(ParsedMedia),
    Master(ParsedMaster),
}

/// Turns `.m3u8` text into playlists with resolved urls.
///
/// Tags are parsed by `m3u8-rs`. On top of it the playlist must start with
/// `#EXTM3U`, `#EXT-X-MAP` becomes a header entry ahead of the segments it
/// applies to, and only audio renditions that can be picked automatically are
/// kept.
pub struct PlaylistParser<'a> {
    base: &'a Url,
}

impl<'a> PlaylistParser<'a> {
    pub fn parse(text: &str, base: &'a Url) -> HlsResult<ParsedPlaylist> {
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if text.lines().next().map(str::trim) != Some(FORMAT_MARKER) {
            return Err(HlsError::malformed(format!(
                "{base} does not start with {FORMAT_MARKER}"
            )));
        }

        let parsed = m3u8_rs::parse_playlist_res(text.as_bytes())
            .map_err(|e| HlsError::malformed(format!("failed to parse {base}: {e}")))?;
        let parser = PlaylistParser { base };
        match parsed {
            Playlist::MediaPlaylist(media) => parser.media(media).map(ParsedPlaylist::Media),
            Playlist::MasterPlaylist(master) => parser.master(master).map(ParsedPlaylist::Master),
        }
    }

    fn media(&self, playlist: MediaPlaylist) -> HlsResult<ParsedMedia> {
        let target_duration = playlist.target_duration as f64;
        let mut segments = Vec::with_capacity(playlist.segments.len() + 1);
        let mut header: Option<String> = None;
        for segment in playlist.segments {
            if let Some(map) = segment.map {
                if header.as_deref() != Some(map.uri.as_str()) {
                    segments.push(ParsedSegment {
                        url: self.resolve(&map.uri)?,
                        duration: target_duration,
                        discontinuity: true,
                        is_header: true,
                    });
                    header = Some(map.uri);
                }
            }

            segments.push(ParsedSegment {
                url: self.resolve(&segment.uri)?,
                duration: seconds(segment.duration),
                discontinuity: segment.discontinuity,
                is_header: false,
            });
        }

        Ok(ParsedMedia {
            target_duration,
            media_sequence: playlist.media_sequence,
            end_list: playlist.end_list,
            segments,
        })
    }

    fn master(&self, playlist: MasterPlaylist) -> HlsResult<ParsedMaster> {
        let mut variants = Vec::with_capacity(playlist.variants.len());
        for variant in playlist.variants {
            if variant.is_i_frame {
                continue;
            }
            variants.push(ParsedVariant {
                url: self.resolve(&variant.uri)?,
                bandwidth: variant.bandwidth,
                audio_group_id: variant.audio,
            });
        }

        let mut audio = Vec::new();
        for media in playlist.alternatives {
            if !matches!(media.media_type, AlternativeMediaType::Audio) {
                continue;
            }
            // Renditions which are neither default nor auto-selectable can only be
            // chosen manually, which is not supported. Audio without uri is muxed
            // into the variant streams.
            let Some(uri) = media.uri.filter(|_| media.default || media.autoselect) else {
                continue;
            };
            audio.push(ParsedAudioMedia {
                group_id: media.group_id,
                url: self.resolve(&uri)?,
            });
        }

        Ok(ParsedMaster { variants, audio })
    }

    fn resolve(&self, location: &str) -> HlsResult<Url> {
        resolve_location(self.base, location)
    }
}

/// Widens an `#EXTINF` duration through its shortest decimal form, so
/// `9.009` stays `9.009` instead of the nearest `f32`.
fn seconds(duration: f32) -> f64 {
    duration.to_string().parse().unwrap_or(f64::from(duration))
}
