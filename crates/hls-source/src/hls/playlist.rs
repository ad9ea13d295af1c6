use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use url::Url;

use super::parser::ParsedMedia;
use crate::{
    container::ContainerKind,
    error::{HlsError, HlsResult},
    util::file_name,
};

#[derive(Debug, Clone)]
struct Segment {
    url: Url,
    duration: f64,
    start: f64,
    discontinuity: bool,
}

/// Segment handed out by [`Playlist::next_segment`].
#[derive(Debug, Clone, PartialEq)]
pub struct NextSegment {
    pub url: Url,
    /// Start time in seconds, relative to the start of the playlist.
    pub start: f64,
    pub duration: f64,
    pub discontinuity: bool,
}

enum SeekTarget {
    Segment(usize),
    End(f64),
}

#[derive(Default)]
struct PlaylistState {
    segments: Vec<Segment>,
    target_duration: f64,
    is_live: bool,
    media_sequence: Option<u64>,
    /// Sequence advance announced by the last reload, consumed by the next
    /// appended segment.
    pending_prune: Option<u64>,
    next_start: f64,
    duration: f64,
    cursor: isize,
    force_discontinuity: bool,
    container: ContainerKind,
    has_header: bool,
    audio_group_id: Option<String>,
    alignment_offset: f64,
    /// Bumped by every live seek, a pending read started before it gives up.
    seek_generation: u64,
    closed: bool,
}

impl PlaylistState {
    fn header_len(&self) -> usize {
        usize::from(self.has_header)
    }

    fn push(
        &mut self,
        url: Url,
        duration: f64,
        discontinuity: bool,
        is_header: bool,
        dedup: bool,
    ) -> bool {
        if dedup {
            if !is_header {
                if let Some(advance) = self.pending_prune.take() {
                    self.prune(&url, advance);
                }
            }
            if self.segments.iter().any(|s| s.url == url) {
                return false;
            }
        }

        if self.segments.is_empty() {
            self.container = ContainerKind::from_uri(url.as_str());
            self.has_header = is_header || self.container.is_fragmented();
        }

        // the header carries no media
        if !(self.segments.is_empty() && self.has_header) {
            self.duration += duration;
        }
        self.segments.push(Segment {
            url,
            duration,
            start: self.next_start,
            discontinuity,
        });
        self.next_start += duration;
        true
    }

    /// Drops segments which scrolled out of the live window. `first_url` is
    /// the first uri announced by the reload.
    fn prune(&mut self, first_url: &Url, advance: u64) {
        let first = self.header_len();
        let available = self.segments.len().saturating_sub(first);
        let announced = self.segments.iter().skip(first).position(|s| &s.url == first_url);
        let count = match announced {
            Some(position) => position,
            None => usize::try_from(advance).unwrap_or(usize::MAX).min(available),
        };
        if count == 0 {
            return;
        }

        self.segments.drain(first..first + count);
        for _ in 0..count {
            if self.cursor >= first as isize {
                self.cursor -= 1;
            } else {
                self.force_discontinuity = true;
            }
        }
        tracing::debug!("pruned {count} segments from live playlist");
    }

    fn start_time(&self, index: usize) -> Option<f64> {
        let segment = self.segments.get(index)?;
        if index != 0 {
            Some(segment.start + self.alignment_offset)
        } else {
            Some(segment.start)
        }
    }

    /// Media sequence number of the entry at `index`.
    fn sequence_of(&self, index: isize) -> Option<u64> {
        let offset = u64::try_from(index - self.header_len() as isize).ok()?;
        Some(self.media_sequence? + offset)
    }

    fn end_time(&self) -> Option<f64> {
        self.segments.last().map(|s| s.start + s.duration)
    }

    fn advance(&mut self) -> Option<NextSegment> {
        let next = self.cursor + 1;
        let index = usize::try_from(next).ok()?;
        if index >= self.segments.len() {
            self.cursor = self.segments.len() as isize;
            return None;
        }

        self.cursor = next;
        let start = self.start_time(index)?;
        let segment = &self.segments[index];
        let discontinuity = std::mem::take(&mut self.force_discontinuity) || segment.discontinuity;
        Some(NextSegment {
            url: segment.url.clone(),
            start,
            duration: segment.duration,
            discontinuity,
        })
    }

    fn locate(&self, time: f64, bias: f64) -> HlsResult<SeekTarget> {
        let first = if self.container.is_fragmented() { 1 } else { 0 };
        let end = match self.end_time() {
            Some(end) if self.segments.len() > first => end,
            _ => return Err(HlsError::SeekOutOfRange(time)),
        };
        if time < 0. || time > end {
            return Err(HlsError::SeekOutOfRange(time));
        }

        let biased = time + bias;
        let found = self
            .segments
            .iter()
            .position(|s| s.start <= biased && biased < s.start + s.duration);
        let index = match found {
            Some(index) => index,
            None if time < end => self.segments.len() - 1,
            None => return Ok(SeekTarget::End(end)),
        };
        Ok(SeekTarget::Segment(index.max(first)))
    }

    fn seek(&mut self, time: f64, bias: f64, move_cursor: bool) -> HlsResult<f64> {
        if self.is_live {
            if time != 0. {
                return Err(HlsError::SeekUnsupported(time));
            }
            if move_cursor {
                self.cursor = if self.container.is_fragmented() { 0 } else { -1 };
                self.seek_generation += 1;
            }
            return Ok(0.);
        }

        match self.locate(time, bias)? {
            SeekTarget::Segment(index) => {
                if move_cursor {
                    self.cursor = index as isize - 1;
                }
                if time == 0. && self.container.is_fragmented() {
                    return Ok(0.);
                }
                self.start_time(index).ok_or(HlsError::SeekOutOfRange(time))
            }
            SeekTarget::End(end) => {
                if move_cursor {
                    self.cursor = self.segments.len() as isize - 1;
                }
                Ok(end)
            }
        }
    }
}

/// Segment list of a single rendition.
///
/// The playlist is shared between the session reading it and the loader
/// keeping it up to date, so every operation takes `&self`.
pub struct Playlist {
    url: Url,
    state: Mutex<PlaylistState>,
    notify: Notify,
}

impl Playlist {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            state: Mutex::new(PlaylistState {
                cursor: -1,
                ..Default::default()
            }),
            notify: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, PlaylistState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a freshly parsed copy of this playlist.
    pub fn merge(&self, parsed: ParsedMedia) {
        let added = {
            let mut state = self.state();
            state.target_duration = parsed.target_duration;
            let sequence = parsed.media_sequence;
            if let Some(previous) = state.media_sequence.filter(|p| *p != sequence) {
                state.pending_prune = Some(sequence.saturating_sub(previous));
            }
            state.media_sequence = Some(sequence);

            // a playlist which was live keeps ignoring known segments while it ends
            let was_live = state.is_live;
            let dedup = was_live || !parsed.end_list;
            state.is_live = !parsed.end_list;

            let mut added = 0usize;
            for segment in parsed.segments {
                if state.push(
                    segment.url,
                    segment.duration,
                    segment.discontinuity,
                    segment.is_header,
                    dedup,
                ) {
                    added += 1;
                }
            }
            state.pending_prune = None;
            // an ended live playlist must release its waiter
            added > 0 || (was_live && !state.is_live)
        };

        if added {
            self.notify.notify_one();
        }
    }

    /// Appends a single segment.
    ///
    /// Known uris are ignored on live playlists so reloading is idempotent.
    pub fn append(&self, url: Url, duration: f64, discontinuity: bool) {
        let added = {
            let mut state = self.state();
            let dedup = state.is_live;
            state.push(url, duration, discontinuity, false, dedup) && dedup
        };
        if added {
            self.notify.notify_one();
        }
    }

    /// Returns the segment after the cursor and moves the cursor onto it.
    ///
    /// On a live playlist this waits until the loader appends a new segment.
    /// `None` is returned once a static playlist is exhausted, when the
    /// playlist is closed, or when a seek rewinds a waiting live playlist.
    ///
    /// Dropping the future leaves the playlist untouched.
    pub async fn next_segment(&self) -> Option<NextSegment> {
        let mut generation = None;
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state();
                let started = *generation.get_or_insert(state.seek_generation);
                if state.is_live && (state.closed || state.seek_generation != started) {
                    return None;
                }

                let has_next = state.cursor + 1 < state.segments.len() as isize;
                if !state.is_live || has_next {
                    return state.advance();
                }
            }
            notified.await;
        }
    }

    /// Moves the cursor so the next segment covers `time`, in seconds.
    ///
    /// Returns the start time of that segment. Live playlists can only be
    /// rewound to their beginning.
    pub fn seek(&self, time: f64) -> HlsResult<f64> {
        let (result, release) = {
            let mut state = self.state();
            let bias = state.target_duration / 2.;
            let result = state.seek(time, bias, true);
            let release = state.is_live && result.is_ok();
            (result, release)
        };
        if release {
            self.notify.notify_one();
        }
        result
    }

    /// Start time `seek` would return, without moving the cursor.
    pub fn seek_start_time(&self, time: f64) -> HlsResult<f64> {
        let mut state = self.state();
        let bias = state.target_duration / 2.;
        state.seek(time, bias, false)
    }

    /// Start time `seek_containing` would return, without moving the cursor.
    pub fn containing_start_time(&self, time: f64) -> HlsResult<f64> {
        self.state().seek(time, 0., false)
    }

    /// Seeks onto the segment containing `time`, without rounding to the
    /// nearest boundary.
    pub fn seek_containing(&self, time: f64) -> HlsResult<f64> {
        let (result, release) = {
            let mut state = self.state();
            let result = state.seek(time, 0., true);
            let release = state.is_live && result.is_ok();
            (result, release)
        };
        if release {
            self.notify.notify_one();
        }
        result
    }

    /// Releases a pending live wait. Idempotent.
    pub fn close(&self) {
        let release = {
            let mut state = self.state();
            if !state.is_live || state.closed {
                false
            } else {
                state.closed = true;
                true
            }
        };
        if release {
            self.notify.notify_one();
        }
    }

    /// Puts the cursor before the segment named `name`, so it is read next.
    pub fn align_to(&self, name: &str) -> bool {
        let mut state = self.state();
        match state
            .segments
            .iter()
            .position(|s| file_name(s.url.as_str()) == name)
        {
            Some(index) => {
                state.cursor = index as isize - 1;
                true
            }
            None => false,
        }
    }

    /// Puts the cursor on the segment named `name`, so the one after it is
    /// read next.
    pub fn align_after(&self, name: &str) -> bool {
        let mut state = self.state();
        match state
            .segments
            .iter()
            .position(|s| file_name(s.url.as_str()) == name)
        {
            Some(index) => {
                state.cursor = index as isize;
                true
            }
            None => false,
        }
    }

    /// Puts the cursor before the segment with media sequence number
    /// `sequence`. Sequences before the window start at its first segment,
    /// sequences past it wait at the end.
    pub fn align_to_sequence(&self, sequence: u64) -> bool {
        let mut state = self.state();
        let Some(first) = state.media_sequence else {
            return false;
        };
        let header_len = state.header_len() as isize;
        let offset = isize::try_from(sequence.saturating_sub(first)).unwrap_or(isize::MAX);
        let last = state.segments.len() as isize - 1;
        state.cursor = (header_len.saturating_add(offset) - 1)
            .min(last)
            .max(header_len - 1);
        true
    }

    /// Media sequence number of the segment the next read returns.
    pub fn next_sequence(&self) -> Option<u64> {
        let state = self.state();
        state.sequence_of(state.cursor + 1)
    }

    /// Moves the cursor back so `url`, handed out by the last read, is
    /// returned again. Does nothing once the segment left the window.
    pub fn rewind_to(&self, url: &Url, discontinuity: bool) {
        let mut state = self.state();
        if let Some(index) = state.segments.iter().position(|s| &s.url == url) {
            state.cursor = index as isize - 1;
            state.force_discontinuity |= discontinuity;
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_live(&self) -> bool {
        self.state().is_live
    }

    pub fn target_duration(&self) -> f64 {
        self.state().target_duration
    }

    /// Total duration in seconds, unknown while the playlist is live.
    pub fn duration(&self) -> Option<f64> {
        let state = self.state();
        (!state.is_live).then_some(state.duration)
    }

    pub fn container(&self) -> ContainerKind {
        self.state().container
    }

    pub fn audio_group_id(&self) -> Option<String> {
        self.state().audio_group_id.clone()
    }

    pub fn set_audio_group_id(&self, group_id: Option<String>) {
        self.state().audio_group_id = group_id;
    }

    /// Shifts reported start times of every segment but the first, used to
    /// line raw audio up with fragmented video.
    pub fn set_alignment_offset(&self, offset: f64) {
        self.state().alignment_offset = offset;
    }

    pub fn cursor(&self) -> isize {
        self.state().cursor
    }

    pub fn set_cursor(&self, cursor: isize) {
        self.state().cursor = cursor.max(-1);
    }

    pub fn set_force_discontinuity(&self, value: bool) {
        self.state().force_discontinuity = value;
    }

    pub fn len(&self) -> usize {
        self.state().segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().segments.is_empty()
    }

    /// Container header, the first entry of a fragmented playlist.
    pub fn header_url(&self) -> Option<Url> {
        let state = self.state();
        if state.has_header {
            state.segments.first().map(|s| s.url.clone())
        } else {
            None
        }
    }

    /// Start time of the segment under the cursor.
    pub fn current_start_time(&self) -> Option<f64> {
        let state = self.state();
        let index = usize::try_from(state.cursor).ok()?;
        state.start_time(index)
    }

    /// Start time of the segment the next read returns.
    pub fn next_start_time(&self) -> Option<f64> {
        let state = self.state();
        let index = usize::try_from(state.cursor + 1).ok()?;
        state.start_time(index)
    }

    /// Url of the segment under the cursor.
    pub fn current_url(&self) -> Option<Url> {
        let state = self.state();
        let index = usize::try_from(state.cursor).ok()?;
        state.segments.get(index).map(|s| s.url.clone())
    }

    pub fn peek_next_url(&self) -> Option<Url> {
        let state = self.state();
        let index = usize::try_from(state.cursor + 1).ok()?;
        state.segments.get(index).map(|s| s.url.clone())
    }
}
