use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use bytes::Bytes;
use tokio::{io::AsyncReadExt, time::Instant};
use url::Url;

use super::{
    loader::{
        load_media_playlist, LoaderCommands, LoaderHandle, PlaylistLoader, PlaylistTree,
        ReadySignal,
    },
    playlist::Playlist,
    property::Property,
    variant::VariantPlaylist,
};
use crate::{
    container::ContainerKind,
    context::HlsContext,
    error::{HlsError, HlsResult},
    source::{ByteSource, SourceReader},
    util::file_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Streaming,
    Closed,
}

/// A segment opened by [`StreamSession::load_next_segment`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSegment {
    /// Bytes announced for the segment, including a container header sent
    /// ahead of it.
    pub length: u64,
    pub discontinuity: bool,
    /// Start time in seconds.
    pub start: f64,
}

impl LoadedSegment {
    /// Length reported to consumers, negative on a discontinuity.
    pub fn signed_length(&self) -> i64 {
        let length = i64::try_from(self.length).unwrap_or(i64::MAX);
        if self.discontinuity {
            -length
        } else {
            length
        }
    }
}

struct SwitchState {
    current: Arc<Playlist>,
    pending: Option<Arc<Playlist>>,
}

/// Hands a new playlist from a main session to its audio session, which
/// applies it once its current segment is exhausted.
#[derive(Clone)]
pub struct SwitchSlot {
    inner: Arc<Mutex<SwitchState>>,
}

impl SwitchSlot {
    fn new(current: Arc<Playlist>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SwitchState {
                current,
                pending: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SwitchState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces any pending switch. Offering the playlist in use cancels it.
    pub fn offer(&self, playlist: Arc<Playlist>) {
        let mut state = self.lock();
        if Arc::ptr_eq(&state.current, &playlist) {
            state.pending = None;
        } else {
            state.pending = Some(playlist);
        }
    }

    /// Playlist the audio session currently reads.
    pub fn current(&self) -> Arc<Playlist> {
        self.lock().current.clone()
    }

    fn take(&self) -> Option<Arc<Playlist>> {
        self.lock().pending.take()
    }

    fn set_current(&self, playlist: Arc<Playlist>) {
        self.lock().current = playlist;
    }
}

#[derive(Default)]
struct CloseShared {
    closed: AtomicBool,
    playlists: Mutex<Vec<Arc<Playlist>>>,
}

/// Closes a session from another task, releasing reads blocked on a live
/// playlist. A main session and its audio session share one.
#[derive(Clone)]
pub struct SessionCloser {
    shared: Arc<CloseShared>,
    commands: Option<LoaderCommands>,
}

impl SessionCloser {
    fn new(commands: Option<LoaderCommands>) -> Self {
        Self {
            shared: Default::default(),
            commands,
        }
    }

    fn playlists(&self) -> MutexGuard<'_, Vec<Arc<Playlist>>> {
        self.shared
            .playlists
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, playlists: impl IntoIterator<Item = Arc<Playlist>>) {
        let mut registered = self.playlists();
        for playlist in playlists {
            if self.is_closed() {
                playlist.close();
            }
            registered.push(playlist);
        }
    }

    pub fn close(&self) {
        let playlists = self.playlists();
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for playlist in playlists.iter() {
            playlist.close();
        }
        if let Some(commands) = &self.commands {
            commands.exit();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

/// Pull interface over an HLS playlist tree.
///
/// A session is driven by a single task: the consumer calls
/// [`load_next_segment`](Self::load_next_segment) then
/// [`read_next_block`](Self::read_next_block) until it returns `0`, and
/// repeats. Playlists are loaded and kept fresh by a background
/// [`PlaylistLoader`]; every operation waits for the initial load first.
///
/// When the master playlist declares alternate audio renditions, the main
/// session owns a second session reading the audio playlist. It can be
/// driven in place through [`audio_session_mut`](Self::audio_session_mut),
/// or moved to its own task with
/// [`take_audio_session`](Self::take_audio_session); in that case seeking it
/// is up to its new owner.
pub struct StreamSession<S> {
    context: Arc<HlsContext<S>>,
    state: SessionState,
    ready: Option<ReadySignal>,
    init_error: Option<Arc<HlsError>>,
    loader: Option<LoaderHandle>,
    commands: Option<LoaderCommands>,
    closer: SessionCloser,
    is_audio: bool,

    variants: Option<Arc<VariantPlaylist>>,
    current: Option<Arc<Playlist>>,
    audio: Option<Box<StreamSession<S>>>,
    switch_slot: Option<SwitchSlot>,
    has_audio_ext_stream: bool,
    bitrate_adjustable: bool,

    send_header: bool,
    header_reader: Option<SourceReader>,
    segment_reader: Option<SourceReader>,
    segment_bytes: u64,
    read_started: Option<Instant>,
    segment_start_after_seek: Option<f64>,
    duration_ms: i64,
}

impl<S> StreamSession<S>
where
    S: ByteSource,
{
    /// Starts loading `url` in the background. Must be called from within a
    /// tokio runtime.
    pub fn open(context: HlsContext<S>, url: Url) -> Self {
        let context = Arc::new(context);
        let (loader, ready) = PlaylistLoader::spawn(context.clone(), url);
        let commands = loader.commands();

        let closer = SessionCloser::new(Some(commands.clone()));
        let mut session = Self::with_context(context, closer);
        session.ready = Some(ready);
        session.loader = Some(loader);
        session.commands = Some(commands);
        session
    }

    fn with_context(context: Arc<HlsContext<S>>, closer: SessionCloser) -> Self {
        Self {
            context,
            state: SessionState::Uninitialized,
            ready: None,
            init_error: None,
            loader: None,
            commands: None,
            closer,
            is_audio: false,
            variants: None,
            current: None,
            audio: None,
            switch_slot: None,
            has_audio_ext_stream: false,
            bitrate_adjustable: false,
            send_header: false,
            header_reader: None,
            segment_reader: None,
            segment_bytes: 0,
            read_started: None,
            segment_start_after_seek: None,
            duration_ms: -1,
        }
    }

    fn audio_session(&self, playlist: Arc<Playlist>, duration_ms: i64) -> Self {
        let mut session = Self::with_context(self.context.clone(), self.closer.clone());
        session.state = SessionState::Ready;
        session.is_audio = true;
        session.commands = self.commands.clone();
        session.switch_slot = Some(SwitchSlot::new(playlist.clone()));
        session.duration_ms = duration_ms;
        session.set_current(playlist);
        session
    }

    fn set_current(&mut self, playlist: Arc<Playlist>) {
        // fragmented streams start with the header, sent along with the first segment
        if playlist.container().is_fragmented() {
            self.send_header = true;
            playlist.set_cursor(0);
        }
        self.current = Some(playlist);
    }

    async fn ensure_ready(&mut self) -> HlsResult<()> {
        if self.closer.is_closed() {
            self.close();
        }
        match self.state {
            SessionState::Closed => return Err(HlsError::Closed),
            SessionState::Ready | SessionState::Streaming => return Ok(()),
            SessionState::Uninitialized => {}
        }
        if let Some(error) = &self.init_error {
            return Err(HlsError::Init(error.clone()));
        }

        let tree = match self.ready.take() {
            Some(ready) => ready.await.unwrap_or(Err(HlsError::LoaderGone)),
            None => Err(HlsError::LoaderGone),
        };
        if let Err(e) = tree.and_then(|tree| self.initialize(tree)) {
            let error = Arc::new(e);
            self.init_error = Some(error.clone());
            return Err(HlsError::Init(error));
        }

        if self.closer.is_closed() {
            self.close();
            return Err(HlsError::Closed);
        }
        self.state = SessionState::Ready;
        Ok(())
    }

    fn initialize(&mut self, tree: PlaylistTree) -> HlsResult<()> {
        let variants = match tree {
            PlaylistTree::Media(playlist) => {
                self.closer.register([playlist.clone()]);
                self.duration_ms = duration_ms(playlist.duration());
                self.set_current(playlist);
                return Ok(());
            }
            PlaylistTree::Master(variants) => variants,
        };

        let current = variants
            .playlist(self.context.options.initial_variant)
            .or_else(|| variants.playlist(0))
            .ok_or_else(|| HlsError::malformed("master playlist without variants"))?;
        self.closer.register(
            variants
                .variants()
                .iter()
                .map(|v| v.playlist.clone())
                .chain(variants.audio_media().iter().map(|a| a.playlist.clone())),
        );
        self.bitrate_adjustable = self.context.options.adaptive_bitrate;
        self.has_audio_ext_stream = variants.has_audio_media();

        // separate audio and video may differ slightly, report the longest
        let mut duration = duration_ms(current.duration());
        let audio = variants
            .audio_for(current.audio_group_id().as_deref())
            .or_else(|| variants.audio_media().first().map(|a| a.playlist.clone()));
        if let Some(audio) = audio {
            duration = duration.max(duration_ms(audio.duration()));
            if audio.is_live() {
                if let Some(commands) = &self.commands {
                    commands.reload_audio(audio.clone());
                }
            }
            let session = self.audio_session(audio, duration);
            self.switch_slot = session.switch_slot.clone();
            self.audio = Some(Box::new(session));
        }

        tracing::info!("Playing {} ({:?})", current.url(), current.container());
        self.duration_ms = duration;
        self.variants = Some(variants);
        self.set_current(current);
        Ok(())
    }

    fn current(&self) -> HlsResult<Arc<Playlist>> {
        self.current.clone().ok_or(HlsError::Closed)
    }

    fn reset_readers(&mut self) {
        self.header_reader = None;
        self.segment_reader = None;
        self.read_started = None;
    }

    /// Reads the next block of the segment opened by the last
    /// [`load_next_segment`](Self::load_next_segment) call, container header
    /// first. Returns `0` once the segment is exhausted.
    pub async fn read_next_block(&mut self, buf: &mut [u8]) -> HlsResult<usize> {
        self.ensure_ready().await?;
        if self.header_reader.is_none() && self.segment_reader.is_none() {
            return Ok(0);
        }
        if self.bitrate_adjustable && self.read_started.is_none() {
            self.read_started = Some(Instant::now());
        }

        if let Some(header) = self.header_reader.as_mut() {
            let read = header.read(buf).await?;
            if read > 0 || buf.is_empty() {
                return Ok(read);
            }
            self.header_reader = None;
        }

        let Some(reader) = self.segment_reader.as_mut() else {
            return Ok(0);
        };
        let read = reader.read(buf).await?;
        if read > 0 || buf.is_empty() {
            self.segment_bytes += read as u64;
            return Ok(read);
        }

        self.segment_reader = None;
        if self.is_audio {
            self.apply_pending_switch().await;
        } else if self.bitrate_adjustable {
            self.adjust_bitrate().await;
        }
        Ok(0)
    }

    async fn adjust_bitrate(&mut self) {
        let Some(started) = self.read_started.take() else {
            return;
        };
        let (Some(variants), Some(current)) = (self.variants.clone(), self.current.clone()) else {
            return;
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        let measured = self.segment_bytes.saturating_mul(8000) / elapsed_ms;
        let selection = variants.select_by_bitrate(measured);
        let Some(next) = variants.playlist(selection.index()) else {
            return;
        };
        if Arc::ptr_eq(&next, &current) {
            return;
        }

        tracing::info!("Switching to {} after measuring {measured} bps", next.url());
        if let Err(e) = self.switch_playlist(&current, next.clone()).await {
            tracing::warn!("Failed to switch to {}: {e}", next.url());
            return;
        }

        if let Some(slot) = &self.switch_slot {
            if let Some(audio) = variants.audio_for(next.audio_group_id().as_deref()) {
                slot.offer(audio);
            }
        }
    }

    async fn apply_pending_switch(&mut self) {
        let Some(slot) = self.switch_slot.clone() else {
            return;
        };
        let (Some(next), Some(current)) = (slot.take(), self.current.clone()) else {
            return;
        };
        if Arc::ptr_eq(&next, &current) {
            return;
        }

        tracing::info!("Switching audio rendition to {}", next.url());
        match self.switch_playlist(&current, next.clone()).await {
            Ok(()) => slot.set_current(next),
            Err(e) => tracing::warn!("Failed to switch audio to {}: {e}", next.url()),
        }
    }

    /// Continues reading from `next` where `current` stopped.
    async fn switch_playlist(
        &mut self,
        current: &Arc<Playlist>,
        next: Arc<Playlist>,
    ) -> HlsResult<()> {
        if current.is_live() {
            let upcoming = current.peek_next_url();
            let reading = current.current_url();
            let sequence = current.next_sequence();
            load_media_playlist(&self.context.source, &next).await?;

            // at the live edge there is no upcoming segment, so line up on the
            // one just read, then on media sequence numbers
            let aligned = upcoming.is_some_and(|url| next.align_to(file_name(url.as_str())))
                || reading.is_some_and(|url| next.align_after(file_name(url.as_str())))
                || sequence.is_some_and(|sequence| next.align_to_sequence(sequence));
            if !aligned {
                next.set_cursor(current.cursor());
            }
            if let Some(commands) = &self.commands {
                if self.is_audio {
                    commands.reload_audio(next.clone());
                } else {
                    commands.reload_main(next.clone());
                }
            }
        } else {
            next.set_cursor(current.cursor());
        }

        next.set_force_discontinuity(true);
        if next.container().is_fragmented() {
            self.send_header = true;
        }
        self.current = Some(next);
        Ok(())
    }

    /// Opens the next segment, preceded by the container header when one is
    /// due. `None` once the playlist is exhausted or the session is closed.
    pub async fn load_next_segment(&mut self) -> HlsResult<Option<LoadedSegment>> {
        match self.ensure_ready().await {
            Err(HlsError::Closed) => return Ok(None),
            result => result?,
        }
        self.reset_readers();
        let current = self.current()?;

        let header = if self.send_header {
            let Some(url) = current.header_url() else {
                return Ok(None);
            };
            Some(url)
        } else {
            None
        };

        let Some(segment) = current.next_segment().await else {
            if current.container().is_fragmented() {
                self.send_header = true;
            }
            return Ok(None);
        };

        // nothing is committed until both header and segment are open, so a
        // failed load can be retried
        let (header_reader, segment_reader, length) =
            match open_segment(&self.context, header.as_ref(), &segment.url).await {
                Ok(opened) => opened,
                Err(e) => {
                    current.rewind_to(&segment.url, segment.discontinuity);
                    return Err(e);
                }
            };
        self.send_header = false;
        self.header_reader = header_reader;
        self.segment_reader = Some(segment_reader);
        self.segment_bytes = 0;
        self.state = SessionState::Streaming;

        tracing::debug!("Loaded {} ({length} bytes)", segment.url);
        Ok(Some(LoadedSegment {
            length,
            discontinuity: segment.discontinuity,
            start: segment.start,
        }))
    }

    /// Seeks to `position` and returns the start of the segment read next.
    ///
    /// With a separate audio rendition the video is moved onto the segment
    /// containing the audio boundary, and that boundary is returned so both
    /// streams start at the same time.
    pub async fn seek(&mut self, position: Duration) -> HlsResult<Duration> {
        self.ensure_ready().await?;
        let start = self.seek_current(position.as_secs_f64())?;
        Ok(Duration::from_secs_f64(start.max(0.)))
    }

    fn seek_current(&mut self, time: f64) -> HlsResult<f64> {
        let current = self.current()?;
        self.reset_readers();

        let audio_slot = self.switch_slot.clone().filter(|_| !self.is_audio);
        if let (Some(slot), true) = (audio_slot, time != 0.) {
            let boundary = slot.current().seek_start_time(time)?;
            // both targets are checked before either stream moves
            current.containing_start_time(boundary)?;
            if let Some(audio) = self.audio.as_mut() {
                audio.seek_current(time)?;
            }
            current.seek_containing(boundary)?;
            self.segment_start_after_seek = Some(boundary);
            return Ok(boundary);
        }

        current.seek_start_time(time)?;
        if let Some(audio) = self.audio.as_mut() {
            audio.seek_current(time)?;
        }
        let start = current.seek(time)?;
        self.segment_start_after_seek = current.next_start_time();
        Ok(start)
    }

    /// Answers a property query of the pull interface.
    pub async fn property(&mut self, property: Property) -> HlsResult<i64> {
        self.ensure_ready().await?;
        let value = match property {
            Property::Duration => self.duration_ms,
            Property::HlsMode => 1,
            Property::MimeType => self.container().mime_type_code(),
            Property::LoadSegment => self
                .load_next_segment()
                .await?
                .map_or(-1, |segment| segment.signed_length()),
            Property::SegmentStartTime => self
                .take_segment_start_time()
                .map_or(-1, |start| start.as_millis() as i64),
            Property::HasAudioExtStream => i64::from(self.has_audio_ext_stream),
        };
        Ok(value)
    }

    /// Start of the segment being read. Right after a seek this is the start
    /// computed by the seek, reported once.
    pub fn take_segment_start_time(&mut self) -> Option<Duration> {
        let start = match self.segment_start_after_seek.take() {
            Some(start) => start,
            None => self.current.as_ref()?.current_start_time()?,
        };
        (start >= 0.).then(|| Duration::from_secs_f64(start))
    }

    /// Duration in milliseconds, `-1` when unknown.
    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    pub fn container(&self) -> ContainerKind {
        self.current
            .as_ref()
            .map(|p| p.container())
            .unwrap_or_default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn block_size(&self) -> usize {
        self.context.options.block_size
    }

    pub fn is_audio(&self) -> bool {
        self.is_audio
    }

    pub fn has_audio_stream(&self) -> bool {
        self.has_audio_ext_stream
    }

    pub fn current_playlist(&self) -> Option<Arc<Playlist>> {
        self.current.clone()
    }

    pub fn variants(&self) -> Option<&VariantPlaylist> {
        self.variants.as_deref()
    }

    pub fn audio_session_mut(&mut self) -> Option<&mut StreamSession<S>> {
        self.audio.as_deref_mut()
    }

    pub fn take_audio_session(&mut self) -> Option<StreamSession<S>> {
        self.audio.take().map(|audio| *audio)
    }

    /// Waits for the initial playlist load without reading anything.
    pub async fn wait_ready(&mut self) -> HlsResult<()> {
        self.ensure_ready().await
    }

    pub fn close(&mut self) {
        self.reset_readers();
        self.closer.close();
        if let Some(audio) = self.audio.as_mut() {
            audio.close();
        }
        self.loader = None;
        self.state = SessionState::Closed;
    }

    pub fn close_handle(&self) -> SessionCloser {
        self.closer.clone()
    }
}

fn duration_ms(duration: Option<f64>) -> i64 {
    duration.map_or(-1, |seconds| (seconds * 1000.) as i64)
}

async fn open_header<S>(context: &HlsContext<S>, url: &Url) -> HlsResult<(SourceReader, u64)>
where
    S: ByteSource,
{
    let Some(cache) = context.header_cache() else {
        return open_sized(&context.source, url).await;
    };

    let data = match cache.get(url) {
        Some(data) => data,
        None => {
            let data = Bytes::from(context.source.open(url).await?.read_to_end().await?);
            cache.put(url.clone(), data.clone());
            data
        }
    };
    let length = data.len() as u64;
    Ok((Box::new(Cursor::new(data)), length))
}

/// Opens a segment and the header due ahead of it. The length covers both.
async fn open_segment<S>(
    context: &HlsContext<S>,
    header: Option<&Url>,
    url: &Url,
) -> HlsResult<(Option<SourceReader>, SourceReader, u64)>
where
    S: ByteSource,
{
    let (header, header_length) = match header {
        Some(header) => {
            let (reader, length) = open_header(context, header).await?;
            (Some(reader), length)
        }
        None => (None, 0),
    };
    let (reader, length) = open_sized(&context.source, url).await?;
    Ok((header, reader, header_length + length))
}

/// Opens `url` with a known length. Bodies announced without one are read
/// up front, a segment length is always reported.
async fn open_sized<S>(source: &S, url: &Url) -> HlsResult<(SourceReader, u64)>
where
    S: ByteSource,
{
    let opened = source.open(url).await?;
    if let Some(length) = opened.content_length {
        return Ok((opened.reader, length));
    }

    tracing::debug!("{url} has no content length, buffering it");
    let data = Bytes::from(opened.read_to_end().await?);
    let length = data.len() as u64;
    Ok((Box::new(Cursor::new(data)), length))
}
