use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use url::Url;

use super::{
    parser::{ParsedPlaylist, PlaylistParser},
    playlist::Playlist,
    variant::{AudioExtMedia, ExtStreamInf, VariantPlaylist},
};
use crate::{
    context::HlsContext,
    error::{HlsError, HlsResult},
    source::ByteSource,
};

/// Result of the initial load.
#[derive(Clone)]
pub enum PlaylistTree {
    Media(Arc<Playlist>),
    Master(Arc<VariantPlaylist>),
}

pub type ReadySignal = oneshot::Receiver<HlsResult<PlaylistTree>>;

pub enum LoaderCommand {
    /// Reload this playlist instead of the current main playlist.
    ReloadMain(Arc<Playlist>),
    /// Reload this playlist instead of the current audio playlist.
    ReloadAudio(Arc<Playlist>),
    Exit,
}

/// Sending half of the loader command channel.
#[derive(Clone)]
pub struct LoaderCommands {
    sender: mpsc::UnboundedSender<LoaderCommand>,
}

impl LoaderCommands {
    // The loader may have exited already, which is fine for every command.
    fn send(&self, command: LoaderCommand) {
        let _ = self.sender.send(command);
    }

    pub fn reload_main(&self, playlist: Arc<Playlist>) {
        self.send(LoaderCommand::ReloadMain(playlist));
    }

    pub fn reload_audio(&self, playlist: Arc<Playlist>) {
        self.send(LoaderCommand::ReloadAudio(playlist));
    }

    pub fn exit(&self) {
        self.send(LoaderCommand::Exit);
    }
}

/// Owner of a running loader task. Dropping it stops the task.
pub struct LoaderHandle {
    commands: LoaderCommands,
}

impl LoaderHandle {
    pub fn commands(&self) -> LoaderCommands {
        self.commands.clone()
    }
}

impl Drop for LoaderHandle {
    fn drop(&mut self) {
        self.commands.exit();
    }
}

enum LoaderState {
    Init,
    ReloadPlaylist,
    Exit,
}

/// Background task loading the playlist tree, then keeping live playlists
/// fresh.
///
/// ```text
///            ┌──────┐  live   ┌────────────────┐
///  spawn ───►│ Init ├────────►│ ReloadPlaylist ├──┐ sleep, reload
///            └──┬───┘         └───────┬────────┘◄─┘
///               │ static/error        │ Exit / handle dropped
///               ▼                     ▼
///            ┌────────────────────────────┐
///            │            Exit            │
///            └────────────────────────────┘
/// ```
pub struct PlaylistLoader<S> {
    context: Arc<HlsContext<S>>,
    url: Url,
    commands: mpsc::UnboundedReceiver<LoaderCommand>,
    ready: Option<oneshot::Sender<HlsResult<PlaylistTree>>>,
    main: Option<Arc<Playlist>>,
    audio: Option<Arc<Playlist>>,
}

impl<S> PlaylistLoader<S>
where
    S: ByteSource,
{
    /// Spawns the loader on the current tokio runtime.
    pub fn spawn(context: Arc<HlsContext<S>>, url: Url) -> (LoaderHandle, ReadySignal) {
        let (sender, commands) = mpsc::unbounded_channel();
        let (ready_sender, ready) = oneshot::channel();
        let loader = Self {
            context,
            url,
            commands,
            ready: Some(ready_sender),
            main: None,
            audio: None,
        };
        tokio::spawn(loader.run());

        let handle = LoaderHandle {
            commands: LoaderCommands { sender },
        };
        (handle, ready)
    }

    async fn run(mut self) {
        let mut state = LoaderState::Init;
        loop {
            state = match state {
                LoaderState::Init => self.init().await,
                LoaderState::ReloadPlaylist => self.reload().await,
                LoaderState::Exit => break,
            };
        }
        tracing::debug!("Playlist loader for {} exited", self.url);
    }

    async fn init(&mut self) -> LoaderState {
        let result = self.load_tree().await;
        let next = match &result {
            Ok(_) if self.main.is_some() => LoaderState::ReloadPlaylist,
            Ok(_) => LoaderState::Exit,
            Err(e) => {
                tracing::error!("Failed to load {}: {e}", self.url);
                LoaderState::Exit
            }
        };

        if let Some(ready) = self.ready.take() {
            // the session may be gone already
            let _ = ready.send(result);
        }
        next
    }

    async fn load_tree(&mut self) -> HlsResult<PlaylistTree> {
        let source = &self.context.source;
        let text = source.fetch_text(&self.url).await?;
        let master = match PlaylistParser::parse(&text, &self.url)? {
            ParsedPlaylist::Media(media) => {
                let playlist = Arc::new(Playlist::new(self.url.clone()));
                playlist.merge(media);
                tracing::info!("Loaded media playlist {}", self.url);
                if playlist.is_live() {
                    self.main = Some(playlist.clone());
                }
                return Ok(PlaylistTree::Media(playlist));
            }
            ParsedPlaylist::Master(master) => master,
        };

        let mut variants = Vec::with_capacity(master.variants.len());
        for variant in master.variants {
            let playlist = Playlist::new(variant.url.clone());
            playlist.set_audio_group_id(variant.audio_group_id.clone());
            load_media_playlist(source, &playlist).await?;
            variants.push(ExtStreamInf {
                bandwidth: variant.bandwidth,
                audio_group_id: variant.audio_group_id,
                url: variant.url,
                playlist: Arc::new(playlist),
            });
        }

        let mut audio = Vec::with_capacity(master.audio.len());
        for media in master.audio {
            let playlist = Playlist::new(media.url.clone());
            load_media_playlist(source, &playlist).await?;
            audio.push(AudioExtMedia {
                group_id: media.group_id,
                url: media.url,
                playlist: Arc::new(playlist),
            });
        }

        let variants = VariantPlaylist::new(self.url.clone(), variants, audio)?;
        tracing::info!(
            "Loaded master playlist {} with {} variants and {} audio renditions",
            self.url,
            variants.variants().len(),
            variants.audio_media().len()
        );

        let initial = variants
            .playlist(self.context.options.initial_variant)
            .or_else(|| variants.playlist(0));
        if let Some(initial) = initial.filter(|p| p.is_live()) {
            self.audio = variants
                .audio_for(initial.audio_group_id().as_deref())
                .filter(|p| p.is_live());
            self.main = Some(initial);
        }
        Ok(PlaylistTree::Master(Arc::new(variants)))
    }

    async fn reload(&mut self) -> LoaderState {
        let Some(main) = self.main.clone() else {
            return LoaderState::Exit;
        };

        let deadline = Instant::now()
            + self
                .context
                .options
                .reload_interval(main.target_duration());
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                command = self.commands.recv() => match command {
                    Some(LoaderCommand::ReloadMain(playlist)) => self.main = Some(playlist),
                    Some(LoaderCommand::ReloadAudio(playlist)) => self.audio = Some(playlist),
                    Some(LoaderCommand::Exit) | None => return LoaderState::Exit,
                },
            }
        }

        for playlist in [self.main.clone(), self.audio.clone()].into_iter().flatten() {
            // transient failures are retried on the next tick
            if let Err(e) = load_media_playlist(&self.context.source, &playlist).await {
                tracing::warn!("Failed to reload {}: {e}", playlist.url());
            }
        }

        let main_live = self.main.as_ref().is_some_and(|p| p.is_live());
        let audio_live = self.audio.as_ref().is_some_and(|p| p.is_live());
        if main_live || audio_live {
            LoaderState::ReloadPlaylist
        } else {
            tracing::info!("Live playlist {} ended", self.url);
            LoaderState::Exit
        }
    }
}

/// Fetches `playlist` from its url and merges the result into it.
pub(crate) async fn load_media_playlist<S>(source: &S, playlist: &Playlist) -> HlsResult<()>
where
    S: ByteSource,
{
    let text = source.fetch_text(playlist.url()).await?;
    match PlaylistParser::parse(&text, playlist.url())? {
        ParsedPlaylist::Media(media) => {
            tracing::debug!(
                "Loaded {} segments from {}",
                media.segments.len(),
                playlist.url()
            );
            playlist.merge(media);
            Ok(())
        }
        ParsedPlaylist::Master(_) => Err(HlsError::malformed(format!(
            "{} is a master playlist nested in a master playlist",
            playlist.url()
        ))),
    }
}
