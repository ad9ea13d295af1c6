mod config;

use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use clap::Parser;
use config::Config;
use fake_user_agent::get_chrome_rua;
use hls_source::{
    util::http::HttpClient, DefaultSource, HlsContext, HttpSource, MemoryResultCache,
    StreamSession,
};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder, Url,
};
use tokio::{fs::File, io::AsyncWriteExt};

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct PullArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,

    /// Configuration file in TOML format
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Output file path
    #[clap(short, long, default_value = "./output.ts")]
    output: PathBuf,

    /// Output file path of the separate audio rendition
    ///
    /// Defaults to the output path with an `.audio` extension appended.
    #[clap(long)]
    audio_output: Option<PathBuf>,

    /// Cookies used to download
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP Header used to download
    ///
    /// Custom header. eg. "User-Agent: xxxxx".
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Index of the variant to start with
    #[clap(long)]
    variant: Option<usize>,

    /// Stay on the initial variant
    #[clap(long)]
    no_adaptive: bool,

    /// Start position in seconds
    #[clap(long)]
    start: Option<f64>,

    /// m3u8 url or file path
    m3u8: String,
}

impl PullArgs {
    fn client(&self, config: &Config) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for header in config.headers.iter().chain(&self.headers) {
            let (key, value) = header
                .split_once(':')
                .with_context(|| format!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }

        let builder = ClientBuilder::new()
            .default_headers(headers)
            .user_agent(get_chrome_rua())
            .timeout(Duration::from_secs(60));
        Ok(HttpClient::new(builder)?)
    }

    fn url(&self) -> anyhow::Result<Url> {
        if let Ok(url) = Url::parse(&self.m3u8) {
            return Ok(url);
        }
        let path = PathBuf::from(&self.m3u8).canonicalize()?;
        Url::from_file_path(&path)
            .map_err(|_| anyhow::anyhow!("Invalid playlist path: {}", path.display()))
    }

    fn audio_output(&self) -> PathBuf {
        self.audio_output.clone().unwrap_or_else(|| {
            let mut path = self.output.clone().into_os_string();
            path.push(".audio");
            path.into()
        })
    }
}

async fn pull(mut session: StreamSession<DefaultSource>, output: PathBuf) -> anyhow::Result<u64> {
    let mut file = File::create(&output).await?;
    let mut buf = vec![0u8; session.block_size()];
    let mut written = 0;

    while let Some(segment) = session.load_next_segment().await? {
        if segment.discontinuity {
            tracing::info!("Discontinuity at {:.3}s in {}", segment.start, output.display());
        }
        loop {
            let read = session.read_next_block(&mut buf).await?;
            if read == 0 {
                break;
            }
            file.write_all(&buf[..read]).await?;
            written += read as u64;
        }
    }

    file.flush().await?;
    Ok(written)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = PullArgs::parse();

    let default_level = if args.verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(file) => Config::load(file)?,
        None => Config::default(),
    };
    if let Some(variant) = args.variant {
        config.hls.initial_variant = variant;
    }
    if args.no_adaptive {
        config.hls.adaptive_bitrate = false;
    }

    let url = args.url()?;
    let client = args.client(&config)?;
    if let Some(cookies) = args.cookies.as_ref().or(config.cookies.as_ref()) {
        let cookies = cookies.split(';').map(|c| c.trim().to_string()).collect();
        client.add_cookies(cookies, url.clone())?;
    }

    let context = HlsContext::new(DefaultSource::new(HttpSource::new(client)))
        .with_cache(std::sync::Arc::new(MemoryResultCache::new()))
        .with_options(config.hls.clone());
    let mut session = StreamSession::open(context, url);
    session.wait_ready().await?;
    tracing::info!("Duration: {}ms", session.duration_ms());

    if let Some(start) = args.start {
        let position = session.seek(Duration::from_secs_f64(start.max(0.))).await?;
        tracing::info!("Starting at {:.3}s", position.as_secs_f64());
    }

    let closer = session.close_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, closing the session");
            closer.close();
        }
    });

    let audio = session
        .take_audio_session()
        .map(|audio| tokio::spawn(pull(audio, args.audio_output())));

    let written = pull(session, args.output.clone()).await?;
    tracing::info!("Wrote {written} bytes to {}", args.output.display());
    if let Some(audio) = audio {
        let written = audio.await??;
        tracing::info!("Wrote {written} audio bytes to {}", args.audio_output().display());
    }

    Ok(())
}
