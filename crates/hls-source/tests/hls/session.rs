use std::time::Duration;

use hls_source::{
    hls::SessionState, ContainerKind, HlsContext, HlsError, HlsOptions, MemorySource, Property,
    StreamSession,
};

use crate::hls::{url, HlsMock};

async fn read_segment(session: &mut StreamSession<MemorySource>) -> anyhow::Result<String> {
    let mut data = Vec::new();
    let mut buf = vec![0u8; session.block_size()];
    loop {
        let read = session.read_next_block(&mut buf).await?;
        if read == 0 {
            break;
        }
        data.extend_from_slice(&buf[..read]);
    }
    Ok(String::from_utf8(data)?)
}

fn two_variant_master(source: &MemorySource) {
    source.mock(
        "master.m3u8",
        "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=500000
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1500000
high/index.m3u8
",
    );
    let segments = [("0.ts", 10.), ("1.ts", 10.), ("2.ts", 10.)];
    source.mock_media("low/index.m3u8", 10, &segments);
    source.mock_media("high/index.m3u8", 10, &segments);
}

#[tokio::test]
async fn test_master_duration() -> anyhow::Result<()> {
    let source = MemorySource::new();
    two_variant_master(&source);

    let mut session = StreamSession::open(HlsContext::new(source), url("master.m3u8"));
    assert_eq!(session.property(Property::Duration).await?, 30000);
    assert_eq!(session.property(Property::MimeType).await?, 1);
    assert_eq!(session.property(Property::HasAudioExtStream).await?, 0);
    assert_eq!(session.variants().map(|v| v.variants().len()), Some(2));

    Ok(())
}

#[tokio::test]
async fn test_initial_variant_option() -> anyhow::Result<()> {
    let source = MemorySource::new();
    two_variant_master(&source);

    let options = HlsOptions::default()
        .with_initial_variant(1)
        .with_adaptive_bitrate(false);
    let context = HlsContext::new(source).with_options(options);
    let mut session = StreamSession::open(context, url("master.m3u8"));

    session.load_next_segment().await?;
    assert_eq!(read_segment(&mut session).await?, "0.ts");
    let current = session.current_playlist().expect("current playlist");
    assert_eq!(current.url(), &url("high/index.m3u8"));

    Ok(())
}

#[tokio::test]
async fn test_seek_then_read_in_order() -> anyhow::Result<()> {
    let source = MemorySource::new();
    source.mock_media(
        "index.m3u8",
        6,
        &[
            ("a.ts", 6.),
            ("b.ts", 6.),
            ("c.ts", 6.),
            ("d.ts", 6.),
            ("e.ts", 2.),
        ],
    );

    let mut session = StreamSession::open(HlsContext::new(source), url("index.m3u8"));
    assert_eq!(session.seek(Duration::from_secs(7)).await?, Duration::from_secs(6));

    let mut starts = Vec::new();
    let mut bodies = Vec::new();
    while let Some(segment) = session.load_next_segment().await? {
        starts.push(segment.start);
        bodies.push(read_segment(&mut session).await?);
    }
    assert_eq!(starts, vec![6., 12., 18., 24.]);
    assert_eq!(bodies, vec!["b.ts", "c.ts", "d.ts", "e.ts"]);

    assert!(matches!(
        session.seek(Duration::from_secs(60)).await,
        Err(HlsError::SeekOutOfRange(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_fragmented_seek_to_start() -> anyhow::Result<()> {
    let source = MemorySource::new();
    source.mock(
        "index.m3u8",
        include_str!("../fixtures/hls/fmp4-media-playlist.m3u8"),
    );
    for name in ["init.mp4", "segment1.m4s", "segment2.m4s", "segment3.m4s", "segment4.m4s"] {
        source.mock(name, name);
    }

    let mut session = StreamSession::open(HlsContext::new(source), url("index.m3u8"));
    assert_eq!(session.property(Property::Duration).await?, 13500);
    assert_eq!(session.container(), ContainerKind::FragmentedMp4);
    assert_eq!(session.property(Property::MimeType).await?, 3);

    assert_eq!(session.seek(Duration::ZERO).await?, Duration::ZERO);
    // the first media segment starts after the header
    assert_eq!(session.property(Property::SegmentStartTime).await?, 4000);

    let length = session.property(Property::LoadSegment).await?;
    assert_eq!(length, ("init.mp4".len() + "segment1.m4s".len()) as i64);
    assert_eq!(read_segment(&mut session).await?, "init.mp4segment1.m4s");
    assert_eq!(session.property(Property::SegmentStartTime).await?, 4000);

    Ok(())
}

#[tokio::test]
async fn test_paired_audio_seek() -> anyhow::Result<()> {
    let source = MemorySource::new();
    source.mock(
        "master.m3u8",
        "#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"main\",DEFAULT=YES,URI=\"audio/index.m3u8\"
#EXT-X-STREAM-INF:BANDWIDTH=800000,AUDIO=\"aud\"
video/index.m3u8
",
    );
    source.mock_media(
        "video/index.m3u8",
        6,
        &[
            ("v0.ts", 6.),
            ("v1.ts", 6.),
            ("v2.ts", 6.),
            ("v3.ts", 6.),
            ("v4.ts", 6.),
        ],
    );
    source.mock_media(
        "audio/index.m3u8",
        10,
        &[("a0.aac", 10.), ("a1.aac", 10.), ("a2.aac", 10.)],
    );

    let mut session = StreamSession::open(HlsContext::new(source), url("master.m3u8"));
    assert_eq!(session.property(Property::HasAudioExtStream).await?, 1);
    assert_eq!(session.property(Property::Duration).await?, 30000);

    assert_eq!(
        session.seek(Duration::from_secs(23)).await?,
        Duration::from_secs(20)
    );
    assert_eq!(session.property(Property::SegmentStartTime).await?, 20000);

    let audio = session.audio_session_mut().expect("audio session");
    assert!(audio.is_audio());
    assert_eq!(audio.duration_ms(), 30000);
    assert_eq!(audio.property(Property::SegmentStartTime).await?, 20000);
    let segment = audio.load_next_segment().await?.expect("audio segment");
    assert_eq!(segment.start, 20.);
    assert_eq!(read_segment(audio).await?, "a2.aac");

    // video continues from the segment containing the audio boundary
    let segment = session.load_next_segment().await?.expect("video segment");
    assert_eq!(segment.start, 18.);
    assert_eq!(read_segment(&mut session).await?, "v3.ts");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_bitrate_switch() -> anyhow::Result<()> {
    let source = MemorySource::new();
    source.mock(
        "master.m3u8",
        "#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"a1\",NAME=\"low\",DEFAULT=YES,URI=\"a1/index.m3u8\"
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"a2\",NAME=\"mid\",DEFAULT=YES,URI=\"a2/index.m3u8\"
#EXT-X-STREAM-INF:BANDWIDTH=1000,AUDIO=\"a1\"
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=20000,AUDIO=\"a2\"
mid/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=100000000,AUDIO=\"a2\"
high/index.m3u8
",
    );
    let segments = [("0.ts", 4.), ("1.ts", 4.), ("2.ts", 4.)];
    source.mock_media("low/index.m3u8", 4, &segments);
    source.mock_media("mid/index.m3u8", 4, &segments);
    source.mock_media("high/index.m3u8", 4, &segments);
    let audio = [("0.aac", 4.), ("1.aac", 4.), ("2.aac", 4.)];
    source.mock_media("a1/index.m3u8", 4, &audio);
    source.mock_media("a2/index.m3u8", 4, &audio);

    let mut session = StreamSession::open(HlsContext::new(source), url("master.m3u8"));
    let segment = session.load_next_segment().await?.expect("first segment");
    assert!(!segment.discontinuity);
    assert_eq!(read_segment(&mut session).await?, "0.ts");

    // the clock is paused, so 4 bytes count as 32000 bps
    let current = session.current_playlist().expect("current playlist");
    assert_eq!(current.url(), &url("mid/index.m3u8"));

    let segment = session.load_next_segment().await?.expect("second segment");
    assert!(segment.discontinuity);
    assert!(segment.signed_length() < 0);
    assert_eq!(segment.start, 4.);
    assert_eq!(read_segment(&mut session).await?, "1.ts");

    // audio follows at its own segment boundary
    let audio = session.audio_session_mut().expect("audio session");
    let segment = audio.load_next_segment().await?.expect("first audio segment");
    assert!(!segment.discontinuity);
    assert_eq!(read_segment(audio).await?, "0.aac");
    let current = audio.current_playlist().expect("audio playlist");
    assert_eq!(current.url(), &url("a2/index.m3u8"));
    let segment = audio.load_next_segment().await?.expect("second audio segment");
    assert!(segment.discontinuity);
    assert_eq!(segment.start, 4.);

    Ok(())
}

#[tokio::test]
async fn test_paired_seek_past_video_keeps_audio() -> anyhow::Result<()> {
    let source = MemorySource::new();
    source.mock(
        "master.m3u8",
        "#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"main\",DEFAULT=YES,URI=\"audio/index.m3u8\"
#EXT-X-STREAM-INF:BANDWIDTH=800000,AUDIO=\"aud\"
video/index.m3u8
",
    );
    source.mock_media(
        "video/index.m3u8",
        6,
        &[("v0.ts", 6.), ("v1.ts", 6.), ("v2.ts", 6.), ("v3.ts", 6.)],
    );
    source.mock_media(
        "audio/index.m3u8",
        10,
        &[("a0.aac", 10.), ("a1.aac", 10.), ("a2.aac", 10.), ("a3.aac", 10.)],
    );

    let mut session = StreamSession::open(HlsContext::new(source), url("master.m3u8"));
    assert_eq!(session.property(Property::Duration).await?, 40000);

    // the audio boundary at 30s is past the end of the video
    assert!(matches!(
        session.seek(Duration::from_secs(35)).await,
        Err(HlsError::SeekOutOfRange(_))
    ));

    let audio = session.audio_session_mut().expect("audio session");
    let segment = audio.load_next_segment().await?.expect("audio segment");
    assert_eq!(segment.start, 0.);
    assert_eq!(read_segment(audio).await?, "a0.aac");

    let segment = session.load_next_segment().await?.expect("video segment");
    assert_eq!(segment.start, 0.);
    assert_eq!(read_segment(&mut session).await?, "v0.ts");

    Ok(())
}

#[tokio::test]
async fn test_malformed_master() -> anyhow::Result<()> {
    let source = MemorySource::new();
    source.mock(
        "master.m3u8",
        "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=500000
low/index.m3u8
",
    );
    source.mock("low/index.m3u8", "<html>not found</html>");

    let mut session = StreamSession::open(HlsContext::new(source), url("master.m3u8"));
    let error = session.load_next_segment().await.unwrap_err();
    let HlsError::Init(inner) = error else {
        anyhow::bail!("expected an init error, got {error}");
    };
    assert!(matches!(*inner, HlsError::MalformedPlaylist(_)));
    assert!(!inner.is_transport());
    assert_eq!(session.state(), SessionState::Uninitialized);

    Ok(())
}
