use std::time::Duration;

use hls_source::{
    hls::{ParsedPlaylist, Playlist, PlaylistParser, SessionState},
    HlsContext, HlsError, MemorySource, Property, StreamSession,
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

fn live_playlist(sequence: u64, segments: std::ops::Range<u64>, end: bool) -> String {
    let mut text = format!(
        "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:{sequence}\n"
    );
    for index in segments {
        text += &format!("#EXTINF:2,\ns{index}.ts\n");
    }
    if end {
        text += "#EXT-X-ENDLIST\n";
    }
    text
}

fn live_source(segments: u64) -> MemorySource {
    let source = MemorySource::new();
    source.mock("live.m3u8", live_playlist(0, 0..2, false));
    for index in 0..segments {
        source.mock(&format!("s{index}.ts"), format!("s{index}"));
    }
    source
}

#[tokio::test(start_paused = true)]
async fn test_live_read_waits_for_reload() -> anyhow::Result<()> {
    let source = live_source(4);
    let mut session = StreamSession::open(HlsContext::new(source.clone()), url("live.m3u8"));
    assert_eq!(session.property(Property::Duration).await?, -1);

    let mut starts = Vec::new();
    for _ in 0..2 {
        let segment = session.load_next_segment().await?.expect("segment");
        starts.push(segment.start);
    }

    // s0 scrolls out of the window
    source.mock("live.m3u8", live_playlist(1, 1..3, false));
    let segment = session.load_next_segment().await?.expect("reloaded segment");
    assert!(!segment.discontinuity);
    starts.push(segment.start);
    let current = session.current_playlist().expect("current playlist");
    assert_eq!(current.len(), 2);
    assert_eq!(current.cursor(), 1);

    source.mock("live.m3u8", live_playlist(2, 2..4, true));
    let segment = session.load_next_segment().await?.expect("last segment");
    starts.push(segment.start);

    assert_eq!(starts, vec![0., 2., 4., 6.]);
    assert!(!current.is_live());
    assert!(session.load_next_segment().await?.is_none());
    assert_eq!(session.state(), SessionState::Streaming);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_close_releases_blocked_read() -> anyhow::Result<()> {
    let source = live_source(2);
    let mut session = StreamSession::open(HlsContext::new(source), url("live.m3u8"));
    session.load_next_segment().await?.expect("first segment");
    session.load_next_segment().await?.expect("second segment");

    let closer = session.close_handle();
    let task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        closer.close();
    });

    assert!(session.load_next_segment().await?.is_none());
    task.await?;

    assert!(session.load_next_segment().await?.is_none());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.seek(Duration::ZERO).await,
        Err(HlsError::Closed)
    ));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_live_seek() -> anyhow::Result<()> {
    let source = live_source(2);
    let mut session = StreamSession::open(HlsContext::new(source), url("live.m3u8"));

    assert!(matches!(
        session.seek(Duration::from_secs(5)).await,
        Err(HlsError::SeekUnsupported(_))
    ));
    assert_eq!(session.seek(Duration::ZERO).await?, Duration::ZERO);
    let segment = session.load_next_segment().await?.expect("first segment");
    assert_eq!(segment.start, 0.);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_live_seek_after_abandoned_read() -> anyhow::Result<()> {
    let source = live_source(2);
    let mut session = StreamSession::open(HlsContext::new(source), url("live.m3u8"));
    session.load_next_segment().await?.expect("first segment");
    session.load_next_segment().await?.expect("second segment");

    // nothing new yet, the caller gives up waiting
    let load = tokio::time::timeout(Duration::from_millis(50), session.load_next_segment()).await;
    assert!(load.is_err());

    assert_eq!(session.seek(Duration::ZERO).await?, Duration::ZERO);
    let segment = session.load_next_segment().await?.expect("rewound segment");
    assert_eq!(segment.start, 0.);
    assert_eq!(read_segment(&mut session).await?, "s0");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_live_switch_at_window_edge() -> anyhow::Result<()> {
    let source = MemorySource::new();
    source.mock(
        "master.m3u8",
        "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1000
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=10000
high/index.m3u8
",
    );
    source.mock("low/index.m3u8", live_playlist(0, 0..1, false));
    source.mock("high/index.m3u8", live_playlist(0, 0..1, false));
    for name in ["low/s0.ts", "high/s0.ts", "high/s1.ts", "high/s2.ts"] {
        source.mock(name, name);
    }

    let mut session = StreamSession::open(HlsContext::new(source.clone()), url("master.m3u8"));
    let segment = session.load_next_segment().await?.expect("first segment");
    assert_eq!(segment.start, 0.);

    // s0 was the last announced segment and already left the high window
    source.mock("high/index.m3u8", live_playlist(1, 1..3, false));
    assert_eq!(read_segment(&mut session).await?, "low/s0.ts");
    let current = session.current_playlist().expect("current playlist");
    assert_eq!(current.url(), &url("high/index.m3u8"));

    let segment = session.load_next_segment().await?.expect("switched segment");
    assert!(segment.discontinuity);
    assert_eq!(read_segment(&mut session).await?, "high/s1.ts");

    Ok(())
}

fn merge(playlist: &Playlist, text: &str) -> anyhow::Result<()> {
    match PlaylistParser::parse(text, playlist.url())? {
        ParsedPlaylist::Media(media) => playlist.merge(media),
        ParsedPlaylist::Master(_) => anyhow::bail!("expected a media playlist"),
    }
    Ok(())
}

#[test]
fn test_pruning_keeps_cursor_on_segment() -> anyhow::Result<()> {
    const WINDOW: u64 = 5;

    for cursor in -1..WINDOW as isize {
        for advance in 0..=WINDOW + 2 {
            let playlist = Playlist::new(url("live.m3u8"));
            merge(&playlist, &live_playlist(0, 0..WINDOW, false))?;
            playlist.set_cursor(cursor);

            merge(
                &playlist,
                &live_playlist(advance, advance..advance + WINDOW, false),
            )?;

            let pruned = advance.min(WINDOW) as isize;
            assert_eq!(
                playlist.cursor(),
                (cursor - pruned).max(-1),
                "cursor {cursor} advance {advance}"
            );
            // the window keeps its size whatever the advance
            assert_eq!(playlist.len() as u64, WINDOW);
        }
    }

    Ok(())
}
