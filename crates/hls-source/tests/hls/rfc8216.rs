use std::sync::Arc;

use hls_source::{
    hls::{ParsedPlaylist, PlaylistLoader, PlaylistParser, PlaylistTree},
    HlsContext, HttpSource,
};
use url::Url;

use crate::hls::setup_mock_server;

#[tokio::test]
async fn rfc8216_8_1_simple_media_playlist() -> anyhow::Result<()> {
    let data = include_str!("../fixtures/hls/rfc8216/8-1-simple-media-playlist.m3u8");
    let (uri, _server) = setup_mock_server(data).await;

    let context = Arc::new(HlsContext::new(HttpSource::default()));
    let (_loader, ready) = PlaylistLoader::spawn(context, uri.parse()?);
    let PlaylistTree::Media(playlist) = ready.await?? else {
        anyhow::bail!("expected a media playlist");
    };

    assert!(!playlist.is_live());
    assert_eq!(playlist.len(), 3);
    assert_eq!(playlist.target_duration(), 10.);
    let duration = playlist.duration().unwrap_or_default();
    assert!((duration - 21.021).abs() < 1e-9);

    let first = playlist.next_segment().await.expect("first segment");
    assert_eq!(first.url, "http://media.example.com/first.ts".parse()?);
    assert_eq!(first.start, 0.);
    let second = playlist.next_segment().await.expect("second segment");
    assert_eq!(second.url, "http://media.example.com/second.ts".parse()?);
    assert_eq!(second.start, 9.009);
    let third = playlist.next_segment().await.expect("third segment");
    assert_eq!(third.url, "http://media.example.com/third.ts".parse()?);
    assert!(playlist.next_segment().await.is_none());

    Ok(())
}

#[tokio::test]
async fn rfc8216_8_2_live_media_playlist_using_https() -> anyhow::Result<()> {
    let data = include_str!("../fixtures/hls/rfc8216/8-2-live-media-playlist-using-https.m3u8");
    let (uri, _server) = setup_mock_server(data).await;

    let context = Arc::new(HlsContext::new(HttpSource::default()));
    let (loader, ready) = PlaylistLoader::spawn(context, uri.parse()?);
    let PlaylistTree::Media(playlist) = ready.await?? else {
        anyhow::bail!("expected a media playlist");
    };

    assert!(playlist.is_live());
    assert_eq!(playlist.duration(), None);
    assert_eq!(playlist.len(), 3);
    assert_eq!(
        playlist.peek_next_url(),
        Some("https://priv.example.com/fileSequence2680.ts".parse()?)
    );
    drop(loader);

    Ok(())
}

#[test]
fn rfc8216_8_4_master_playlist() -> anyhow::Result<()> {
    let data = include_str!("../fixtures/hls/rfc8216/8-4-master-playlist.m3u8");
    let base: Url = "http://example.com/master.m3u8".parse()?;
    let ParsedPlaylist::Master(master) = PlaylistParser::parse(data, &base)? else {
        anyhow::bail!("expected a master playlist");
    };

    let bandwidths: Vec<_> = master.variants.iter().map(|v| v.bandwidth).collect();
    assert_eq!(bandwidths, vec![1280000, 2560000, 7680000, 65000]);
    assert_eq!(master.variants[0].url, "http://example.com/low.m3u8".parse()?);
    assert_eq!(
        master.variants[3].url,
        "http://example.com/audio-only.m3u8".parse()?
    );
    assert!(master.variants.iter().all(|v| v.audio_group_id.is_none()));
    assert!(master.audio.is_empty());

    Ok(())
}

#[test]
fn rfc8216_8_6_master_playlist_with_alternative_audio() -> anyhow::Result<()> {
    let data = include_str!("../fixtures/hls/rfc8216/8-6-master-playlist-with-alternative-audio.m3u8");
    let base: Url = "http://example.com/master.m3u8".parse()?;
    let ParsedPlaylist::Master(master) = PlaylistParser::parse(data, &base)? else {
        anyhow::bail!("expected a master playlist");
    };

    assert_eq!(master.variants.len(), 4);
    assert!(master
        .variants
        .iter()
        .all(|v| v.audio_group_id.as_deref() == Some("aac")));
    assert_eq!(
        master.variants[1].url,
        "http://example.com/mid/video-only.m3u8".parse()?
    );

    // the commentary track is neither default nor auto-selectable
    assert_eq!(master.audio.len(), 2);
    assert_eq!(
        master.audio[0].url,
        "http://example.com/main/english-audio.m3u8".parse()?
    );
    assert_eq!(
        master.audio[1].url,
        "http://example.com/main/german-audio.m3u8".parse()?
    );

    Ok(())
}
