use super::*;
use crate::container::Direction;
use crate::mock::{MockEngine, MockSource, tb};

#[test]
fn describes_every_stream() {
    let source = MockSource::av(1, 1).with_stream("ass", tb(1, 1000));
    let engine = MockEngine::new().with_input("in.mkv", source);
    let mut session = ContainerSession::open(engine, Direction::Input, "in.mkv").unwrap();
    session.discover_streams().unwrap();

    let info = describe(&session);
    assert_eq!(info.format.format_name, "mock");
    assert_eq!(info.format.stream_count, 3);

    let video = &info.streams[0];
    assert_eq!(video.kind, MediaKind::Video);
    assert_eq!(video.time_base, "1/90000");
    assert_eq!(video.frame_rate.as_deref(), Some("25/1"));
    assert_eq!(video.width, Some(4));
    assert_eq!(video.decoder.as_deref(), Some("mock-h264"));
    assert!(video.primary);

    let audio = &info.streams[1];
    assert_eq!(audio.sample_rate, Some(44100));
    assert_eq!(audio.channels, Some(2));
    assert!(audio.width.is_none());

    let subtitle = &info.streams[2];
    assert_eq!(subtitle.kind, MediaKind::Other);
    assert!(subtitle.decoder.is_none());
    assert!(!subtitle.primary);
}

#[test]
fn display_uses_probe_sections() {
    let engine = MockEngine::new().with_input("in.mkv", MockSource::av(1, 1));
    let session = ContainerSession::open(engine, Direction::Input, "in.mkv").unwrap();

    let text = describe(&session).to_string();
    assert!(text.starts_with("[FORMAT]\nformat_name=mock\nduration=N/A\n"));
    assert_eq!(text.matches("[STREAM]").count(), 2);
    assert!(text.contains("codec_type=audio\ncodec_name=aac\n"));
    assert!(text.contains("decoder=N/A"));
}

#[test]
fn serializes_kind_in_lowercase() {
    let engine = MockEngine::new().with_input("in.mkv", MockSource::av(1, 0));
    let session = ContainerSession::open(engine, Direction::Input, "in.mkv").unwrap();
    let json = serde_json::to_value(describe(&session)).unwrap();
    assert_eq!(json["streams"][0]["kind"], "video");
    assert_eq!(json["format"]["stream_count"], 2);
}
