use super::*;
use crate::mock::{MockEngine, MockSource, MuxEvent, tb, video_packet};
use crate::packet::Packet;

#[test]
fn copies_every_packet_in_file_order() {
    let engine = MockEngine::new().with_input("in.mkv", MockSource::av(3, 2));
    let cancel = CancellationToken::new();

    let stats = remux_file(engine.clone(), "in.mkv", "out.mp4", &cancel).unwrap();
    assert_eq!(
        stats,
        RemuxStats {
            video_packets: 3,
            audio_packets: 2
        }
    );

    let events = engine.events("out.mp4");
    assert!(matches!(events[0], MuxEvent::Stream { index: 0, .. }));
    assert!(matches!(events[1], MuxEvent::Stream { index: 1, .. }));
    assert_eq!(events[2], MuxEvent::Header);
    assert_eq!(events.last(), Some(&MuxEvent::Trailer));

    let order: Vec<usize> = engine
        .written_packets("out.mp4")
        .iter()
        .map(|p| p.index())
        .collect();
    assert_eq!(order, vec![0, 1, 0, 1, 0]);
}

#[test]
fn timestamps_follow_the_output_clock() {
    let engine = MockEngine::new()
        .with_input("in.mkv", MockSource::av(2, 0))
        .header_time_base(tb(1, 1000));
    let cancel = CancellationToken::new();
    remux_file(engine.clone(), "in.mkv", "out.mp4", &cancel).unwrap();

    let packets = engine.written_packets("out.mp4");
    assert_eq!(packets[1].time_base(), tb(1, 1000));
    assert_eq!(packets[1].pts(), Some(40));
    assert_eq!(packets[1].duration(), 40);
    assert!(packets.iter().all(|p| p.position().is_none()));
}

#[test]
fn unexpected_stream_aborts_but_finalizes() {
    let source = MockSource::av(1, 1)
        .with_stream("mp3", tb(1, 48000))
        .with_packet(Packet::new(vec![b'm'], 2, tb(1, 48000)))
        .with_packet(video_packet(1));
    let engine = MockEngine::new().with_input("in.mkv", source);
    let cancel = CancellationToken::new();

    let err = remux_file(engine.clone(), "in.mkv", "out.mp4", &cancel).unwrap_err();
    assert!(matches!(err, MediaError::UnexpectedStream(2)));
    assert_eq!(engine.written_packets("out.mp4").len(), 2);
    assert_eq!(engine.events("out.mp4").last(), Some(&MuxEvent::Trailer));
}

#[test]
fn missing_input_is_an_open_error() {
    let engine = MockEngine::new();
    let cancel = CancellationToken::new();
    let err = remux_file(engine, "nope.mkv", "out.mp4", &cancel).unwrap_err();
    assert!(matches!(err, MediaError::Open { .. }));
}

#[test]
fn cancellation_stops_the_copy() {
    let engine = MockEngine::new().with_input("in.mkv", MockSource::av(4, 4));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = remux_file(engine.clone(), "in.mkv", "out.mp4", &cancel).unwrap_err();
    assert!(matches!(err, MediaError::Cancelled));
    assert!(engine.written_packets("out.mp4").is_empty());
    assert_eq!(engine.events("out.mp4").last(), Some(&MuxEvent::Trailer));
}

#[test]
fn audio_only_input_copies_one_stream() {
    let source = MockSource::default()
        .with_stream("aac", tb(1, 44100))
        .with_packet(Packet::new(vec![b'a'], 0, tb(1, 44100)).with_timestamps(Some(0), Some(0)));
    let engine = MockEngine::new().with_input("in.m4a", source);
    let cancel = CancellationToken::new();

    let stats = remux_file(engine.clone(), "in.m4a", "out.m4a", &cancel).unwrap();
    assert_eq!(stats.video_packets, 0);
    assert_eq!(stats.audio_packets, 1);
}
