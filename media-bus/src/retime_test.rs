use super::*;
use crate::container::{Direction, StreamSetup};
use crate::mock::{MockEngine, MockSource, MuxEvent, audio_packet, tb, video_packet};

#[test]
fn rejects_zero_fps_and_coarse_clocks() {
    assert!(RetimingBuffer::new(tb(1, 90000), 0).is_err());
    assert!(RetimingBuffer::new(tb(1, 10), 25).is_err());
}

#[test]
fn timestamps_grow_by_a_fixed_increment() {
    let mut buffer = RetimingBuffer::new(tb(1, 90000), 25).unwrap();
    assert_eq!(buffer.increment(), 3600);
    for i in 0..4 {
        // encoder timestamps are ignored
        buffer.submit_video(video_packet(10 - i)).unwrap();
    }
    let pts: Vec<i64> = std::iter::from_fn(|| buffer.request(MediaKind::Video))
        .map(|p| p.pts().unwrap())
        .collect();
    assert_eq!(pts, vec![3600, 7200, 10800, 14400]);
}

#[test]
fn kinds_keep_separate_clocks_and_queues() {
    let mut buffer = RetimingBuffer::new(tb(1, 30000), 30).unwrap();
    buffer.submit_video(video_packet(0)).unwrap();
    buffer.submit_audio(audio_packet(0)).unwrap();
    buffer.submit_audio(audio_packet(1)).unwrap();
    assert_eq!(buffer.len(MediaKind::Video), 1);
    assert_eq!(buffer.len(MediaKind::Audio), 2);

    let first_audio = buffer.request(MediaKind::Audio).unwrap();
    assert_eq!(first_audio.pts(), Some(1000));
    assert_eq!(first_audio.data()[1], 0);
    assert_eq!(buffer.request(MediaKind::Video).unwrap().pts(), Some(1000));
    assert_eq!(buffer.request(MediaKind::Audio).unwrap().pts(), Some(2000));
    assert!(buffer.request(MediaKind::Audio).is_none());
    assert!(buffer.is_empty());
}

#[test]
fn flush_writes_video_then_audio() {
    let engine = MockEngine::new().with_input("in.mkv", MockSource::av(1, 1));
    let mut input = ContainerSession::open(engine.clone(), Direction::Input, "in.mkv").unwrap();
    input.discover_streams().unwrap();
    let mut output = ContainerSession::open(engine.clone(), Direction::Output, "out.mkv").unwrap();
    output.copy_streams_from(&input).unwrap();
    output.write_header().unwrap();

    let mut buffer = RetimingBuffer::new(tb(1, 90000), 25).unwrap();
    buffer.submit_audio(audio_packet(0)).unwrap();
    buffer.submit_video(video_packet(0)).unwrap();
    buffer.submit_audio(audio_packet(1)).unwrap();
    buffer.submit_video(video_packet(1)).unwrap();

    assert_eq!(buffer.flush_to(&mut output).unwrap(), 4);
    let order: Vec<usize> = engine
        .written_packets("out.mkv")
        .iter()
        .map(|p| p.index())
        .collect();
    assert_eq!(order, vec![0, 0, 1, 1]);

    // audio was re-timed on the 1/90000 clock and moved to 1/44100
    let audio = engine.written_packets("out.mkv")[2].clone();
    assert_eq!(audio.time_base(), tb(1, 44100));
    assert_eq!(audio.pts(), Some(1764));
    assert!(buffer.is_empty());
}

#[test]
fn flush_stops_on_mux_failure() {
    let engine = MockEngine::new()
        .with_input("in.mkv", MockSource::av(1, 1))
        .fail_writes_after(1);
    let mut input = ContainerSession::open(engine.clone(), Direction::Input, "in.mkv").unwrap();
    input.discover_streams().unwrap();
    let mut output = ContainerSession::open(engine.clone(), Direction::Output, "out.mkv").unwrap();
    let video = input.stream(0).unwrap().clone();
    output
        .attach_stream(
            MediaKind::Video,
            StreamSetup::Copy {
                source: &video,
                params: &video.params,
            },
        )
        .unwrap();
    output.write_header().unwrap();

    let mut buffer = RetimingBuffer::new(tb(1, 90000), 25).unwrap();
    buffer.submit_video(video_packet(0)).unwrap();
    buffer.submit_video(video_packet(1)).unwrap();
    assert!(matches!(buffer.flush_to(&mut output), Err(MediaError::Mux(_))));
    assert_eq!(
        engine
            .events("out.mkv")
            .iter()
            .filter(|e| matches!(e, MuxEvent::Packet(_)))
            .count(),
        1
    );
}
