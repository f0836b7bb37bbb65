use std::thread;

use super::*;
use crate::mock::{DecoderScript, MockEngine};

fn settings() -> LiveSettings {
    LiveSettings {
        codec: "h264".into(),
        width: 4,
        height: 4,
        queue_capacity: 8,
        overflow: OverflowPolicy::DropOldest,
    }
}

#[test]
fn queue_is_fifo() {
    let queue = LiveQueue::unbounded();
    for i in 0..5u8 {
        assert_eq!(queue.submit(vec![i]), SubmitStatus::Queued);
    }
    let got: Vec<u8> = std::iter::from_fn(|| queue.request_next()).map(|b| b[0]).collect();
    assert_eq!(got, vec![0, 1, 2, 3, 4]);
}

#[test]
fn empty_queue_answers_immediately() {
    let queue = LiveQueue::new(4, OverflowPolicy::DropOldest);
    assert!(queue.request_next().is_none());
    assert!(queue.is_empty());
}

#[test]
fn zero_length_payloads_are_ignored() {
    let queue = LiveQueue::unbounded();
    assert_eq!(queue.submit(Vec::<u8>::new()), SubmitStatus::Ignored);
    assert_eq!(queue.len(), 0);
    assert_eq!(queue.submitted(), 0);
}

#[test]
fn drop_oldest_evicts_the_head() {
    let queue = LiveQueue::new(2, OverflowPolicy::DropOldest);
    queue.submit(vec![1u8]);
    queue.submit(vec![2u8]);
    assert_eq!(queue.submit(vec![3u8]), SubmitStatus::QueuedWithEviction);
    assert_eq!(queue.dropped(), 1);
    assert_eq!(queue.request_next().unwrap()[0], 2);
    assert_eq!(queue.request_next().unwrap()[0], 3);
}

#[test]
fn reject_newest_keeps_the_queue() {
    let queue = LiveQueue::new(1, OverflowPolicy::RejectNewest);
    queue.submit(vec![1u8]);
    assert_eq!(queue.submit(vec![2u8]), SubmitStatus::Rejected);
    assert_eq!(queue.dropped(), 1);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.request_next().unwrap()[0], 1);
}

#[test]
fn unbounded_never_drops() {
    let queue = LiveQueue::unbounded();
    for i in 0..1000u32 {
        queue.submit(i.to_le_bytes().to_vec());
    }
    assert_eq!(queue.len(), 1000);
    assert_eq!(queue.dropped(), 0);
}

#[test]
fn producer_and_consumer_run_concurrently() {
    let queue = LiveQueue::unbounded();
    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..500u32 {
                queue.submit(i.to_le_bytes().to_vec());
            }
        })
    };

    let mut received = Vec::new();
    while received.len() < 500 {
        match queue.request_next() {
            Some(b) => received.push(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            None => thread::yield_now(),
        }
    }
    producer.join().unwrap();
    assert_eq!(received, (0..500u32).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

#[test]
fn live_decoder_returns_none_when_dry() {
    let engine = MockEngine::new();
    let queue = LiveQueue::from_settings(&settings());
    let mut decoder = LiveDecoder::open(&engine, queue.clone(), &settings()).unwrap();
    let cancel = CancellationToken::new();

    assert!(decoder.decode_next(&cancel).unwrap().is_none());
    queue.submit(vec![b'v', 1]);
    let frame = decoder.decode_next(&cancel).unwrap().unwrap();
    assert_eq!(frame.kind(), MediaKind::Video);
    assert!(decoder.decode_next(&cancel).unwrap().is_none());
    assert_eq!(decoder.stats().decoded, 1);
}

#[test]
fn live_decoder_recovers_from_end_of_stream() {
    let engine = MockEngine::new();
    let queue = LiveQueue::unbounded();
    let mut decoder = LiveDecoder::open(&engine, queue.clone(), &settings()).unwrap();
    let cancel = CancellationToken::new();

    queue.submit(&b"E"[..]);
    queue.submit(vec![b'v', 2]);
    let frame = decoder.decode_next(&cancel).unwrap();
    assert!(frame.is_some());
}

#[test]
fn live_decoder_needs_a_video_decoder() {
    let engine = MockEngine::new().missing_decoder("h264");
    let err = LiveDecoder::open(&engine, LiveQueue::unbounded(), &settings())
        .err()
        .unwrap();
    assert!(matches!(err, MediaError::Configuration(_)));

    let audio = LiveSettings {
        codec: "aac".into(),
        ..settings()
    };
    let err = LiveDecoder::open(&MockEngine::new(), LiveQueue::unbounded(), &audio)
        .err()
        .unwrap();
    assert!(matches!(err, MediaError::Configuration(_)));
}

#[test]
fn closed_queue_keeps_what_it_holds() {
    let queue = LiveQueue::unbounded();
    queue.submit(vec![1u8]);
    queue.close();
    assert!(queue.is_closed());
    assert_eq!(queue.submit(vec![2u8]), SubmitStatus::Rejected);
    assert_eq!(queue.request_next().unwrap()[0], 1);
    assert!(queue.request_next().is_none());
}

fn payload_id(frame: &Frame) -> u8 {
    frame.planes()[0].data[1]
}

#[test]
fn finish_drains_frames_held_by_the_decoder() {
    let engine = MockEngine::new().decoder_script(DecoderScript {
        delay: 2,
        ..DecoderScript::default()
    });
    let queue = LiveQueue::unbounded();
    let mut decoder = LiveDecoder::open(&engine, queue.clone(), &settings()).unwrap();
    let cancel = CancellationToken::new();

    for i in 0..3u8 {
        queue.submit(vec![b'v', i]);
    }
    let first = decoder.decode_next(&cancel).unwrap().unwrap();
    assert_eq!(payload_id(&first), 0);
    assert!(decoder.decode_next(&cancel).unwrap().is_none());

    let rest = decoder.finish(&cancel).unwrap();
    assert_eq!(rest.iter().map(payload_id).collect::<Vec<_>>(), vec![1, 2]);
    assert!(rest.iter().all(|f| f.time_base() == Some(Rational::MICROS)));
    assert!(decoder.decode_next(&cancel).unwrap_err().is_exhausted());
    assert_eq!(queue.submit(vec![b'v', 3]), SubmitStatus::Rejected);
}

#[test]
fn finish_decodes_packets_still_queued() {
    let engine = MockEngine::new();
    let queue = LiveQueue::unbounded();
    let mut decoder = LiveDecoder::open(&engine, queue.clone(), &settings()).unwrap();
    for i in 0..4u8 {
        queue.submit(vec![b'v', i]);
    }
    let frames = decoder.finish(&CancellationToken::new()).unwrap();
    assert_eq!(frames.len(), 4);
    assert_eq!(decoder.stats().decoded, 4);
    assert!(queue.is_empty());
}
