// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Session integration tests.
//!
//! Every test drives a real [`MuxSession`] with its pump thread against the
//! in-memory [`common::TestBackend`], which records the container calls.

mod common;

use std::sync::Arc;

use avmux::{Error, FrameType, MuxConfig, MuxSession, SampleFlags, SessionState, TrackKind, TrackPolicy};
use common::{Call, TestBackend, delta_frame, key_frame, output_path, setup_logging, wait_until_drained};

fn start_session(test: &str, config: MuxConfig) -> (MuxSession, Arc<TestBackend>) {
    setup_logging();
    let backend = TestBackend::new();
    let session = MuxSession::new(config, backend.clone()).unwrap();
    session.start(output_path(test)).unwrap();
    (session, backend)
}

#[test]
fn key_frame_then_deltas_and_audio() {
    let (session, backend) = start_session("scenario", MuxConfig::default());
    assert!(session.add_video(key_frame(0), 1280, 720, FrameType::KEY));
    for i in 1..=5 {
        assert!(session.add_video(delta_frame(i), 1280, 720, 1));
    }
    for i in 0..3u8 {
        assert!(session.add_audio(vec![i; 64]));
    }
    wait_until_drained(&session);
    session.stop();
    let report = session.join().unwrap();

    assert_eq!(backend.opens(TrackKind::Video), 1);
    assert_eq!(backend.opens(TrackKind::Audio), 1);
    assert_eq!(backend.writes(TrackKind::Video).len(), 6);
    assert!(backend.writes(TrackKind::Audio).len() <= 3);
    assert_eq!(report.video_samples, 6);
    assert!(report.teardown_errors.is_empty());

    let calls = backend.calls();
    let eos: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            Call::EndOfStream { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(eos.len(), 2);
    assert!(eos.contains(&TrackKind::Video) && eos.contains(&TrackKind::Audio));
    assert_eq!(calls.last(), Some(&Call::Finalize));
    let last_write = calls
        .iter()
        .rposition(|call| matches!(call, Call::Write { .. }))
        .unwrap();
    let first_eos = calls
        .iter()
        .position(|call| matches!(call, Call::EndOfStream { .. }))
        .unwrap();
    assert!(last_write < first_eos);
    assert_eq!(*backend.codecs_stopped.lock().unwrap(), 1);
}

#[test]
fn frames_are_written_in_enqueue_order() {
    let (session, backend) = start_session("fifo", MuxConfig::default());
    session.add_video(key_frame(0), 640, 480, FrameType::KEY);
    for i in 1..50 {
        session.add_video(delta_frame(i), 640, 480, 1);
    }
    for i in 0..20u8 {
        session.add_audio(vec![i; 8]);
    }
    wait_until_drained(&session);
    session.stop();
    session.join().unwrap();

    let video = backend.writes(TrackKind::Video);
    assert_eq!(video.len(), 50);
    assert_eq!(video[0].0, key_frame(0));
    for (i, (payload, _, _)) in video.iter().enumerate().skip(1) {
        assert_eq!(*payload, delta_frame(i as u8));
    }

    let audio = backend.writes(TrackKind::Audio);
    assert_eq!(audio.len(), 20);
    for (i, (payload, _, flags)) in audio.iter().enumerate() {
        assert_eq!(payload[0], 0xAC);
        assert_eq!(payload[1], i as u8);
        assert_eq!(*flags, SampleFlags::SYNC_FRAME);
    }
}

#[test]
fn timestamps_are_anchored_and_non_decreasing() {
    let (session, backend) = start_session("pts", MuxConfig::default());
    session.add_video(key_frame(0), 640, 480, FrameType::KEY);
    for i in 1..10 {
        session.add_video(delta_frame(i), 640, 480, 1);
        session.add_audio(vec![i; 16]);
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    wait_until_drained(&session);
    session.stop();
    session.join().unwrap();

    let video = backend.writes(TrackKind::Video);
    assert_eq!(video[0].1, 0);
    for kind in [TrackKind::Video, TrackKind::Audio] {
        let pts: Vec<u64> = backend.writes(kind).iter().map(|w| w.1).collect();
        assert!(pts.windows(2).all(|pair| pair[0] <= pair[1]), "{kind}: {pts:?}");
    }
    let calls = backend.calls();
    for call in &calls {
        if let Call::EndOfStream { kind, pts_us } = call {
            let last = backend.writes(*kind).last().map_or(0, |w| w.1);
            assert!(*pts_us >= last);
        }
    }
}

#[test]
fn key_frame_flags() {
    let (session, backend) = start_session("flags", MuxConfig::default());
    session.add_video(key_frame(0), 640, 480, FrameType::KEY);
    session.add_video(delta_frame(1), 640, 480, 1);
    wait_until_drained(&session);
    session.stop();
    session.join().unwrap();

    let video = backend.writes(TrackKind::Video);
    assert_eq!(video[0].2, SampleFlags::KEY_FRAME | SampleFlags::SYNC_FRAME);
    assert_eq!(video[1].2, SampleFlags::SYNC_FRAME);
}

fn start_lazy_session(test: &str) -> (MuxSession, Arc<TestBackend>) {
    setup_logging();
    let backend = TestBackend::with_lazy_format();
    let session = MuxSession::new(MuxConfig::default(), backend.clone()).unwrap();
    session.start(output_path(test)).unwrap();
    (session, backend)
}

#[test]
fn video_waiting_for_audio_format_starts_at_key_frame() {
    let (session, backend) = start_lazy_session("late_audio_format");
    assert!(session.add_video(key_frame(0), 1280, 720, FrameType::KEY));
    for i in 1..=5 {
        assert!(session.add_video(delta_frame(i), 1280, 720, 1));
    }
    wait_until_drained(&session);
    assert_eq!(session.status(), SessionState::Init);
    for i in 0..3u8 {
        assert!(session.add_audio(vec![i; 64]));
    }
    wait_until_drained(&session);
    session.stop();
    let report = session.join().unwrap();

    assert_eq!(backend.opens(TrackKind::Video), 1);
    assert_eq!(backend.opens(TrackKind::Audio), 1);
    let video = backend.writes(TrackKind::Video);
    assert_eq!(video.len(), 6);
    assert_eq!(video[0].0, key_frame(0));
    assert_eq!(video[0].2, SampleFlags::KEY_FRAME | SampleFlags::SYNC_FRAME);
    let payloads: Vec<_> = video.iter().map(|(payload, ..)| payload.clone()).collect();
    let expected: Vec<_> = std::iter::once(key_frame(0))
        .chain((1..=5).map(delta_frame))
        .collect();
    assert_eq!(payloads, expected);
    assert_eq!(report.video_not_ready, 0);
    assert!(!backend.writes(TrackKind::Audio).is_empty());
    assert!(backend.writes(TrackKind::Audio).len() <= 3);
}

#[test]
fn only_the_latest_group_waits_for_the_gate() {
    let (session, backend) = start_lazy_session("latest_group");
    session.add_video(key_frame(0), 640, 480, FrameType::KEY);
    session.add_video(delta_frame(1), 640, 480, 1);
    session.add_video(key_frame(2), 640, 480, FrameType::KEY);
    session.add_video(delta_frame(3), 640, 480, 1);
    wait_until_drained(&session);
    session.add_audio(vec![7; 64]);
    wait_until_drained(&session);
    session.stop();
    let report = session.join().unwrap();

    let video = backend.writes(TrackKind::Video);
    assert_eq!(video.len(), 2);
    assert_eq!(video[0].0, key_frame(2));
    assert_eq!(video[0].2, SampleFlags::KEY_FRAME | SampleFlags::SYNC_FRAME);
    assert_eq!(video[1].0, delta_frame(3));
    assert_eq!(report.video_not_ready, 2);
}

#[test]
fn held_video_is_counted_when_audio_never_opens() {
    let (session, backend) = start_lazy_session("gate_never_opens");
    session.add_video(key_frame(0), 640, 480, FrameType::KEY);
    session.add_video(delta_frame(1), 640, 480, 1);
    wait_until_drained(&session);
    session.stop();
    let report = session.join().unwrap();

    assert!(backend.writes(TrackKind::Video).is_empty());
    assert_eq!(report.video_not_ready, 2);
    assert_eq!(backend.calls().last(), Some(&Call::Finalize));
}

#[test]
fn video_track_opens_once() {
    let (session, backend) = start_session("open_once", MuxConfig::default());
    session.add_video(key_frame(0), 640, 480, FrameType::KEY);
    session.add_video(delta_frame(1), 640, 480, 1);
    session.add_video(key_frame(2), 640, 480, FrameType::KEY);
    wait_until_drained(&session);
    session.stop();
    session.join().unwrap();

    assert_eq!(backend.opens(TrackKind::Video), 1);
    assert_eq!(backend.writes(TrackKind::Video).len(), 3);
}

#[test]
fn video_before_first_usable_key_frame_is_dropped() {
    let (session, backend) = start_session("warmup", MuxConfig::default());
    session.add_video(delta_frame(1), 640, 480, 1);
    // Tagged as key frame but missing the PPS and slice.
    session.add_video(vec![0, 0, 0, 1, 0x67, 0x42], 640, 480, FrameType::KEY);
    session.add_video(key_frame(2), 640, 480, FrameType::KEY);
    wait_until_drained(&session);
    session.stop();
    let report = session.join().unwrap();

    assert_eq!(report.video_not_ready, 2);
    let video = backend.writes(TrackKind::Video);
    assert_eq!(video.len(), 1);
    assert_eq!(video[0].0, key_frame(2));
}

#[test]
fn empty_payload_is_refused() {
    let (session, backend) = start_session("empty_payload", MuxConfig::default());
    assert!(!session.add_video(Vec::new(), 640, 480, FrameType::KEY));
    assert!(!session.add_audio(Vec::new()));
    let stats = session.stats();
    assert_eq!(stats.queued_video, 0);
    assert_eq!(stats.rejected, 2);
    session.stop();
    session.join().unwrap();

    assert_eq!(backend.opens(TrackKind::Video), 0);
    assert!(backend.writes(TrackKind::Video).is_empty());
    assert!(backend.writes(TrackKind::Audio).is_empty());
}

#[test]
fn add_after_stop_is_ignored() {
    let (session, backend) = start_session("after_stop", MuxConfig::default());
    session.stop();
    assert_eq!(session.status(), SessionState::Stop);
    assert!(!session.add_video(key_frame(0), 640, 480, FrameType::KEY));
    assert!(!session.add_audio(vec![1; 16]));
    session.join().unwrap();

    assert!(backend.writes(TrackKind::Video).is_empty());
    assert!(matches!(session.start(output_path("again")), Err(Error::Stopped)));
}

#[test]
fn frames_before_start_are_ignored() {
    setup_logging();
    let backend = TestBackend::new();
    let session = MuxSession::new(MuxConfig::default(), backend.clone()).unwrap();
    assert_eq!(session.status(), SessionState::Unknown);
    assert!(!session.add_audio(vec![1; 16]));
    session.stop();
    assert_eq!(session.status(), SessionState::Unknown);
    let report = session.join().unwrap();
    assert_eq!(report.session_id, session.id());
    assert!(backend.calls().is_empty());
}

#[test]
fn start_rejects_empty_path_and_restart() {
    setup_logging();
    let backend = TestBackend::new();
    let session = MuxSession::new(MuxConfig::default(), backend.clone()).unwrap();
    assert!(matches!(session.start(""), Err(Error::EmptyPath)));
    assert_eq!(session.status(), SessionState::Unknown);

    let path = output_path("restart");
    session.start(&path).unwrap();
    assert_eq!(session.status(), SessionState::Init);
    assert!(matches!(session.start(&path), Err(Error::AlreadyStarted)));
    assert_eq!(*backend.paths.lock().unwrap(), vec![path]);
}

#[test]
fn state_reaches_start_once_tracks_open() {
    let (session, _backend) = start_session("gate", MuxConfig::default());
    session.add_video(key_frame(0), 640, 480, FrameType::KEY);
    wait_until_drained(&session);
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while session.status() != SessionState::Start {
        assert!(std::time::Instant::now() < deadline);
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    session.stop();
    assert_eq!(session.status(), SessionState::Stop);
}

#[test]
fn disabled_audio_track() {
    let config = MuxConfig {
        tracks: TrackPolicy {
            video: true,
            audio: false,
        },
        ..Default::default()
    };
    let (session, backend) = start_session("video_only", config);
    assert!(!session.add_audio(vec![1; 16]));
    session.add_video(key_frame(0), 640, 480, FrameType::KEY);
    wait_until_drained(&session);
    session.stop();
    session.join().unwrap();

    assert_eq!(*backend.codecs_created.lock().unwrap(), 0);
    assert_eq!(backend.opens(TrackKind::Audio), 0);
    assert_eq!(backend.writes(TrackKind::Video).len(), 1);
}

#[test]
fn full_queue_drops_new_frames() {
    let config = MuxConfig {
        max_queued_frames: Some(2),
        tick_interval_ms: 60_000,
        ..Default::default()
    };
    let (session, _backend) = start_session("overflow", config);
    let accepted = (0..6)
        .filter(|i| session.add_video(delta_frame(*i), 640, 480, 1))
        .count();
    let stats = session.stats();
    assert!(stats.overflow_video >= 2);
    assert_eq!(accepted as u64 + stats.overflow_video, 6);

    // The wait is a full minute; stop must cut it short.
    let begin = std::time::Instant::now();
    session.stop();
    let report = session.join().unwrap();
    assert!(begin.elapsed() < std::time::Duration::from_secs(30));
    assert_eq!(report.stats.overflow_video, stats.overflow_video);
}

#[test]
fn join_is_repeatable_and_drop_finalizes() {
    let (session, backend) = start_session("join", MuxConfig::default());
    session.stop();
    let first = session.join().unwrap();
    let second = session.join().unwrap();
    assert_eq!(first, second);

    let (session, backend_dropped) = start_session("drop", MuxConfig::default());
    drop(session);
    assert_eq!(backend_dropped.calls().last(), Some(&Call::Finalize));
    assert_eq!(backend.calls().last(), Some(&Call::Finalize));
}

#[test]
fn producers_on_many_threads() {
    let (session, backend) = start_session("threads", MuxConfig::default());
    let session = Arc::new(session);
    session.add_video(key_frame(0), 640, 480, FrameType::KEY);
    wait_until_drained(&session);

    let handles: Vec<_> = (0..4u8)
        .map(|t| {
            let session = session.clone();
            std::thread::spawn(move || {
                for i in 0..25u8 {
                    session.add_audio(vec![t, i]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    wait_until_drained(&session);
    session.stop();
    let report = session.join().unwrap();

    let audio = backend.writes(TrackKind::Audio);
    assert_eq!(audio.len() as u64, report.audio_samples);
    assert_eq!(report.audio_samples + report.audio_declined, 100);
    // Per producer, order is preserved.
    for t in 0..4u8 {
        let seq: Vec<u8> = audio
            .iter()
            .filter(|(payload, _, _)| payload[1] == t)
            .map(|(payload, _, _)| payload[2])
            .collect();
        assert!(seq.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
