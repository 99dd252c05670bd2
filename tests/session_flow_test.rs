mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::*;
use subembed::collaborators::{Denylist, StaticPreferences};
use subembed::session::{SessionState, Submission};
use subembed_core::events::SessionEvent;
use subembed_core::{Container, Error, ErrorKind, SubtitleFormat, UserId};

const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);

/// Poll the event history until `pred` matches or `timeout` elapses.
async fn wait_for_event(
    harness: &TestHarness,
    user_id: UserId,
    timeout: Duration,
    pred: impl Fn(&SessionEvent) -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if harness.has_event(user_id, &pred) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn state(harness: &TestHarness, user_id: UserId) -> Option<SessionState> {
    harness.manager.snapshot(user_id).map(|s| s.state)
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_flow_embeds_tracks_in_submission_order() {
    let h = TestHarness::new();

    let video = h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    assert_eq!(video.file_name, "movie.mkv");
    assert_eq!(video.container, Container::Mkv);
    assert_eq!(video.size, 4096);
    assert_eq!(state(&h, ALICE), Some(SessionState::AwaitingSubtitles));

    let eng = h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();
    assert_eq!(eng.submission_index, 1);
    assert_eq!(eng.language_code, "eng");
    assert_eq!(eng.display_name, "English");
    assert_eq!(eng.format, SubtitleFormat::Srt);
    assert_eq!(eng.cue_count, 2);
    assert_eq!(eng.total_subtitles, 1);
    assert_eq!(eng.session_id, video.session_id);

    let spa = h.manager.submit_subtitle(ALICE, srt("movie.spa.srt")).await.unwrap();
    assert_eq!(spa.submission_index, 2);
    assert_eq!(spa.language_code, "spa");
    assert_eq!(spa.total_subtitles, 2);

    let snapshot = h.manager.snapshot(ALICE).unwrap();
    assert_eq!(snapshot.subtitles.len(), 2);
    assert!(snapshot.video.is_some());

    let report = h.manager.request_finish(ALICE).await.unwrap();
    assert_eq!(report.delivery.file_name, "movie.mkv");
    assert_eq!(report.delivery.tracks.len(), 2);
    assert_eq!(report.delivery.tracks[0].language, "eng");
    assert_eq!(report.delivery.tracks[1].language, "spa");
    assert!(report.delivery.caption.contains("2 track(s) embedded"));
    assert!(!report.delivery.as_document);

    let request = h.muxer.last_request().unwrap();
    let languages: Vec<_> = request.subtitles.iter().map(|s| s.language.as_str()).collect();
    assert_eq!(languages, ["eng", "spa"]);
    assert_eq!(request.subtitles[1].title, "Spanish");
    assert_eq!(request.container, Container::Mkv);

    let uploads = h.sink.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].user_id, ALICE);
    assert_eq!(uploads[0].data.len() as u64, report.delivery.size);

    // Back to idle, nothing left on disk.
    assert_eq!(state(&h, ALICE), Some(SessionState::Idle));
    assert!(h.session_dirs(ALICE).is_empty());
    assert!(h.has_event(ALICE, |e| matches!(e, SessionEvent::JobCompleted { .. })));
}

#[tokio::test]
async fn test_output_extension_follows_container() {
    let h = TestHarness::new();
    // Probe reports mp4 from the extension; the name keeps it.
    h.manager.submit_video(ALICE, video("clip.mp4")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("clip.eng.srt")).await.unwrap();
    let report = h.manager.request_finish(ALICE).await.unwrap();
    assert_eq!(report.delivery.file_name, "clip.mp4");
}

#[tokio::test]
async fn test_events_are_published_in_order() {
    let h = TestHarness::new();
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();
    h.manager.request_finish(ALICE).await.unwrap();

    let names: Vec<&'static str> = h
        .events_for(ALICE)
        .iter()
        .filter_map(|e| match e.payload {
            SessionEvent::SessionOpened { .. } => Some("opened"),
            SessionEvent::VideoAccepted { .. } => Some("video"),
            SessionEvent::SubtitleAccepted { .. } => Some("subtitle"),
            SessionEvent::MuxStarted { .. } => Some("mux"),
            SessionEvent::JobCompleted { .. } => Some("completed"),
            _ => None,
        })
        .collect();
    assert_eq!(names, ["opened", "video", "subtitle", "mux", "completed"]);
}

// ---------------------------------------------------------------------------
// Input errors leave the session untouched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_subtitle_before_video_is_rejected() {
    let h = TestHarness::new();
    let err = h
        .manager
        .submit_subtitle(ALICE, srt("movie.eng.srt"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert_eq!(err.user_message(), "Please send a video first!");
    assert_eq!(state(&h, ALICE), Some(SessionState::Idle));
    assert!(h.session_dirs(ALICE).is_empty());
}

#[tokio::test]
async fn test_finish_without_video_or_subtitles() {
    let h = TestHarness::new();

    let err = h.manager.request_finish(ALICE).await.unwrap_err();
    assert_eq!(err.user_message(), "Please send a video first!");

    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    let err = h.manager.request_finish(ALICE).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert_eq!(err.user_message(), "Please send at least one subtitle file!");

    // Still collecting; a subtitle can follow.
    assert_eq!(state(&h, ALICE), Some(SessionState::AwaitingSubtitles));
    h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();
    h.manager.request_finish(ALICE).await.unwrap();
}

#[tokio::test]
async fn test_malformed_subtitle_keeps_earlier_entries() {
    let h = TestHarness::new();
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();

    let err = h
        .manager
        .submit_subtitle(ALICE, file("broken.srt", b"this is not a subtitle"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingestion);
    assert!(h.has_event(ALICE, |e| matches!(
        e,
        SessionEvent::SubtitleRejected { file_name, .. } if file_name == "broken.srt"
    )));

    let snapshot = h.manager.snapshot(ALICE).unwrap();
    assert_eq!(snapshot.state, SessionState::AwaitingSubtitles);
    assert_eq!(snapshot.subtitles.len(), 1);

    // The rejected file did not use up an index.
    let next = h.manager.submit_subtitle(ALICE, srt("movie.french.srt")).await.unwrap();
    assert_eq!(next.submission_index, 2);
    assert_eq!(next.language_code, "fre");
}

#[tokio::test]
async fn test_unsupported_subtitle_extension() {
    let h = TestHarness::new();
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    let err = h
        .manager
        .submit_subtitle(ALICE, file("movie.pdf", b"%PDF-1.4"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingestion);
    assert!(err.to_string().contains("srt"));
    assert_eq!(h.manager.snapshot(ALICE).unwrap().subtitles.len(), 0);
}

#[tokio::test]
async fn test_unknown_language_gets_track_number() {
    let h = TestHarness::new();
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();
    let second = h.manager.submit_subtitle(ALICE, srt("subs.srt")).await.unwrap();
    assert_eq!(second.language_code, "und");
    assert_eq!(second.display_name, "Track 2");
}

#[tokio::test]
async fn test_unreadable_video_is_rejected() {
    let h = TestHarness::new();
    let err = h
        .manager
        .submit_video(ALICE, file("movie.mkv", UNREADABLE_VIDEO))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingestion);
    assert_eq!(state(&h, ALICE), Some(SessionState::Idle));
    assert!(h.session_dirs(ALICE).is_empty());
}

#[tokio::test]
async fn test_size_limits() {
    let h = TestHarness::builder()
        .config(|c| {
            c.session.max_video_bytes = 1024;
            c.session.max_subtitle_bytes = 16;
        })
        .build();

    let err = h.manager.submit_video(ALICE, video("big.mkv")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(err.user_message().contains("too large"));

    h.manager
        .submit_video(ALICE, file("small.mkv", &[7u8; 512]))
        .await
        .unwrap();
    let err = h
        .manager
        .submit_subtitle(ALICE, srt("small.eng.srt"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert_eq!(state(&h, ALICE), Some(SessionState::AwaitingSubtitles));
}

// ---------------------------------------------------------------------------
// Session replacement, cancel, expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_second_video_starts_fresh_session() {
    let h = TestHarness::new();
    let first = h.manager.submit_video(ALICE, video("one.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("one.eng.srt")).await.unwrap();

    let second = h.manager.submit_video(ALICE, video("two.mp4")).await.unwrap();
    assert_ne!(first.session_id, second.session_id);

    let snapshot = h.manager.snapshot(ALICE).unwrap();
    assert_eq!(snapshot.session_id, second.session_id);
    assert!(snapshot.subtitles.is_empty());
    assert_eq!(snapshot.video.unwrap().file_name, "two.mp4");

    // Only the new session's directory remains.
    let dirs = h.session_dirs(ALICE);
    assert_eq!(dirs.len(), 1);
    assert!(dirs[0].ends_with(second.session_id.to_string()));
}

#[tokio::test]
async fn test_failed_second_video_keeps_pending_session() {
    let h = TestHarness::new();
    let first = h.manager.submit_video(ALICE, video("one.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("one.eng.srt")).await.unwrap();

    h.manager
        .submit_video(ALICE, file("two.mkv", UNREADABLE_VIDEO))
        .await
        .unwrap_err();

    let snapshot = h.manager.snapshot(ALICE).unwrap();
    assert_eq!(snapshot.session_id, first.session_id);
    assert_eq!(snapshot.subtitles.len(), 1);
    assert_eq!(h.session_dirs(ALICE).len(), 1);
}

#[tokio::test]
async fn test_cancel_discards_session() {
    let h = TestHarness::new();
    let opened = h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();
    assert_eq!(h.session_dirs(ALICE).len(), 1);

    h.manager.cancel(ALICE).await.unwrap();

    assert_eq!(state(&h, ALICE), Some(SessionState::Idle));
    assert!(h.session_dirs(ALICE).is_empty());
    assert!(h.has_event(ALICE, |e| matches!(
        e,
        SessionEvent::SessionCancelled { session_id } if *session_id == opened.session_id
    )));

    // A new session can start right away.
    h.manager.submit_video(ALICE, video("again.mkv")).await.unwrap();
}

#[tokio::test]
async fn test_cancel_without_session_is_noop() {
    let h = TestHarness::new();
    h.manager.cancel(ALICE).await.unwrap();
    assert_eq!(h.manager.active_sessions(), 0);

    // Idle actor: still nothing to cancel and no event.
    h.manager.request_finish(ALICE).await.unwrap_err();
    h.manager.cancel(ALICE).await.unwrap();
    assert!(!h.has_event(ALICE, |e| matches!(e, SessionEvent::SessionCancelled { .. })));
}

#[tokio::test]
async fn test_idle_session_expires() {
    let h = TestHarness::builder()
        .config(|c| c.session.idle_timeout_secs = 1)
        .build();
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    assert_eq!(h.session_dirs(ALICE).len(), 1);

    assert!(
        wait_for_event(&h, ALICE, Duration::from_secs(5), |e| matches!(
            e,
            SessionEvent::SessionExpired { .. }
        ))
        .await
    );
    assert!(h.session_dirs(ALICE).is_empty());

    // The expired session is gone; a subtitle needs a new video.
    let err = h
        .manager
        .submit_subtitle(ALICE, srt("movie.eng.srt"))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Please send a video first!");
}

#[tokio::test]
async fn test_idle_actor_retires() {
    let h = TestHarness::builder()
        .config(|c| c.session.idle_timeout_secs = 1)
        .build();
    h.manager.request_finish(ALICE).await.unwrap_err();
    assert_eq!(h.manager.active_sessions(), 1);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.manager.active_sessions(), 0);
    assert!(h.manager.snapshot(ALICE).is_none());

    // A later request starts a new actor.
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    assert_eq!(h.manager.active_sessions(), 1);
}

// ---------------------------------------------------------------------------
// Mux outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mux_failure_ends_session() {
    let h = TestHarness::new();
    h.muxer.fail_next("Invalid data found when processing input");
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();

    let err = h.manager.request_finish(ALICE).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Mux);
    assert!(h.has_event(ALICE, |e| matches!(
        e,
        SessionEvent::JobFailed { error, .. } if error.contains("Invalid data")
    )));
    assert_eq!(state(&h, ALICE), Some(SessionState::Idle));
    assert!(h.session_dirs(ALICE).is_empty());
    assert!(h.sink.uploads().is_empty());
}

#[tokio::test]
async fn test_container_without_text_subtitles_fails() {
    let h = TestHarness::new();
    let accepted = h.manager.submit_video(ALICE, video("old.avi")).await.unwrap();
    assert_eq!(accepted.container, Container::Avi);
    h.manager.submit_subtitle(ALICE, srt("old.eng.srt")).await.unwrap();

    let err = h.manager.request_finish(ALICE).await.unwrap_err();
    assert_matches!(err, Error::Mux(_));
    assert!(h.session_dirs(ALICE).is_empty());
}

#[tokio::test]
async fn test_cancel_during_mux() {
    let h = TestHarness::builder()
        .muxer(FakeMuxer::with_delay(Duration::from_secs(30)))
        .build();
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();

    let manager = h.manager.clone();
    let finish = tokio::spawn(async move { manager.request_finish(ALICE).await });
    assert!(
        wait_for_event(&h, ALICE, Duration::from_secs(5), |e| matches!(
            e,
            SessionEvent::MuxStarted { .. }
        ))
        .await
    );
    assert_eq!(state(&h, ALICE), Some(SessionState::Processing));

    // Queued behind the running job; dropped by the cancel.
    let manager = h.manager.clone();
    let queued = tokio::spawn(async move { manager.submit_subtitle(ALICE, srt("late.srt")).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.manager.cancel(ALICE).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), finish)
        .await
        .unwrap()
        .unwrap();
    assert_matches!(result, Err(Error::Cancelled));
    assert_matches!(queued.await.unwrap(), Err(Error::Cancelled));

    assert_eq!(state(&h, ALICE), Some(SessionState::Idle));
    assert!(h.session_dirs(ALICE).is_empty());
    assert!(h.sink.uploads().is_empty());
    assert!(h.has_event(ALICE, |e| matches!(e, SessionEvent::SessionCancelled { .. })));
}

#[tokio::test]
async fn test_cancel_during_video_download() {
    let h = TestHarness::new();
    let source = Arc::new(SlowSource::new(
        "movie.mkv",
        &[0x42; 4096],
        Duration::from_millis(20),
    ));

    let manager = h.manager.clone();
    let upload = tokio::spawn(async move { manager.submit_video(ALICE, source).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.session_dirs(ALICE).len(), 1);

    h.manager.cancel(ALICE).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), upload)
        .await
        .unwrap()
        .unwrap();
    assert_matches!(result, Err(Error::Cancelled));
    assert!(h.session_dirs(ALICE).is_empty());
    assert_eq!(state(&h, ALICE), Some(SessionState::Idle));
    assert!(!h.has_event(ALICE, |e| matches!(e, SessionEvent::SessionOpened { .. })));
}

#[tokio::test]
async fn test_queued_subtitles_keep_submission_order() {
    let h = TestHarness::new();
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();

    let slow = Arc::new(SlowSource::new(
        "movie.eng.srt",
        SRT.as_bytes(),
        Duration::from_millis(50),
    ));
    let mut pending = Vec::new();
    let manager = h.manager.clone();
    pending.push(tokio::spawn(async move { manager.submit_subtitle(ALICE, slow).await }));
    for name in ["movie.spa.srt", "movie.fre.srt"] {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let manager = h.manager.clone();
        pending.push(tokio::spawn(async move { manager.submit_subtitle(ALICE, srt(name)).await }));
    }

    let mut accepted = Vec::new();
    for task in pending {
        accepted.push(task.await.unwrap().unwrap());
    }
    let order: Vec<_> = accepted
        .iter()
        .map(|a| (a.submission_index, a.language_code.as_str()))
        .collect();
    assert_eq!(order, [(1, "eng"), (2, "spa"), (3, "fre")]);

    h.manager.request_finish(ALICE).await.unwrap();
    let request = h.muxer.last_request().unwrap();
    let languages: Vec<_> = request.subtitles.iter().map(|s| s.language.as_str()).collect();
    assert_eq!(languages, ["eng", "spa", "fre"]);
}

#[tokio::test]
async fn test_second_finish_runs_after_first_ends_session() {
    let h = TestHarness::builder()
        .muxer(FakeMuxer::with_delay(Duration::from_millis(200)))
        .build();
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();

    // Two finish requests in a row: the second runs after the first ended
    // the session, so there is nothing left to finish.
    let (first, second) = tokio::join!(
        h.manager.request_finish(ALICE),
        h.manager.request_finish(ALICE)
    );
    first.unwrap();
    assert_eq!(second.unwrap_err().user_message(), "Please send a video first!");
    assert_eq!(h.sink.uploads().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mux_concurrency_is_capped() {
    let h = TestHarness::builder()
        .config(|c| c.mux.max_concurrent = 1)
        .muxer(FakeMuxer::with_delay(Duration::from_millis(300)))
        .build();

    for user in [ALICE, BOB] {
        h.manager.submit_video(user, video("movie.mkv")).await.unwrap();
        h.manager.submit_subtitle(user, srt("movie.eng.srt")).await.unwrap();
    }

    let (a, b) = tokio::join!(
        h.manager.request_finish(ALICE),
        h.manager.request_finish(BOB)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.muxer.max_running.load(Ordering::SeqCst), 1);
    let queued = [ALICE, BOB]
        .iter()
        .filter(|u| h.has_event(**u, |e| matches!(e, SessionEvent::MuxQueued { .. })))
        .count();
    assert_eq!(queued, 1);
    assert_eq!(h.sink.uploads().len(), 2);
}

#[tokio::test]
async fn test_users_are_independent() {
    let h = TestHarness::new();
    h.manager.submit_video(ALICE, video("a.mkv")).await.unwrap();
    h.manager.submit_video(BOB, video("b.mkv")).await.unwrap();
    h.manager.submit_subtitle(BOB, srt("b.eng.srt")).await.unwrap();

    h.manager.cancel(ALICE).await.unwrap();

    assert_eq!(state(&h, ALICE), Some(SessionState::Idle));
    assert_eq!(h.manager.snapshot(BOB).unwrap().subtitles.len(), 1);
    let report = h.manager.request_finish(BOB).await.unwrap();
    assert_eq!(report.delivery.file_name, "b.mkv");
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_download_retries_transient_failures() {
    let h = TestHarness::builder()
        .config(|c| c.transfer.max_attempts = 3)
        .build();
    let source = Arc::new(FlakySource::new("movie.mkv", &[1u8; 2048], 2));

    h.manager.submit_video(ALICE, source.clone()).await.unwrap();
    assert_eq!(source.opens.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_download_gives_up_after_max_attempts() {
    let h = TestHarness::builder()
        .config(|c| c.transfer.max_attempts = 2)
        .build();
    let source = Arc::new(FlakySource::new("movie.mkv", &[1u8; 2048], 5));

    let err = h.manager.submit_video(ALICE, source.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientIo);
    assert_eq!(source.opens.load(Ordering::SeqCst), 2);
    assert_eq!(state(&h, ALICE), Some(SessionState::Idle));
    assert!(h.session_dirs(ALICE).is_empty());
}

#[tokio::test]
async fn test_upload_is_retried() {
    let h = TestHarness::builder().sink(MemorySink::failing(1)).build();
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();
    h.manager.request_finish(ALICE).await.unwrap();
    assert_eq!(h.sink.uploads().len(), 1);
}

#[tokio::test]
async fn test_progress_events_are_reported() {
    let h = TestHarness::builder()
        .config(|c| {
            c.transfer.progress_interval_ms = 0;
            c.transfer.progress_min_percent = 0.0;
        })
        .build();
    let source = Arc::new(SlowSource::new(
        "movie.mkv",
        &[3u8; 512],
        Duration::from_millis(5),
    ));
    h.manager.submit_video(ALICE, source).await.unwrap();

    let progress: Vec<(u64, u64)> = h
        .events_for(ALICE)
        .iter()
        .filter_map(|e| match e.payload {
            SessionEvent::TransferProgress {
                bytes_transferred,
                bytes_total,
                ..
            } => Some((bytes_transferred, bytes_total)),
            _ => None,
        })
        .collect();
    assert!(progress.len() >= 2, "got {progress:?}");
    assert_eq!(progress.last(), Some(&(512, 512)));
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
}

// ---------------------------------------------------------------------------
// Access, documents, preferences
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_forbidden_user_is_rejected() {
    let h = TestHarness::builder()
        .access(Arc::new(Denylist::new([BOB])))
        .build();
    let err = h.manager.submit_video(BOB, video("movie.mkv")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(h.manager.snapshot(BOB).is_none());

    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
}

#[tokio::test]
async fn test_documents_are_routed_by_extension() {
    let h = TestHarness::new();

    let video = h.manager.submit_document(ALICE, video("movie.mkv")).await.unwrap();
    assert_matches!(video, Submission::Video(_));

    let sub = h
        .manager
        .submit_document(ALICE, srt("movie.german.srt"))
        .await
        .unwrap();
    assert_matches!(sub, Submission::Subtitle(ref s) if s.language_code == "ger");

    let err = h
        .manager
        .submit_document(ALICE, file("notes.txt", b"hello"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);

    let report = h.manager.request_finish(ALICE).await.unwrap();
    assert!(report.delivery.as_document);
}

#[tokio::test]
async fn test_caption_and_thumbnail_preferences() {
    let prefs = StaticPreferences::new()
        .with_caption(ALICE, "{file_name} is ready")
        .with_thumbnail(ALICE, "/thumbs/alice.jpg");
    let h = TestHarness::builder().preferences(Arc::new(prefs)).build();

    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    h.manager.submit_subtitle(ALICE, srt("movie.eng.srt")).await.unwrap();
    let report = h.manager.request_finish(ALICE).await.unwrap();

    assert_eq!(report.delivery.caption, "movie.mkv is ready");
    assert_eq!(
        report.delivery.thumbnail.as_deref(),
        Some(std::path::Path::new("/thumbs/alice.jpg"))
    );
    let uploads = h.sink.uploads();
    assert_eq!(uploads[0].delivery.caption, "movie.mkv is ready");
}

#[tokio::test]
async fn test_dropping_manager_removes_workspaces() {
    let h = TestHarness::new();
    h.manager.submit_video(ALICE, video("movie.mkv")).await.unwrap();
    assert_eq!(h.session_dirs(ALICE).len(), 1);

    let TestHarness { manager, root, .. } = h;
    drop(manager);

    let user_dir = root.path().join(ALICE.to_string());
    let mut gone = false;
    for _ in 0..100 {
        let empty = std::fs::read_dir(&user_dir)
            .map(|mut d| d.next().is_none())
            .unwrap_or(true);
        if empty {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(gone);
}
