//! Queue controller behaviour against a recording call transport.
//!
//! The mock stands in for the voice library: it records every request and
//! hands out a fresh stream id per `play`, so tests can deliver stream-end
//! notifications exactly the way the real transport does.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};
use voicemod::config::PlayerConfig;
use voicemod::player::{
    spawn_event_loop, CallTransport, ChatId, EnqueueOutcome, PanelRef, PlaybackEvent,
    QueueController, SkipOutcome, StreamId, StreamShape, Track, TrackEndOutcome, TransportEvent,
};
use voicemod::AppError;

const CHAT: ChatId = ChatId(1001);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Request {
    Join(ChatId, u64),
    Play(ChatId, PathBuf),
    Pause(ChatId),
    Resume(ChatId),
    Mute(ChatId),
    Unmute(ChatId),
    Leave(ChatId),
}

#[derive(Default)]
struct RecordingTransport {
    requests: Mutex<Vec<Request>>,
    streams: Mutex<HashMap<ChatId, StreamId>>,
    joined: Mutex<HashSet<ChatId>>,
    fail_play: AtomicBool,
    hang_play: AtomicBool,
    fail_controls: AtomicBool,
    fail_leave: AtomicBool,
}

impl RecordingTransport {
    fn record(&self, request: Request) {
        self.requests.lock().unwrap().push(request);
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn plays(&self) -> Vec<PathBuf> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Request::Play(_, path) => Some(path),
                _ => None,
            })
            .collect()
    }

    fn count(&self, wanted: &Request) -> usize {
        self.requests().iter().filter(|r| *r == wanted).count()
    }

    fn control(&self, request: Request) -> voicemod::AppResult<()> {
        if self.fail_controls.load(Ordering::SeqCst) {
            return Err(AppError::transport("control rejected"));
        }
        self.record(request);
        Ok(())
    }

    fn stream(&self, chat: ChatId) -> StreamId {
        *self.streams.lock().unwrap().get(&chat).expect("nothing was played")
    }
}

#[async_trait]
impl CallTransport for RecordingTransport {
    async fn join(&self, chat: ChatId, channel: u64) -> voicemod::AppResult<()> {
        self.record(Request::Join(chat, channel));
        self.joined.lock().unwrap().insert(chat);
        Ok(())
    }

    async fn play(
        &self,
        chat: ChatId,
        path: &Path,
        _shape: StreamShape,
    ) -> voicemod::AppResult<StreamId> {
        if self.hang_play.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(AppError::transport("stream rejected"));
        }
        self.record(Request::Play(chat, path.to_path_buf()));
        let stream = StreamId::new();
        self.streams.lock().unwrap().insert(chat, stream);
        Ok(stream)
    }

    async fn pause(&self, chat: ChatId) -> voicemod::AppResult<()> {
        self.control(Request::Pause(chat))
    }

    async fn resume(&self, chat: ChatId) -> voicemod::AppResult<()> {
        self.control(Request::Resume(chat))
    }

    async fn mute(&self, chat: ChatId) -> voicemod::AppResult<()> {
        self.control(Request::Mute(chat))
    }

    async fn unmute(&self, chat: ChatId) -> voicemod::AppResult<()> {
        self.control(Request::Unmute(chat))
    }

    async fn leave(&self, chat: ChatId) -> voicemod::AppResult<()> {
        if self.fail_leave.load(Ordering::SeqCst) {
            return Err(AppError::transport("leave rejected"));
        }
        self.record(Request::Leave(chat));
        self.joined.lock().unwrap().remove(&chat);
        Ok(())
    }

    fn in_call(&self, chat: ChatId) -> bool {
        self.joined.lock().unwrap().contains(&chat)
    }
}

fn setup_with(config: PlayerConfig) -> (Arc<RecordingTransport>, Arc<QueueController>) {
    let transport = Arc::new(RecordingTransport::default());
    let controller = Arc::new(QueueController::new(transport.clone(), &config));
    (transport, controller)
}

fn setup() -> (Arc<RecordingTransport>, Arc<QueueController>) {
    setup_with(PlayerConfig {
        transport_timeout_secs: 1,
        ..Default::default()
    })
}

fn track(name: &str) -> Track {
    Track::new(format!("/music/{}.mp3", name), name, true)
}

fn path(name: &str) -> PathBuf {
    PathBuf::from(format!("/music/{}.mp3", name))
}

fn titles(controller: &QueueController) -> Vec<String> {
    controller
        .snapshot(CHAT)
        .map(|s| s.titles)
        .unwrap_or_default()
}

/// A real file the controller owns and must delete.
async fn owned_track(name: &str) -> Track {
    let path = std::env::temp_dir().join(format!("voicemod-test-{}-{}.mp3", name, uuid::Uuid::new_v4()));
    tokio::fs::write(&path, b"not really audio").await.unwrap();
    Track::new(path, name, true).owned()
}

#[tokio::test]
async fn test_queue_plays_through_then_leaves() {
    let (transport, controller) = setup();

    let outcome = assert_ok!(controller.enqueue(CHAT, track("A"), true).await);
    assert_eq!(outcome, EnqueueOutcome::Started { title: "A".into() });
    assert_eq!(transport.plays(), vec![path("A")]);

    let outcome = assert_ok!(controller.enqueue(CHAT, track("B"), false).await);
    assert_eq!(
        outcome,
        EnqueueOutcome::Queued {
            title: "B".into(),
            position: 1
        }
    );
    assert_eq!(titles(&controller), vec!["A", "B"]);
    assert_eq!(transport.plays().len(), 1, "appending must not restart playback");

    let ended = assert_ok!(controller.on_stream_ended(CHAT, transport.stream(CHAT)).await);
    assert_eq!(ended, TrackEndOutcome::Advanced { title: "B".into() });
    assert_eq!(titles(&controller), vec!["B"]);
    assert_eq!(transport.plays(), vec![path("A"), path("B")]);

    let ended = assert_ok!(controller.on_stream_ended(CHAT, transport.stream(CHAT)).await);
    assert_eq!(ended, TrackEndOutcome::Finished);
    assert!(!controller.is_playing(CHAT));
    assert!(controller.snapshot(CHAT).is_none());
    assert_eq!(transport.count(&Request::Leave(CHAT)), 1);
}

#[tokio::test]
async fn test_end_of_replaced_stream_is_ignored() {
    let (transport, controller) = setup();
    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);
    let first = transport.stream(CHAT);
    assert_ok!(controller.enqueue(CHAT, track("B"), false).await);

    assert_ok!(controller.skip(CHAT).await);
    assert_eq!(titles(&controller), vec!["B"]);

    // The skipped stream reports its end after the fact
    let ended = assert_ok!(controller.on_stream_ended(CHAT, first).await);
    assert_eq!(ended, TrackEndOutcome::Ignored);
    assert_eq!(titles(&controller), vec!["B"]);
    assert_eq!(transport.plays().len(), 2);
}

#[tokio::test]
async fn test_duplicate_end_notification_advances_once() {
    let (transport, controller) = setup();
    for name in ["A", "B", "C"] {
        assert_ok!(controller.enqueue(CHAT, track(name), false).await);
    }
    let stream = transport.stream(CHAT);

    assert_ok!(controller.on_stream_ended(CHAT, stream).await);
    let again = assert_ok!(controller.on_stream_ended(CHAT, stream).await);
    assert_eq!(again, TrackEndOutcome::Ignored);
    assert_eq!(titles(&controller), vec!["B", "C"]);
}

#[tokio::test]
async fn test_loop_replays_until_skipped() {
    let (transport, controller) = setup();
    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);
    assert_ok!(controller.enqueue(CHAT, track("B"), false).await);

    assert!(assert_ok!(controller.toggle_loop(CHAT).await));
    for _ in 0..2 {
        let ended = assert_ok!(controller.on_stream_ended(CHAT, transport.stream(CHAT)).await);
        assert_eq!(ended, TrackEndOutcome::Replayed { title: "A".into() });
    }
    assert_eq!(titles(&controller), vec!["A", "B"]);
    assert_eq!(transport.plays(), vec![path("A"), path("A"), path("A")]);

    let skipped = assert_ok!(controller.skip(CHAT).await);
    assert_eq!(skipped, SkipOutcome::Advanced { title: "B".into() });
    let snapshot = controller.snapshot(CHAT).unwrap();
    assert!(!snapshot.looping, "skip cancels looping");

    let ended = assert_ok!(controller.on_stream_ended(CHAT, transport.stream(CHAT)).await);
    assert_eq!(ended, TrackEndOutcome::Finished);
}

#[tokio::test]
async fn test_skip_last_track_leaves() {
    let (transport, controller) = setup();
    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);

    let skipped = assert_ok!(controller.skip(CHAT).await);
    assert_eq!(skipped, SkipOutcome::Finished);
    assert!(!controller.is_playing(CHAT));
    assert_eq!(transport.count(&Request::Leave(CHAT)), 1);
}

#[tokio::test]
async fn test_replace_starts_new_head_once() {
    let (transport, controller) = setup();
    for name in ["A", "B", "C"] {
        assert_ok!(controller.enqueue(CHAT, track(name), false).await);
    }
    assert_ok!(controller.toggle_loop(CHAT).await);

    let outcome = assert_ok!(controller.enqueue(CHAT, track("D"), true).await);
    assert_eq!(outcome, EnqueueOutcome::Started { title: "D".into() });
    assert_eq!(titles(&controller), vec!["D"]);
    assert_eq!(transport.plays(), vec![path("A"), path("D")]);
    assert!(!controller.snapshot(CHAT).unwrap().looping);
}

#[tokio::test]
async fn test_flag_operations_on_idle_chat() {
    let (transport, controller) = setup();

    assert!(matches!(controller.pause(CHAT).await, Err(AppError::EmptyQueue)));
    assert!(matches!(controller.resume(CHAT).await, Err(AppError::EmptyQueue)));
    assert!(matches!(controller.mute(CHAT).await, Err(AppError::EmptyQueue)));
    assert!(matches!(controller.unmute(CHAT).await, Err(AppError::EmptyQueue)));
    assert!(matches!(controller.toggle_loop(CHAT).await, Err(AppError::EmptyQueue)));
    assert!(matches!(controller.shuffle(CHAT).await, Err(AppError::EmptyQueue)));
    assert!(matches!(controller.skip(CHAT).await, Err(AppError::EmptyQueue)));
    assert!(matches!(controller.clear_pending(CHAT).await, Err(AppError::EmptyQueue)));

    assert!(!controller.is_playing(CHAT));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_pause_and_mute_skip_redundant_transport_calls() {
    let (transport, controller) = setup();
    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);

    assert!(assert_ok!(controller.pause(CHAT).await));
    assert!(!assert_ok!(controller.pause(CHAT).await));
    assert_eq!(transport.count(&Request::Pause(CHAT)), 1);
    assert!(controller.snapshot(CHAT).unwrap().paused);

    assert!(assert_ok!(controller.resume(CHAT).await));
    assert!(!controller.snapshot(CHAT).unwrap().paused);

    assert!(assert_ok!(controller.mute(CHAT).await));
    assert!(!assert_ok!(controller.mute(CHAT).await));
    assert!(assert_ok!(controller.unmute(CHAT).await));
    assert_eq!(transport.count(&Request::Mute(CHAT)), 1);
    assert_eq!(transport.count(&Request::Unmute(CHAT)), 1);
}

#[tokio::test]
async fn test_clear_and_shuffle_keep_current_track() {
    let (_transport, controller) = setup();
    for name in ["A", "B", "C", "D", "E"] {
        assert_ok!(controller.enqueue(CHAT, track(name), false).await);
    }

    assert!(assert_ok!(controller.shuffle(CHAT).await));
    let shuffled = titles(&controller);
    assert_eq!(shuffled[0], "A");
    let mut rest = shuffled[1..].to_vec();
    rest.sort();
    assert_eq!(rest, vec!["B", "C", "D", "E"]);

    assert_eq!(assert_ok!(controller.clear_pending(CHAT).await), 4);
    assert_eq!(titles(&controller), vec!["A"]);
    assert!(!assert_ok!(controller.shuffle(CHAT).await));
}

#[tokio::test]
async fn test_queue_full_rejects_append() {
    let (_transport, controller) = setup_with(PlayerConfig {
        max_queue_len: 2,
        ..Default::default()
    });
    assert_ok!(controller.enqueue(CHAT, track("A"), false).await);
    assert_ok!(controller.enqueue(CHAT, track("B"), false).await);

    let err = assert_err!(controller.enqueue(CHAT, track("C"), false).await);
    assert!(matches!(err, AppError::QueueFull(2)));
    assert_eq!(titles(&controller), vec!["A", "B"]);
}

#[tokio::test]
async fn test_playlist_starts_first_and_appends_rest() {
    let (transport, controller) = setup_with(PlayerConfig {
        max_queue_len: 3,
        ..Default::default()
    });
    let ticket = controller.ticket(CHAT);
    let tracks = ["A", "B", "C", "D"].into_iter().map(track).collect();

    let outcome = assert_ok!(controller.enqueue_playlist(ticket, tracks).await);
    assert_eq!(outcome.started.as_deref(), Some("A"));
    assert_eq!(outcome.added, 3);
    assert_eq!(outcome.dropped, 1);
    assert_eq!(titles(&controller), vec!["A", "B", "C"]);
    assert_eq!(transport.plays(), vec![path("A")]);
}

#[tokio::test]
async fn test_stop_cancels_in_flight_download() {
    let (transport, controller) = setup();
    assert_ok!(controller.join(CHAT, 77).await);
    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);

    // A download starts, then the user stops before it finishes
    let ticket = controller.ticket(CHAT);
    assert!(assert_ok!(controller.stop(CHAT).await));
    assert!(!controller.in_call(CHAT));

    let late = owned_track("late").await;
    let late_path = late.source_path.clone();
    let err = assert_err!(controller.enqueue_with_ticket(ticket, late, false).await);
    assert!(matches!(err, AppError::Cancelled));
    assert!(!controller.is_playing(CHAT));
    assert!(!late_path.exists(), "discarded download is deleted");
    assert_eq!(transport.plays(), vec![path("A")]);
}

#[tokio::test]
async fn test_ticket_survives_unrelated_changes() {
    let (_transport, controller) = setup();
    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);
    let ticket = controller.ticket(CHAT);
    assert_ok!(controller.enqueue(CHAT, track("B"), false).await);

    let outcome = assert_ok!(controller.enqueue_with_ticket(ticket, track("C"), false).await);
    assert!(matches!(outcome, EnqueueOutcome::Queued { position: 2, .. }));
}

#[tokio::test]
async fn test_finished_tracks_release_their_files() {
    let (transport, controller) = setup();
    let first = owned_track("first").await;
    let second = owned_track("second").await;
    let (first_path, second_path) = (first.source_path.clone(), second.source_path.clone());

    assert_ok!(controller.enqueue(CHAT, first, true).await);
    assert_ok!(controller.enqueue(CHAT, second, false).await);
    assert_ok!(controller.toggle_loop(CHAT).await);

    assert_ok!(controller.on_stream_ended(CHAT, transport.stream(CHAT)).await);
    assert!(first_path.exists(), "looping keeps the head's file");

    assert_ok!(controller.skip(CHAT).await);
    assert!(!first_path.exists());
    assert!(second_path.exists());

    assert_ok!(controller.stop(CHAT).await);
    assert!(!second_path.exists());
}

#[tokio::test]
async fn test_left_call_drops_state_without_leaving() {
    let (transport, controller) = setup();
    let mut events = controller.subscribe();
    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);
    let panel = PanelRef {
        channel_id: 5,
        message_id: 6,
    };
    assert!(controller.set_panel(CHAT, panel));

    controller.on_left_call(CHAT).await;
    assert!(!controller.is_playing(CHAT));
    assert!(controller.panel(CHAT).is_none());
    assert_eq!(transport.count(&Request::Leave(CHAT)), 0);

    assert_eq!(
        events.recv().await.unwrap(),
        PlaybackEvent::TrackStarted {
            chat: CHAT,
            title: "A".into()
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PlaybackEvent::Stopped {
            chat: CHAT,
            panel: Some(panel)
        }
    );
}

#[tokio::test]
async fn test_failed_start_keeps_head_for_retry() {
    let (transport, controller) = setup();
    for name in ["A", "B", "C"] {
        assert_ok!(controller.enqueue(CHAT, track(name), false).await);
    }
    let first = transport.stream(CHAT);
    transport.fail_play.store(true, Ordering::SeqCst);

    let err = assert_err!(controller.skip(CHAT).await);
    assert!(matches!(err, AppError::Transport(_)));
    assert_eq!(titles(&controller), vec!["B", "C"]);

    // The skipped stream's end does not move the queue again
    let ended = assert_ok!(controller.on_stream_ended(CHAT, first).await);
    assert_eq!(ended, TrackEndOutcome::Ignored);
    assert_eq!(titles(&controller), vec!["B", "C"]);

    transport.fail_play.store(false, Ordering::SeqCst);
    assert_eq!(assert_ok!(controller.start_current(CHAT).await), "B");
    assert_eq!(transport.plays(), vec![path("A"), path("B")]);

    let skipped = assert_ok!(controller.skip(CHAT).await);
    assert_eq!(skipped, SkipOutcome::Advanced { title: "C".into() });
}

#[tokio::test]
async fn test_failed_first_start_keeps_track_queued() {
    let (transport, controller) = setup();
    transport.fail_play.store(true, Ordering::SeqCst);

    let err = assert_err!(controller.enqueue(CHAT, track("A"), true).await);
    assert!(matches!(err, AppError::Transport(_)));
    assert_eq!(titles(&controller), vec!["A"]);

    transport.fail_play.store(false, Ordering::SeqCst);
    assert_eq!(assert_ok!(controller.start_current(CHAT).await), "A");
    let ended = assert_ok!(controller.on_stream_ended(CHAT, transport.stream(CHAT)).await);
    assert_eq!(ended, TrackEndOutcome::Finished);
}

#[tokio::test]
async fn test_hanging_transport_times_out() {
    let (transport, controller) = setup();
    transport.hang_play.store(true, Ordering::SeqCst);

    let err = assert_err!(controller.enqueue(CHAT, track("A"), true).await);
    assert!(matches!(err, AppError::Timeout { operation: "play" }));
    assert_eq!(titles(&controller), vec!["A"]);
    assert!(transport.plays().is_empty());
}

#[tokio::test]
async fn test_failed_controls_leave_state_unchanged() {
    let (transport, controller) = setup();
    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);
    assert_ok!(controller.enqueue(CHAT, track("B"), false).await);
    assert!(assert_ok!(controller.mute(CHAT).await));
    transport.fail_controls.store(true, Ordering::SeqCst);

    assert!(matches!(controller.pause(CHAT).await, Err(AppError::Transport(_))));
    assert!(matches!(controller.unmute(CHAT).await, Err(AppError::Transport(_))));

    let snapshot = controller.snapshot(CHAT).unwrap();
    assert!(!snapshot.paused);
    assert!(snapshot.muted);
    assert_eq!(snapshot.titles, vec!["A", "B"]);

    transport.fail_controls.store(false, Ordering::SeqCst);
    assert!(assert_ok!(controller.pause(CHAT).await));
    assert!(matches!(controller.resume(CHAT).await, Ok(true)));
}

#[tokio::test]
async fn test_failed_leave_still_clears_state() {
    let (transport, controller) = setup();
    let mut events = controller.subscribe();
    assert_ok!(controller.join(CHAT, 77).await);
    let track = owned_track("stopped").await;
    let file = track.source_path.clone();
    assert_ok!(controller.enqueue(CHAT, track, true).await);
    transport.fail_leave.store(true, Ordering::SeqCst);

    let err = assert_err!(controller.stop(CHAT).await);
    assert!(matches!(err, AppError::Transport(_)));
    assert!(!controller.is_playing(CHAT));
    assert!(controller.snapshot(CHAT).is_none());
    assert!(!file.exists());

    assert!(matches!(events.recv().await.unwrap(), PlaybackEvent::TrackStarted { .. }));
    assert!(matches!(events.recv().await.unwrap(), PlaybackEvent::Stopped { .. }));
}

#[tokio::test]
async fn test_download_survives_natural_finish() {
    let (transport, controller) = setup();
    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);

    // Download starts while the last track plays, which then ends on its own
    let ticket = controller.ticket(CHAT);
    let ended = assert_ok!(controller.on_stream_ended(CHAT, transport.stream(CHAT)).await);
    assert_eq!(ended, TrackEndOutcome::Finished);

    let outcome = assert_ok!(controller.enqueue_with_ticket(ticket, track("X"), false).await);
    assert_eq!(outcome, EnqueueOutcome::Started { title: "X".into() });
    assert_eq!(transport.plays(), vec![path("A"), path("X")]);
}

#[tokio::test]
async fn test_idle_chats_are_forgotten() {
    let (_transport, controller) = setup();
    assert_ok!(controller.join(CHAT, 77).await);
    assert_eq!(controller.tracked_chats(), 0);

    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);
    assert_eq!(controller.tracked_chats(), 1);

    assert_ok!(controller.stop(CHAT).await);
    assert_eq!(controller.tracked_chats(), 0);

    for chat in (1..=50).map(ChatId) {
        assert_ok!(controller.enqueue(chat, track("A"), true).await);
        assert_ok!(controller.skip(chat).await);
    }
    assert_eq!(controller.tracked_chats(), 0);
}

#[tokio::test]
async fn test_racing_skip_and_stream_end_stay_consistent() {
    for _ in 0..20 {
        let (transport, controller) = setup();
        for name in ["A", "B", "C"] {
            assert_ok!(controller.enqueue(CHAT, track(name), false).await);
        }
        let stream = transport.stream(CHAT);

        let ending = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.on_stream_ended(CHAT, stream).await })
        };
        let skipping = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.skip(CHAT).await })
        };
        assert_ok!(ending.await.unwrap());
        assert_ok!(skipping.await.unwrap());

        // Either the end advanced first and the skip moved on again, or the
        // skip won and the end notification was stale.
        let remaining = titles(&controller);
        assert!(remaining == vec!["C"] || remaining == vec!["B"], "{:?}", remaining);
        let head = PathBuf::from(format!("/music/{}.mp3", remaining[0]));
        assert_eq!(transport.plays().last(), Some(&head));
    }
}

#[tokio::test]
async fn test_event_loop_feeds_controller() {
    let (transport, controller) = setup();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = spawn_event_loop(controller.clone(), rx);

    assert_ok!(controller.enqueue(CHAT, track("A"), true).await);
    assert_ok!(controller.enqueue(CHAT, track("B"), false).await);
    tx.send(TransportEvent::StreamEnded {
        chat: CHAT,
        stream: transport.stream(CHAT),
    })
    .unwrap();

    let advanced = tokio::time::timeout(Duration::from_secs(2), async {
        while titles(&controller) != vec!["B"] {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(advanced.is_ok(), "stream end was not applied");

    tx.send(TransportEvent::LeftCall { chat: CHAT }).unwrap();
    let dropped = tokio::time::timeout(Duration::from_secs(2), async {
        while controller.is_playing(CHAT) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(dropped.is_ok(), "left call was not applied");

    drop(tx);
    assert_ok!(handle.await);
}

#[tokio::test]
async fn test_event_loop_keeps_notification_order() {
    for _ in 0..20 {
        let (transport, controller) = setup();
        let (tx, rx) = mpsc::unbounded_channel();
        assert_ok!(controller.enqueue(CHAT, track("A"), true).await);
        assert_ok!(controller.enqueue(CHAT, track("B"), false).await);

        // Both arrive before the loop runs; the end must land before the call drops
        tx.send(TransportEvent::StreamEnded {
            chat: CHAT,
            stream: transport.stream(CHAT),
        })
        .unwrap();
        tx.send(TransportEvent::LeftCall { chat: CHAT }).unwrap();
        drop(tx);
        assert_ok!(spawn_event_loop(controller.clone(), rx).await);

        assert_eq!(transport.plays(), vec![path("A"), path("B")]);
        assert!(!controller.is_playing(CHAT));
        assert_eq!(transport.count(&Request::Leave(CHAT)), 0);
    }
}
