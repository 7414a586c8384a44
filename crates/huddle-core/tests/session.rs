use std::sync::{Arc, Mutex};

use huddle_core::engine::{DeviceKind, EngineLogLevel, Region};
use huddle_core::key::{KDF_SALT, KeyEncoding};
use huddle_core::layout::DEFAULT_ASPECT_RATIO;
use huddle_core::loopback::{EngineCommand, LoopbackEngine, LoopbackPlatform};
use huddle_core::{
    CallConfig, CallError, EngineEvent, MediaKind, MissingDeviceKind, Participant,
    RemoteMediaState, Session, SessionEvent, SessionEventListener, SessionStatus, UNSET_UID,
};

const SECRET: &str = "3fec184026b596204eb478afab3f5242fb0a07b4e0cc32a717f01e0fd8694d62";

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<SessionEvent>>,
}

impl Recorder {
    fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SessionEventListener for Recorder {
    fn on_event(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn config() -> CallConfig {
    CallConfig {
        engine: huddle_core::engine::EngineConfig {
            app_id: "app-id".to_string(),
            region: Region::Europe,
            log_level: EngineLogLevel::Info,
        },
        channel_id: "standup".to_string(),
        token: "token".to_string(),
        encryption_secret: None,
        key_encoding: KeyEncoding::DecodedAscii,
        aspect_ratio: DEFAULT_ASPECT_RATIO,
    }
}

fn session_with(
    engine: LoopbackEngine,
    platform: LoopbackPlatform,
    config: CallConfig,
) -> (Arc<LoopbackEngine>, Session<LoopbackEngine, LoopbackPlatform>) {
    let engine = Arc::new(engine);
    let session = Session::new(engine.clone(), platform, config);
    (engine, session)
}

async fn ready_session(
    engine: LoopbackEngine,
) -> (Arc<LoopbackEngine>, Session<LoopbackEngine, LoopbackPlatform>) {
    let (engine, mut session) = session_with(engine, LoopbackPlatform::new(), config());
    session.initialize().await.unwrap();
    (engine, session)
}

fn joins(engine: &LoopbackEngine) -> usize {
    engine
        .commands()
        .iter()
        .filter(|c| matches!(c, EngineCommand::JoinChannel { .. }))
        .count()
}

fn published(engine: &LoopbackEngine) -> Vec<Vec<uuid::Uuid>> {
    engine
        .commands()
        .into_iter()
        .filter_map(|c| match c {
            EngineCommand::Publish { track_ids } => Some(track_ids),
            _ => None,
        })
        .collect()
}

fn leaves(engine: &LoopbackEngine) -> usize {
    engine
        .commands()
        .iter()
        .filter(|c| matches!(c, EngineCommand::LeaveChannel))
        .count()
}

#[tokio::test]
async fn initialize_configures_engine_and_becomes_ready() {
    let (engine, mut session) = session_with(LoopbackEngine::new(), LoopbackPlatform::new(), config());
    let recorder = Arc::new(Recorder::default());
    let _handle = session.add_listener(recorder.clone());
    assert_eq!(session.status(), SessionStatus::Initializing);

    session.initialize().await.unwrap();

    assert_eq!(session.status(), SessionStatus::Ready);
    assert_eq!(engine.handler_count(), 1);
    let commands = engine.commands();
    assert_eq!(commands[0], EngineCommand::Initialize(config().engine));
    assert!(commands.contains(&EngineCommand::EnableVideo));
    assert!(commands.contains(&EngineCommand::StartPreview));
    assert!(commands.contains(&EngineCommand::CreateTrack {
        kind: MediaKind::Video,
        device_id: "cam-0".to_string(),
    }));
    assert_eq!(recorder.events(), vec![SessionEvent::StatusChanged(SessionStatus::Ready)]);

    let local = session.binding(UNSET_UID);
    assert!(local.audio.is_some() && local.video.is_some());
}

#[tokio::test]
async fn initialize_twice_is_a_no_op() {
    let (engine, mut session) = ready_session(LoopbackEngine::new()).await;
    session.initialize().await.unwrap();
    assert_eq!(engine.handler_count(), 1);
}

#[tokio::test]
async fn denied_permission_fails_before_engine_creation() {
    let platform = LoopbackPlatform::new().denying("camera blocked");
    let (engine, mut session) = session_with(LoopbackEngine::new(), platform, config());

    let err = session.initialize().await.unwrap_err();

    assert!(matches!(err, CallError::PermissionDenied(reason) if reason == "camera blocked"));
    assert!(engine.commands().is_empty());
    assert_eq!(session.status(), SessionStatus::Initializing);
}

#[tokio::test]
async fn missing_microphone_rejects_before_any_join() {
    let platform = LoopbackPlatform::new().without(DeviceKind::AudioInput);
    let (engine, mut session) = session_with(LoopbackEngine::new(), platform, config());

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, CallError::MissingDevice(MissingDeviceKind::Audio)));

    let err = session.join_channel().unwrap_err();
    assert!(matches!(err, CallError::NotReady));
    assert_eq!(joins(&engine), 0);
}

#[tokio::test]
async fn missing_camera_is_reported_as_video() {
    let platform = LoopbackPlatform::new().without(DeviceKind::VideoInput);
    let (_engine, mut session) = session_with(LoopbackEngine::new(), platform, config());

    let err = session.initialize().await.unwrap_err();
    assert_eq!(err.to_string(), "missing device: MISSING_VIDEO");
}

#[tokio::test]
async fn join_after_preview_stopped_reports_missing_device() {
    let (engine, session) = ready_session(LoopbackEngine::new()).await;
    session.stop_preview();

    let err = session.join_channel().unwrap_err();
    assert!(matches!(err, CallError::MissingDevice(MissingDeviceKind::Audio)));
    assert_eq!(joins(&engine), 0);
}

#[tokio::test]
async fn engine_failure_leaves_no_handler_behind() {
    let (engine, mut session) = session_with(
        LoopbackEngine::new().with_init_failure("bad app id"),
        LoopbackPlatform::new(),
        config(),
    );

    let err = session.initialize().await.unwrap_err();

    assert!(matches!(err, CallError::EngineInit(reason) if reason == "bad app id"));
    assert_eq!(engine.handler_count(), 0);
}

#[tokio::test]
async fn join_then_leave_round_trip() {
    let (engine, session) = ready_session(LoopbackEngine::new().with_local_uid(42)).await;
    let recorder = Arc::new(Recorder::default());
    let _handle = session.add_listener(recorder.clone());

    session.join_channel().unwrap();
    assert!(session.is_joined());
    assert_eq!(session.local_uid(), 42);

    engine.emit(EngineEvent::UserJoined { uid: 7 });
    session.leave_channel();

    assert!(!session.is_joined());
    assert_eq!(session.local_uid(), UNSET_UID);
    assert!(session.participants().is_empty());
    assert_eq!(
        recorder.events(),
        vec![
            SessionEvent::Joined { local_uid: 42 },
            SessionEvent::ParticipantJoined(Participant { id: 7, has_audio: true, has_video: true }),
            SessionEvent::Left,
        ]
    );
}

#[tokio::test]
async fn join_without_confirmation_leaves_state_untouched() {
    let (engine, session) = ready_session(LoopbackEngine::new()).await;
    session.join_channel().unwrap();
    assert_eq!(joins(&engine), 1);
    assert!(!session.is_joined());
    assert!(published(&engine).is_empty());
}

#[tokio::test]
async fn confirmed_join_publishes_local_tracks() {
    let (engine, session) = ready_session(LoopbackEngine::new().with_local_uid(42)).await;
    let local = session.binding(UNSET_UID);

    session.join_channel().unwrap();

    let (audio, video) = (local.audio.unwrap(), local.video.unwrap());
    assert_eq!(published(&engine), vec![vec![audio.id(), video.id()]]);
    let commands = engine.commands();
    let join_at = commands
        .iter()
        .position(|c| matches!(c, EngineCommand::JoinChannel { .. }))
        .unwrap();
    let publish_at = commands
        .iter()
        .position(|c| matches!(c, EngineCommand::Publish { .. }))
        .unwrap();
    assert!(join_at < publish_at);
}

#[tokio::test]
async fn rejected_publish_is_reported_without_leaving() {
    let (engine, session) =
        ready_session(LoopbackEngine::new().with_local_uid(42).with_publish_code(-3)).await;
    let recorder = Arc::new(Recorder::default());
    let _handle = session.add_listener(recorder.clone());

    session.join_channel().unwrap();

    assert!(session.is_joined());
    assert_eq!(published(&engine).len(), 1);
    assert_eq!(
        recorder.events(),
        vec![SessionEvent::Joined { local_uid: 42 }, SessionEvent::EngineError { code: -3 }]
    );
}

#[tokio::test]
async fn leave_before_initialize_is_a_no_op() {
    let (engine, session) = session_with(LoopbackEngine::new(), LoopbackPlatform::new(), config());
    session.leave_channel();
    assert!(engine.commands().is_empty());
}

#[tokio::test]
async fn rejected_join_is_reported_synchronously() {
    let (engine, session) = ready_session(LoopbackEngine::new().with_local_uid(42).with_join_code(-17)).await;

    let err = session.join_channel().unwrap_err();

    assert!(matches!(err, CallError::JoinRejected { code: -17 }));
    assert!(!session.is_joined());
    assert_eq!(joins(&engine), 1);
}

#[tokio::test]
async fn encryption_is_configured_before_join() {
    let mut config = config();
    config.encryption_secret = Some(SECRET.to_string());
    let (engine, mut session) = session_with(LoopbackEngine::new(), LoopbackPlatform::new(), config);
    session.initialize().await.unwrap();

    session.join_channel().unwrap();

    let commands = engine.commands();
    let encryption_at = commands
        .iter()
        .position(|c| matches!(c, EngineCommand::EnableEncryption { .. }))
        .unwrap();
    let join_at = commands
        .iter()
        .position(|c| matches!(c, EngineCommand::JoinChannel { .. }))
        .unwrap();
    assert!(encryption_at < join_at);
    match &commands[encryption_at] {
        EngineCommand::EnableEncryption { enabled, config } => {
            assert!(*enabled);
            assert_eq!(config.key.chars().count(), 32);
            assert_eq!(config.kdf_salt, KDF_SALT);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[tokio::test]
async fn raw_hex_encoding_passes_secret_through() {
    let mut config = config();
    config.encryption_secret = Some(SECRET.to_string());
    config.key_encoding = KeyEncoding::RawHex;
    let (engine, mut session) = session_with(LoopbackEngine::new(), LoopbackPlatform::new(), config);
    session.initialize().await.unwrap();

    session.join_channel().unwrap();

    assert!(engine.commands().iter().any(|c| matches!(
        c,
        EngineCommand::EnableEncryption { config, .. } if config.key == SECRET
    )));
}

#[tokio::test]
async fn blank_secret_leaves_encryption_off() {
    for secret in ["", "   "] {
        let mut config = config();
        config.encryption_secret = Some(secret.to_string());
        let (engine, mut session) = session_with(LoopbackEngine::new(), LoopbackPlatform::new(), config);
        session.initialize().await.unwrap();

        session.join_channel().unwrap();

        assert!(
            !engine
                .commands()
                .iter()
                .any(|c| matches!(c, EngineCommand::EnableEncryption { .. })),
            "secret {secret:?} enabled encryption"
        );
        assert_eq!(joins(&engine), 1);
    }
}

#[tokio::test]
async fn invalid_secret_blocks_join() {
    let mut config = config();
    config.encryption_secret = Some("xyz".to_string());
    let (engine, mut session) = session_with(LoopbackEngine::new(), LoopbackPlatform::new(), config);
    session.initialize().await.unwrap();

    assert!(matches!(session.join_channel(), Err(CallError::InvalidKey(_))));
    assert_eq!(joins(&engine), 0);
}

#[tokio::test]
async fn rejected_encryption_blocks_join() {
    let mut config = config();
    config.encryption_secret = Some(SECRET.to_string());
    let (engine, mut session) = session_with(
        LoopbackEngine::new().with_encryption_code(-2),
        LoopbackPlatform::new(),
        config,
    );
    session.initialize().await.unwrap();

    assert!(matches!(session.join_channel(), Err(CallError::Encryption { code: -2 })));
    assert_eq!(joins(&engine), 0);
}

#[tokio::test]
async fn media_state_events_update_roster() {
    let (engine, session) = ready_session(LoopbackEngine::new().with_local_uid(42)).await;
    session.join_channel().unwrap();

    engine.emit(EngineEvent::UserJoined { uid: 7 });
    engine.emit(EngineEvent::RemoteAudioStateChanged { uid: 7, state: RemoteMediaState::Stopped });
    engine.emit(EngineEvent::RemoteVideoStateChanged { uid: 7, state: RemoteMediaState::Decoding });

    assert_eq!(
        session.participants(),
        vec![Participant { id: 7, has_audio: false, has_video: true }]
    );
}

#[tokio::test]
async fn engine_errors_do_not_end_the_call() {
    let (engine, session) = ready_session(LoopbackEngine::new().with_local_uid(42)).await;
    let recorder = Arc::new(Recorder::default());
    let _handle = session.add_listener(recorder.clone());
    session.join_channel().unwrap();

    engine.emit(EngineEvent::Error { code: 1003 });

    assert!(session.is_joined());
    assert!(recorder.events().contains(&SessionEvent::EngineError { code: 1003 }));
}

#[tokio::test]
async fn published_tracks_bind_after_subscribe() {
    let (engine, session) = ready_session(LoopbackEngine::new().with_local_uid(42)).await;
    let recorder = Arc::new(Recorder::default());
    let _handle = session.add_listener(recorder.clone());
    session.join_channel().unwrap();
    engine.emit(EngineEvent::UserJoined { uid: 7 });
    engine.emit(EngineEvent::UserPublished { uid: 7, kind: MediaKind::Video });

    assert!(recorder.events().contains(&SessionEvent::TrackPublished { uid: 7, kind: MediaKind::Video }));
    assert!(session.binding(7).video.is_none());

    session.subscribe(7, MediaKind::Video).await.unwrap();
    let video = session.binding(7).video.unwrap();
    assert_eq!(video.owner(), 7);
    assert_eq!(video.kind(), MediaKind::Video);

    engine.emit(EngineEvent::UserOffline { uid: 7 });
    assert!(video.is_stopped());
    assert!(session.binding(7).video.is_none());
}

#[tokio::test]
async fn resubscribe_stops_the_replaced_track() {
    let (engine, session) = ready_session(LoopbackEngine::new().with_local_uid(42)).await;
    session.join_channel().unwrap();
    engine.emit(EngineEvent::UserJoined { uid: 7 });

    session.subscribe(7, MediaKind::Audio).await.unwrap();
    let first = session.binding(7).audio.unwrap();
    session.subscribe(7, MediaKind::Audio).await.unwrap();

    assert!(first.is_stopped());
    assert_ne!(session.binding(7).audio.unwrap(), first);
}

#[tokio::test]
async fn subscribe_for_departed_participant_is_discarded() {
    let (engine, session) = ready_session(LoopbackEngine::new().with_local_uid(42)).await;
    session.join_channel().unwrap();

    session.subscribe(9, MediaKind::Video).await.unwrap();

    assert!(session.binding(9).video.is_none());
    assert!(engine.commands().contains(&EngineCommand::Subscribe { uid: 9, kind: MediaKind::Video }));
}

#[tokio::test]
async fn failed_subscribe_surfaces_error() {
    let (engine, session) =
        ready_session(LoopbackEngine::new().with_local_uid(42).with_subscribe_failure("timeout")).await;
    session.join_channel().unwrap();
    engine.emit(EngineEvent::UserJoined { uid: 7 });

    let err = session.subscribe(7, MediaKind::Audio).await.unwrap_err();
    assert!(matches!(err, CallError::Subscribe(reason) if reason == "timeout"));
}

#[tokio::test]
async fn tile_views_size_remote_tiles_then_self() {
    let (engine, session) = ready_session(LoopbackEngine::new().with_local_uid(42)).await;
    session.join_channel().unwrap();
    engine.emit(EngineEvent::UserJoined { uid: 7 });
    engine.emit(EngineEvent::UserJoined { uid: 8 });

    let tiles = session.tile_views(918.0, 318.0);

    assert_eq!(tiles.len(), 3);
    assert!(tiles.iter().all(|t| t.width == 300 && t.height == 168));
    assert_eq!(tiles[0].binding.uid, 7);
    assert!(tiles[0].z_order_media_overlay);
    assert!(tiles[2].binding.is_local());
    assert!(tiles[2].binding.has_video());
}

#[tokio::test]
async fn dropping_session_leaves_then_unregisters() {
    let (engine, session) = ready_session(LoopbackEngine::new().with_local_uid(42)).await;
    let recorder = Arc::new(Recorder::default());
    let handle = session.add_listener(recorder.clone());
    session.join_channel().unwrap();
    let local = session.binding(UNSET_UID);

    drop(session);

    assert_eq!(leaves(&engine), 1);
    assert!(recorder.events().contains(&SessionEvent::Left));
    assert_eq!(engine.handler_count(), 0);
    let (audio, video) = (local.audio.unwrap(), local.video.unwrap());
    assert!(audio.is_stopped() && audio.is_closed());
    assert!(video.is_stopped() && video.is_closed());
    drop(handle);
}

#[tokio::test]
async fn close_is_idempotent() {
    let (engine, mut session) = ready_session(LoopbackEngine::new().with_local_uid(42)).await;
    session.join_channel().unwrap();

    session.close();
    session.close();
    drop(session);

    assert_eq!(leaves(&engine), 1);
}

#[tokio::test]
async fn closing_without_joining_does_not_leave() {
    let (engine, session) = ready_session(LoopbackEngine::new()).await;
    drop(session);
    assert_eq!(leaves(&engine), 0);
    assert_eq!(engine.handler_count(), 0);
}

#[tokio::test]
async fn repeated_sessions_do_not_accumulate_handlers() {
    let engine = Arc::new(LoopbackEngine::new().with_local_uid(42));
    for _ in 0..3 {
        let mut session = Session::new(engine.clone(), LoopbackPlatform::new(), config());
        session.initialize().await.unwrap();
        session.join_channel().unwrap();
        assert_eq!(engine.handler_count(), 1);
    }
    assert_eq!(engine.handler_count(), 0);
}
