//! Call session: mediates between UI commands and engine callbacks.
//!
//! UI shells call [`Session::initialize`], [`Session::join_channel`] and
//! [`Session::leave_channel`]. The engine answers through callbacks that are
//! folded synchronously into [`SessionState`]; listeners are notified after
//! the state lock is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::engine::{
    ChannelProfile, ClientRole, DeviceKind, DevicePlatform, EngineEventHandler,
    EngineSubscription, JoinOptions, MediaTrack, RtcEngine,
};
use crate::errors::{CallError, MissingDeviceKind};
use crate::events::{
    EngineEvent, EventEmitter, ListenerHandle, MediaKind, Participant, RemoteMediaState,
    SessionEvent, SessionEventListener, SessionStatus, UNSET_UID, Uid,
};
use crate::key;
use crate::layout::call_grid;
use crate::participants::Roster;
use crate::settings::CallConfig;
use crate::tracks::{MediaTracks, TileView, TrackRegistry, ViewBinding};

/// Result of folding one engine callback.
#[derive(Debug)]
pub struct Folded<T> {
    pub events: Vec<SessionEvent>,
    /// Tracks no longer referenced by the registry; the caller stops them.
    pub released: Vec<T>,
    /// Local tracks to hand to the engine now that the channel is joined.
    pub publish: Vec<T>,
}

impl<T> Folded<T> {
    fn none() -> Self {
        Self { events: Vec::new(), released: Vec::new(), publish: Vec::new() }
    }

    fn event(event: SessionEvent) -> Self {
        Self { events: vec![event], ..Self::none() }
    }
}

#[derive(Debug)]
pub struct SessionState<T> {
    status: SessionStatus,
    roster: Roster,
    tracks: TrackRegistry<T>,
    join_requested: bool,
}

impl<T: Clone> SessionState<T> {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Initializing,
            roster: Roster::new(),
            tracks: TrackRegistry::new(),
            join_requested: false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn tracks(&self) -> &TrackRegistry<T> {
        &self.tracks
    }

    /// Apply one engine callback.
    pub fn fold(&mut self, event: &EngineEvent) -> Folded<T> {
        match *event {
            EngineEvent::Error { code } => {
                tracing::error!(code, "engine reported error");
                Folded::event(SessionEvent::EngineError { code })
            }

            EngineEvent::JoinChannelSuccess { local_uid } => {
                if local_uid == UNSET_UID {
                    tracing::warn!("join success without a uid, ignoring");
                    return Folded::none();
                }
                tracing::info!(local_uid, "joined channel");
                self.roster.set_local_uid(local_uid);
                let local = self.tracks.bind(UNSET_UID);
                if local.audio.is_none() || local.video.is_none() {
                    tracing::warn!("joined without both local tracks");
                }
                Folded {
                    events: vec![SessionEvent::Joined { local_uid }],
                    released: self.tracks.remove_participant(local_uid).into_vec(),
                    publish: local.audio.into_iter().chain(local.video).collect(),
                }
            }

            EngineEvent::UserJoined { uid } => match self.roster.add_participant(uid) {
                Some(participant) => {
                    tracing::info!(uid, "participant joined");
                    Folded::event(SessionEvent::ParticipantJoined(participant))
                }
                None => {
                    tracing::debug!(uid, "ignoring join of known or local uid");
                    Folded::none()
                }
            },

            EngineEvent::UserOffline { uid } => {
                let released = self.tracks.remove_participant(uid).into_vec();
                let events = if self.roster.remove_participant(uid) {
                    tracing::info!(uid, "participant left");
                    vec![SessionEvent::ParticipantLeft(uid)]
                } else {
                    Vec::new()
                };
                Folded { events, released, ..Folded::none() }
            }

            EngineEvent::RemoteAudioStateChanged { uid, state } => {
                self.media_state(uid, MediaKind::Audio, state)
            }

            EngineEvent::RemoteVideoStateChanged { uid, state } => {
                self.media_state(uid, MediaKind::Video, state)
            }

            EngineEvent::UserPublished { uid, kind } => {
                if uid == UNSET_UID || uid == self.roster.local_uid() {
                    return Folded::none();
                }
                Folded::event(SessionEvent::TrackPublished { uid, kind })
            }

            EngineEvent::UserUnpublished { uid, kind } => Folded {
                events: vec![SessionEvent::TrackUnpublished { uid, kind }],
                released: self.tracks.remove_remote(uid, kind).into_iter().collect(),
                ..Folded::none()
            },

            EngineEvent::LeaveChannel => {
                tracing::info!(local_uid = self.roster.local_uid(), "left channel");
                self.roster.clear();
                self.join_requested = false;
                Folded {
                    events: vec![SessionEvent::Left],
                    released: self.tracks.clear_remote(),
                    ..Folded::none()
                }
            }
        }
    }

    fn media_state(&mut self, uid: Uid, kind: MediaKind, state: RemoteMediaState) -> Folded<T> {
        match self.roster.apply_media_state(uid, kind, state) {
            Some(participant) => Folded::event(SessionEvent::ParticipantUpdated(participant)),
            None => {
                tracing::debug!(uid, ?kind, ?state, "media state ignored");
                Folded::none()
            }
        }
    }
}

impl<T: Clone> Default for SessionState<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Engine handler that folds callbacks into the shared state.
///
/// Holds the engine weakly: the engine owns its handlers.
struct EventFolder<E: RtcEngine> {
    engine: Weak<E>,
    state: Arc<Mutex<SessionState<E::Track>>>,
    emitter: EventEmitter,
}

impl<E: RtcEngine> EngineEventHandler for EventFolder<E> {
    fn on_engine_event(&self, event: EngineEvent) {
        let folded = lock(&self.state).fold(&event);
        for track in folded.released {
            track.stop();
        }
        let mut events = folded.events;
        if !folded.publish.is_empty() {
            if let Some(engine) = self.engine.upgrade() {
                let code = engine.publish(&folded.publish);
                if code < 0 {
                    tracing::error!(code, "engine rejected local tracks");
                    events.push(SessionEvent::EngineError { code });
                } else {
                    tracing::debug!(tracks = folded.publish.len(), "published local tracks");
                }
            }
        }
        for event in events {
            self.emitter.emit(event);
        }
    }
}

fn setup_step(step: &str, code: i32) -> Result<(), CallError> {
    if code < 0 {
        return Err(CallError::EngineInit(format!("{step} returned {code}")));
    }
    Ok(())
}

/// One call screen's worth of engine, devices and roster.
///
/// Dropping the session leaves the channel if needed, unregisters from the
/// engine and releases the local devices.
pub struct Session<E: RtcEngine, P: DevicePlatform> {
    engine: Arc<E>,
    platform: P,
    config: CallConfig,
    state: Arc<Mutex<SessionState<E::Track>>>,
    emitter: EventEmitter,
    subscription: Option<EngineSubscription<E>>,
}

impl<E: RtcEngine, P: DevicePlatform> Session<E, P> {
    pub fn new(engine: Arc<E>, platform: P, config: CallConfig) -> Self {
        Self {
            engine,
            platform,
            config,
            state: Arc::new(Mutex::new(SessionState::new())),
            emitter: EventEmitter::new(),
            subscription: None,
        }
    }

    /// Register a listener for session notifications.
    #[must_use = "dropping the handle unregisters the listener"]
    pub fn add_listener(&self, listener: Arc<dyn SessionEventListener>) -> ListenerHandle {
        self.emitter.add_listener(listener)
    }

    pub fn status(&self) -> SessionStatus {
        lock(&self.state).status
    }

    pub fn is_joined(&self) -> bool {
        lock(&self.state).roster.is_joined()
    }

    pub fn local_uid(&self) -> Uid {
        lock(&self.state).roster.local_uid()
    }

    /// Snapshot of the remote participants in join order.
    pub fn participants(&self) -> Vec<Participant> {
        lock(&self.state).roster.participants().to_vec()
    }

    pub fn participant(&self, uid: Uid) -> Option<Participant> {
        lock(&self.state).roster.participant(uid).copied()
    }

    /// Live tracks for a uid; [`UNSET_UID`] is the local self-view.
    pub fn binding(&self, uid: Uid) -> ViewBinding<E::Track> {
        lock(&self.state).tracks.bind(uid)
    }

    /// Sized tiles for every remote participant followed by the self-view.
    pub fn tile_views(&self, container_width: f64, container_height: f64) -> Vec<TileView<E::Track>> {
        let state = lock(&self.state);
        let remote = state.roster.participants();
        let layout = call_grid(
            container_width,
            container_height,
            remote.len(),
            self.config.aspect_ratio,
        );
        remote
            .iter()
            .map(|p| state.tracks.bind(p.id))
            .chain(std::iter::once(state.tracks.bind(UNSET_UID)))
            .map(|binding| TileView::new(binding, &layout))
            .collect()
    }

    /// Acquire permissions and devices, bring up the engine and start the
    /// local preview. The session is `Ready` afterwards.
    pub async fn initialize(&mut self) -> Result<(), CallError> {
        if self.status() == SessionStatus::Ready {
            tracing::debug!("session already initialized");
            return Ok(());
        }

        self.platform
            .request_permissions()
            .await
            .map_err(CallError::PermissionDenied)?;

        let devices = self
            .platform
            .devices()
            .await
            .map_err(|e| CallError::EngineInit(format!("device enumeration: {e}")))?;
        let microphone = devices
            .iter()
            .find(|d| d.kind == DeviceKind::AudioInput)
            .ok_or(CallError::MissingDevice(MissingDeviceKind::Audio))?;
        let camera = devices
            .iter()
            .find(|d| d.kind == DeviceKind::VideoInput)
            .ok_or(CallError::MissingDevice(MissingDeviceKind::Video))?;

        self.engine
            .initialize(&self.config.engine)
            .await
            .map_err(CallError::EngineInit)?;

        let folder = Arc::new(EventFolder {
            engine: Arc::downgrade(&self.engine),
            state: self.state.clone(),
            emitter: self.emitter.clone(),
        });
        // Unregisters on any early return below.
        let subscription = EngineSubscription::register(self.engine.clone(), folder);

        setup_step("enable_video", self.engine.enable_video())?;
        setup_step("start_preview", self.engine.start_preview())?;
        setup_step(
            "set_channel_profile",
            self.engine.set_channel_profile(ChannelProfile::LiveBroadcasting),
        )?;
        setup_step(
            "set_client_role",
            self.engine.set_client_role(ClientRole::Broadcaster),
        )?;

        let local = self
            .create_local_tracks(&microphone.device_id, &camera.device_id)
            .await?;

        {
            let mut state = lock(&self.state);
            state.tracks.set_local(local);
            state.status = SessionStatus::Ready;
        }
        self.subscription = Some(subscription);

        tracing::info!(
            microphone = %microphone.label,
            camera = %camera.label,
            "session ready"
        );
        self.emitter.emit(SessionEvent::StatusChanged(SessionStatus::Ready));
        Ok(())
    }

    async fn create_local_tracks(
        &self,
        microphone_id: &str,
        camera_id: &str,
    ) -> Result<MediaTracks<E::Track>, CallError> {
        let audio = self
            .engine
            .create_microphone_track(microphone_id)
            .await
            .map_err(CallError::EngineInit)?;
        let video = match self.engine.create_camera_track(camera_id).await {
            Ok(video) => video,
            Err(e) => {
                audio.stop();
                audio.close();
                return Err(CallError::EngineInit(e));
            }
        };
        Ok(MediaTracks {
            audio: Some(audio),
            video: Some(video),
        })
    }

    /// Ask the engine to join the configured channel.
    ///
    /// Local state only changes once the engine confirms the join. A negative
    /// status code is returned as [`CallError::JoinRejected`]: the engine
    /// raises no error callback in that case.
    pub fn join_channel(&self) -> Result<(), CallError> {
        {
            let state = lock(&self.state);
            if state.status != SessionStatus::Ready {
                return Err(CallError::NotReady);
            }
            if !state.tracks.has_local(MediaKind::Audio) {
                return Err(CallError::MissingDevice(MissingDeviceKind::Audio));
            }
            if !state.tracks.has_local(MediaKind::Video) {
                return Err(CallError::MissingDevice(MissingDeviceKind::Video));
            }
        }

        let secret = self
            .config
            .encryption_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(secret) = secret {
            let encryption = key::encryption_config(secret, self.config.key_encoding)?;
            let code = self.engine.enable_encryption(true, &encryption);
            if code < 0 {
                tracing::error!(code, "engine rejected encryption config");
                return Err(CallError::Encryption { code });
            }
            tracing::debug!(encoding = ?self.config.key_encoding, "channel encryption enabled");
        }

        let code = self.engine.join_channel(
            &self.config.token,
            &self.config.channel_id,
            UNSET_UID,
            &JoinOptions::default(),
        );
        if code < 0 {
            tracing::error!(channel_id = %self.config.channel_id, code, "could not join channel");
            return Err(CallError::JoinRejected { code });
        }

        lock(&self.state).join_requested = true;
        Ok(())
    }

    /// Ask the engine to leave. The roster is cleared when the engine
    /// confirms.
    pub fn leave_channel(&self) {
        if self.status() != SessionStatus::Ready {
            tracing::debug!("leave before initialize, nothing to do");
            return;
        }
        let code = self.engine.leave_channel();
        if code < 0 {
            tracing::warn!(code, "engine rejected leave");
        }
        lock(&self.state).join_requested = false;
    }

    /// Subscribe to a published remote track and make it available for
    /// binding.
    pub async fn subscribe(&self, uid: Uid, kind: MediaKind) -> Result<(), CallError> {
        let track = self
            .engine
            .subscribe(uid, kind)
            .await
            .map_err(CallError::Subscribe)?;

        let stored = {
            let mut state = lock(&self.state);
            if state.roster.participant(uid).is_some() {
                Ok(state.tracks.insert_remote(uid, kind, track))
            } else {
                Err(track)
            }
        };
        match stored {
            Ok(Some(replaced)) => replaced.stop(),
            Ok(None) => {}
            Err(orphan) => {
                tracing::debug!(uid, ?kind, "participant left during subscribe");
                orphan.stop();
            }
        }
        Ok(())
    }

    /// Stop and release the local microphone and camera.
    pub fn stop_preview(&self) {
        let local = lock(&self.state).tracks.take_local();
        for track in local.into_vec() {
            track.stop();
            track.close();
        }
    }

    /// Leave if a leave is owed, unregister from the engine, release devices.
    /// Safe to call more than once.
    pub fn close(&mut self) {
        if self.subscription.is_some() {
            let leave_owed = {
                let state = lock(&self.state);
                state.join_requested || state.roster.is_joined()
            };
            // Leave while still registered so the confirmation is folded.
            if leave_owed {
                self.leave_channel();
            }
            self.subscription = None;
        }
        self.stop_preview();
    }
}

impl<E: RtcEngine, P: DevicePlatform> Drop for Session<E, P> {
    fn drop(&mut self) {
        self.close();
    }
}
