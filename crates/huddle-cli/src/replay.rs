use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use huddle_core::loopback::{LoopbackEngine, LoopbackPlatform};
use huddle_core::{
    EngineEvent, MediaKind, Participant, Session, SessionEvent, SessionEventListener,
    SettingsStore, TileView, Uid,
};
use serde::Serialize;
use tokio::sync::mpsc;

/// Uid the loopback engine hands out for the local user.
const LOCAL_UID: Uid = 1;

/// Forwards published tracks so the replay loop can subscribe to them.
struct AutoSubscriber {
    tx: mpsc::UnboundedSender<(Uid, MediaKind)>,
}

impl SessionEventListener for AutoSubscriber {
    fn on_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::TrackPublished { uid, kind } => {
                tracing::info!("auto-subscribing {kind:?} of {uid}");
                let _ = self.tx.send((uid, kind));
            }
            other => tracing::info!("session event: {other:?}"),
        }
    }
}

/// Final state of a replayed call.
#[derive(Serialize, Debug)]
pub struct ReplaySummary {
    pub participants: Vec<Participant>,
    pub tiles: Vec<TileSummary>,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct TileSummary {
    /// 0 is the local self-view.
    pub uid: Uid,
    pub width: u32,
    pub height: u32,
    pub audio: bool,
    pub video: bool,
}

impl<T> From<TileView<T>> for TileSummary {
    fn from(tile: TileView<T>) -> Self {
        Self {
            uid: tile.binding.uid,
            width: tile.width,
            height: tile.height,
            audio: tile.binding.audio.is_some(),
            video: tile.binding.has_video(),
        }
    }
}

pub fn parse_script(script: &str) -> Result<Vec<EngineEvent>, serde_json::Error> {
    serde_json::from_str(script)
}

pub async fn run(
    events: &Path,
    data_dir: &Path,
    width: f64,
    height: f64,
) -> Result<ReplaySummary, Box<dyn Error>> {
    let script = parse_script(&std::fs::read_to_string(events)?)?;
    let settings = SettingsStore::new(data_dir).get();

    let engine = Arc::new(LoopbackEngine::new().with_local_uid(LOCAL_UID));
    let mut session = Session::new(engine.clone(), LoopbackPlatform::new(), settings.call_config());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _listener = session.add_listener(Arc::new(AutoSubscriber { tx }));

    session.initialize().await?;
    session.join_channel()?;

    for event in script {
        engine.emit(event);
        while let Ok((uid, kind)) = rx.try_recv() {
            if let Err(e) = session.subscribe(uid, kind).await {
                tracing::warn!("subscribe {kind:?} of {uid} failed: {e}");
            }
        }
    }

    let summary = ReplaySummary {
        participants: session.participants(),
        tiles: session.tile_views(width, height).into_iter().map(TileSummary::from).collect(),
    };
    session.close();
    Ok(summary)
}
