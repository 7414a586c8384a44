//! Live track registry and view binding.
//!
//! The registry is owned by one session and updated as tracks are created,
//! subscribed and dropped. Views look tracks up by uid on every render; a
//! missing track means "render nothing yet".

use std::collections::HashMap;

use crate::events::{MediaKind, UNSET_UID, Uid};
use crate::layout::TileLayout;

/// Audio and video track of one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTracks<T> {
    pub audio: Option<T>,
    pub video: Option<T>,
}

impl<T> MediaTracks<T> {
    pub fn empty() -> Self {
        Self { audio: None, video: None }
    }

    pub fn get(&self, kind: MediaKind) -> Option<&T> {
        match kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Video => self.video.as_ref(),
        }
    }

    fn slot(&mut self, kind: MediaKind) -> &mut Option<T> {
        match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Video => &mut self.video,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.audio.into_iter().chain(self.video).collect()
    }
}

impl<T> Default for MediaTracks<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// What a rendering surface needs for one tile. `uid` is [`UNSET_UID`]
/// for the local self-view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewBinding<T> {
    pub uid: Uid,
    pub audio: Option<T>,
    pub video: Option<T>,
}

impl<T> ViewBinding<T> {
    pub fn is_local(&self) -> bool {
        self.uid == UNSET_UID
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }
}

/// A sized tile ready for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileView<T> {
    pub binding: ViewBinding<T>,
    pub width: u32,
    pub height: u32,
    /// Draw the media surface above sibling surfaces (remote tiles).
    pub z_order_media_overlay: bool,
}

impl<T> TileView<T> {
    pub fn new(binding: ViewBinding<T>, layout: &TileLayout) -> Self {
        let z_order_media_overlay = !binding.is_local();
        Self {
            binding,
            width: layout.width,
            height: layout.height,
            z_order_media_overlay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackRegistry<T> {
    local: MediaTracks<T>,
    remote: HashMap<Uid, MediaTracks<T>>,
}

impl<T: Clone> TrackRegistry<T> {
    pub fn new() -> Self {
        Self {
            local: MediaTracks::empty(),
            remote: HashMap::new(),
        }
    }

    pub fn set_local(&mut self, tracks: MediaTracks<T>) -> MediaTracks<T> {
        std::mem::replace(&mut self.local, tracks)
    }

    pub fn has_local(&self, kind: MediaKind) -> bool {
        self.local.get(kind).is_some()
    }

    pub fn take_local(&mut self) -> MediaTracks<T> {
        std::mem::take(&mut self.local)
    }

    /// Store a subscribed remote track, returning the one it replaced.
    pub fn insert_remote(&mut self, uid: Uid, kind: MediaKind, track: T) -> Option<T> {
        self.remote.entry(uid).or_default().slot(kind).replace(track)
    }

    pub fn remove_remote(&mut self, uid: Uid, kind: MediaKind) -> Option<T> {
        let tracks = self.remote.get_mut(&uid)?;
        let removed = tracks.slot(kind).take();
        if tracks.is_empty() {
            self.remote.remove(&uid);
        }
        removed
    }

    pub fn remove_participant(&mut self, uid: Uid) -> MediaTracks<T> {
        self.remote.remove(&uid).unwrap_or_default()
    }

    pub fn clear_remote(&mut self) -> Vec<T> {
        self.remote
            .drain()
            .flat_map(|(_, tracks)| tracks.into_vec())
            .collect()
    }

    pub fn remote_count(&self) -> usize {
        self.remote.len()
    }

    /// Resolve the tracks for a uid; [`UNSET_UID`] resolves the local tracks.
    pub fn bind(&self, uid: Uid) -> ViewBinding<T> {
        let tracks = if uid == UNSET_UID {
            Some(&self.local)
        } else {
            self.remote.get(&uid)
        };
        ViewBinding {
            uid,
            audio: tracks.and_then(|t| t.audio.clone()),
            video: tracks.and_then(|t| t.video.clone()),
        }
    }
}

impl<T: Clone> Default for TrackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
