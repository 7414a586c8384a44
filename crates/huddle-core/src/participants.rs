use crate::events::{MediaKind, Participant, RemoteMediaState, UNSET_UID, Uid};

/// Remote participants of the current call plus the local uid.
///
/// Updated by the engine event folder. Read by UI layers. The local user is
/// never part of the roster; its media lives in the track registry.
#[derive(Debug, Clone)]
pub struct Roster {
    participants: Vec<Participant>,
    local_uid: Uid,
}

impl Roster {
    pub fn new() -> Self {
        Self {
            participants: Vec::new(),
            local_uid: UNSET_UID,
        }
    }

    /// Record the uid the engine assigned us. Drops a roster entry that
    /// turns out to be ourselves.
    pub fn set_local_uid(&mut self, uid: Uid) {
        self.local_uid = uid;
        self.participants.retain(|p| p.id != uid);
    }

    pub fn local_uid(&self) -> Uid {
        self.local_uid
    }

    pub fn is_joined(&self) -> bool {
        self.local_uid != UNSET_UID
    }

    /// Add a participant with optimistic media flags. Returns `None` when
    /// the uid is already present, unset, or our own.
    pub fn add_participant(&mut self, id: Uid) -> Option<Participant> {
        if id == UNSET_UID || id == self.local_uid || self.participant(id).is_some() {
            return None;
        }
        let participant = Participant::joined(id);
        self.participants.push(participant);
        Some(participant)
    }

    pub fn remove_participant(&mut self, id: Uid) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.id != id);
        self.participants.len() != before
    }

    /// Apply a remote stream state. Only `Stopped` and `Decoding` change
    /// anything; the updated participant is returned.
    pub fn apply_media_state(
        &mut self,
        id: Uid,
        kind: MediaKind,
        state: RemoteMediaState,
    ) -> Option<Participant> {
        let live = match state {
            RemoteMediaState::Stopped => false,
            RemoteMediaState::Decoding => true,
            _ => return None,
        };
        let participant = self.participant_mut(id)?;
        match kind {
            MediaKind::Audio => participant.has_audio = live,
            MediaKind::Video => participant.has_video = live,
        }
        Some(*participant)
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: Uid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    fn participant_mut(&mut self, id: Uid) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
        self.local_uid = UNSET_UID;
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}
