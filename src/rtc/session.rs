use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    ChatEntry, ClientEvent, CursorEntry, MemberEntry, PresenceEntry, RoomSnapshot, ServerEvent,
};

use super::cursor::{offset_to_point, CursorPoint};
use super::peer::{LinkState, MediaBackend, PeerManager, SignalOutbox};
use super::presence::{PresenceTracker, PresenceWriter};
use super::signal::SignalPayload;
use super::RtcError;

/// Transport half of a room session: publish client events to the room's
/// live channel. Implemented over a WebSocket in production and over an
/// in-memory hub in tests.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    async fn publish(&self, event: ClientEvent) -> Result<(), RtcError>;
    /// Close the connection. The server drops this participant's
    /// ephemeral records when it notices.
    async fn close(&self) -> Result<(), RtcError>;
}

/// Signal outbox writing through the room transport
struct TransportOutbox {
    transport: Arc<dyn RoomTransport>,
}

#[async_trait]
impl SignalOutbox for TransportOutbox {
    async fn send(&self, to: &str, payload: SignalPayload) -> Result<(), RtcError> {
        self.transport
            .publish(ClientEvent::Signal {
                to: to.to_string(),
                payload,
            })
            .await
    }

    async fn ack(&self, id: Uuid) -> Result<(), RtcError> {
        self.transport.publish(ClientEvent::SignalAck { id }).await
    }
}

/// Presence writer publishing heartbeats through the room transport.
struct TransportPresenceWriter {
    transport: Arc<dyn RoomTransport>,
}

#[async_trait]
impl PresenceWriter for TransportPresenceWriter {
    async fn upsert(&self, audio_active: bool) -> Result<(), RtcError> {
        self.transport
            .publish(ClientEvent::Heartbeat { audio_active })
            .await
    }

    async fn delete(&self) -> Result<(), RtcError> {
        // The server deletes the presence record when the connection
        // closes; there is no separate delete event on the wire.
        Ok(())
    }
}

/// One participant's view of a room: local text state, remote presence
/// and cursors, the peer manager and the moderation guard.
///
/// Lifecycles are explicit: `start()` opens the presence heartbeat,
/// `stop()` tears everything down deterministically (timers first, then
/// connections, then remote records), independent of any UI timing.
pub struct RoomSession {
    identity: String,
    transport: Arc<dyn RoomTransport>,
    peers: PeerManager,
    presence: PresenceTracker,
    content: String,
    roster: Vec<PresenceEntry>,
    /// Last-seen audio flag per remote, for edge-triggering call
    /// initiation on the flip rather than the level
    seen_audio: HashMap<String, bool>,
    members: Vec<MemberEntry>,
    remote_cursors: HashMap<String, CursorEntry>,
    chat: Vec<ChatEntry>,
    muted: bool,
    forced_muted: bool,
    audio_active: bool,
}

impl RoomSession {
    pub fn new(
        identity: impl Into<String>,
        transport: Arc<dyn RoomTransport>,
        backend: Arc<dyn MediaBackend>,
    ) -> Self {
        let identity = identity.into();
        let outbox: Arc<dyn SignalOutbox> = Arc::new(TransportOutbox {
            transport: transport.clone(),
        });
        let writer: Arc<dyn PresenceWriter> = Arc::new(TransportPresenceWriter {
            transport: transport.clone(),
        });

        Self {
            identity: identity.clone(),
            transport,
            peers: PeerManager::new(identity, backend, outbox),
            presence: PresenceTracker::new(writer),
            content: String::new(),
            roster: Vec::new(),
            seen_audio: HashMap::new(),
            members: Vec::new(),
            remote_cursors: HashMap::new(),
            chat: Vec::new(),
            muted: false,
            forced_muted: false,
            audio_active: false,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_forced_muted(&self) -> bool {
        self.forced_muted
    }

    pub fn is_audio_active(&self) -> bool {
        self.audio_active
    }

    pub fn roster(&self) -> &[PresenceEntry] {
        &self.roster
    }

    pub fn members(&self) -> &[MemberEntry] {
        &self.members
    }

    pub fn chat(&self) -> &[ChatEntry] {
        &self.chat
    }

    pub fn remote_cursors(&self) -> &HashMap<String, CursorEntry> {
        &self.remote_cursors
    }

    pub fn active_connections(&self) -> Vec<String> {
        self.peers.active_connections()
    }

    /// Begin the session: presence record plus heartbeat
    pub async fn start(&mut self) -> Result<(), RtcError> {
        self.presence.start().await
    }

    /// Leave the room. Teardown order is fixed: stop timers, close
    /// connections, drop remote records. Failures are logged and never
    /// propagated; at worst they degrade to orphaned remote state.
    pub async fn stop(&mut self) {
        self.presence.stop().await;
        self.peers.stop_audio().await;
        if let Err(e) = self.transport.close().await {
            warn!("Failed to close room transport: {}", e);
        }
        self.audio_active = false;
        self.muted = false;
        self.forced_muted = false;
        self.seen_audio.clear();
        info!("Room session stopped for {}", self.identity);
    }

    /// Apply one event from the live channel
    pub async fn handle_event(&mut self, event: ServerEvent) -> Result<(), RtcError> {
        match event {
            ServerEvent::Room(snapshot) => {
                self.apply_room_snapshot(snapshot).await;
                Ok(())
            }
            ServerEvent::Presence { users } => self.apply_presence(users).await,
            ServerEvent::Cursor(entry) => {
                if entry.user_id != self.identity {
                    self.remote_cursors.insert(entry.user_id.clone(), entry);
                }
                Ok(())
            }
            ServerEvent::Chat(entry) => {
                self.chat.push(entry);
                Ok(())
            }
            ServerEvent::Members { members } => {
                self.members = members;
                Ok(())
            }
            ServerEvent::Signal(envelope) => {
                if envelope.to != self.identity {
                    return Ok(());
                }
                let outcome = self.peers.handle_signal(envelope).await?;
                if outcome.media_started {
                    // Pulled into the call by an offer: presence must now
                    // advertise the audio flag
                    self.audio_active = true;
                    if let Err(e) = self.presence.set_audio_active(true).await {
                        warn!("Failed to update presence after media start: {}", e);
                    }
                }
                Ok(())
            }
            ServerEvent::Error { message } => {
                warn!("Live channel error: {}", message);
                Ok(())
            }
        }
    }

    /// Replace local state with a room snapshot. Returns whether the
    /// content actually changed: an echo of the local write is a no-op,
    /// which is what keeps the unsuppressed round trip convergent.
    pub async fn apply_room_snapshot(&mut self, snapshot: RoomSnapshot) -> bool {
        let changed = snapshot.content != self.content;
        if changed {
            self.content = snapshot.content;
        }

        let force_muted = snapshot.muted_users.contains(&self.identity);
        if force_muted && !self.forced_muted {
            info!("Forced mute imposed on {}", self.identity);
            self.forced_muted = true;
            self.muted = true;
            self.peers.set_outgoing_enabled(false).await;
        } else if !force_muted && self.forced_muted {
            // Unmute capability returns, but the prior explicit mute
            // preference stays: no auto-unmute.
            info!("Forced mute lifted from {}", self.identity);
            self.forced_muted = false;
        }

        changed
    }

    async fn apply_presence(&mut self, users: Vec<PresenceEntry>) -> Result<(), RtcError> {
        self.roster = users;

        // A participant leaving the roster resets its remembered flag,
        // so a rejoin counts as a fresh flip
        let present: Vec<String> = self.roster.iter().map(|u| u.user_id.clone()).collect();
        self.seen_audio.retain(|uid, _| present.contains(uid));

        // The sole call-initiation trigger: a remote FLIPS audio-active
        // (edge, not level) while this side is audio-active and has not
        // offered yet. A participant arriving already audio-active
        // counts as a flip; a heartbeat refresh of an unchanged flag
        // does not. Late joiners are discovered through this same path.
        let mut targets: Vec<String> = Vec::new();
        for user in &self.roster {
            if user.user_id == self.identity {
                continue;
            }
            let previous = self
                .seen_audio
                .insert(user.user_id.clone(), user.audio_active)
                .unwrap_or(false);
            let flipped = user.audio_active && !previous;
            if flipped
                && self.audio_active
                && !self.peers.has_initiated(&user.user_id)
            {
                targets.push(user.user_id.clone());
            }
        }

        for remote in targets {
            info!("Presence change triggers call to {}", remote);
            self.peers.initiate_call(&remote).await?;
        }
        Ok(())
    }

    /// Local keystroke: optimistic local update, then whole-document
    /// publish. Last write wins; no merge.
    pub async fn on_local_edit(&mut self, new_text: String) -> Result<(), RtcError> {
        self.content = new_text.clone();
        self.transport
            .publish(ClientEvent::Edit { content: new_text })
            .await
    }

    /// Caret moved: convert the offset and publish the per-participant
    /// cursor record (overwrite semantics)
    pub async fn on_selection_change(&mut self, offset: usize) -> Result<CursorPoint, RtcError> {
        let point = offset_to_point(&self.content, offset);
        self.transport
            .publish(ClientEvent::Cursor {
                line: point.line,
                column: point.column,
            })
            .await?;
        Ok(point)
    }

    pub async fn send_chat(&mut self, content: String) -> Result<(), RtcError> {
        self.transport.publish(ClientEvent::Chat { content }).await
    }

    /// Start local audio and advertise it through presence.
    ///
    /// This side does not offer calls here: participants that were
    /// already audio-active see this flip through their presence
    /// subscription and initiate toward us, keeping initiation
    /// single-sided in the common staggered-start case.
    pub async fn start_audio(&mut self) -> Result<(), RtcError> {
        self.peers.start_local_audio().await?;
        self.audio_active = true;
        self.presence.set_audio_active(true).await
    }

    /// Stop local audio and tear down every call
    pub async fn stop_audio(&mut self) {
        self.peers.stop_audio().await;
        self.audio_active = false;
        self.muted = false;
        self.forced_muted = false;
        if let Err(e) = self.presence.set_audio_active(false).await {
            warn!("Failed to update presence on stop: {}", e);
        }
    }

    /// Toggle the local mute. Ignored while the owner has this
    /// participant on the mute list: forced mute always wins.
    pub async fn toggle_mute(&mut self) -> bool {
        if self.forced_muted {
            warn!("Unmute ignored: {} is muted by the room owner", self.identity);
            return self.muted;
        }
        if !self.audio_active {
            return self.muted;
        }

        self.muted = !self.muted;
        self.peers.set_outgoing_enabled(!self.muted).await;
        self.muted
    }

    /// Platform callback: the media link to a remote changed state.
    /// Teardown also forgets the remote's audio flag, so the next
    /// presence delivery counts as a flip and re-initiates within one
    /// heartbeat cycle.
    pub async fn on_peer_link_change(&mut self, remote: &str, state: LinkState) {
        if state != LinkState::Connected {
            self.seen_audio.remove(remote);
        }
        self.peers.on_link_state_change(remote, state).await;
    }

    /// Platform callback: a local network path candidate is ready
    pub async fn on_local_candidate(
        &mut self,
        remote: &str,
        candidate: crate::rtc::signal::CandidateInit,
    ) -> Result<(), RtcError> {
        self.peers.send_candidate(remote, candidate).await
    }

    pub fn peers(&self) -> &PeerManager {
        &self.peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtc::peer::tests::ScriptedBackend;
    use std::sync::Mutex;

    /// Transport that records published events
    #[derive(Default)]
    struct RecordingTransport {
        published: Mutex<Vec<ClientEvent>>,
        closed: Mutex<bool>,
    }

    #[async_trait]
    impl RoomTransport for RecordingTransport {
        async fn publish(&self, event: ClientEvent) -> Result<(), RtcError> {
            self.published.lock().unwrap().push(event);
            Ok(())
        }

        async fn close(&self) -> Result<(), RtcError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn snapshot(content: &str, muted_users: Vec<String>) -> RoomSnapshot {
        RoomSnapshot {
            room_id: "ABC123".to_string(),
            room_name: "demo".to_string(),
            language: "javascript".to_string(),
            content: content.to_string(),
            is_private: false,
            is_active: true,
            created_by: "alice".to_string(),
            muted_users,
        }
    }

    fn session(identity: &str) -> (RoomSession, Arc<RecordingTransport>, Arc<ScriptedBackend>) {
        let transport = Arc::new(RecordingTransport::default());
        let backend = Arc::new(ScriptedBackend::default());
        let session = RoomSession::new(identity, transport.clone(), backend.clone());
        (session, transport, backend)
    }

    #[tokio::test]
    async fn remote_update_equal_to_local_is_a_no_op() {
        let (mut session, _transport, _backend) = session("bob");

        session.on_local_edit("let x = 1;".to_string()).await.unwrap();
        // The echo of our own write comes back unsuppressed
        let changed = session
            .apply_room_snapshot(snapshot("let x = 1;", Vec::new()))
            .await;
        assert!(!changed);

        let changed = session
            .apply_room_snapshot(snapshot("let x = 2;", Vec::new()))
            .await;
        assert!(changed);
        assert_eq!(session.content(), "let x = 2;");
    }

    #[tokio::test]
    async fn forced_mute_wins_over_local_toggle() {
        let (mut session, _transport, backend) = session("bob");
        session.start_audio().await.unwrap();

        // Alice is in the call, so bob holds a live connection to her
        session
            .handle_event(ServerEvent::Presence {
                users: vec![PresenceEntry {
                    user_id: "alice".to_string(),
                    display_name: "alice".to_string(),
                    audio_active: true,
                    last_active: 0,
                }],
            })
            .await
            .unwrap();

        // Owner adds bob to the mute list
        session
            .apply_room_snapshot(snapshot("", vec!["bob".to_string()]))
            .await;
        assert!(session.is_forced_muted());
        assert!(session.is_muted());

        // A concurrent local unmute attempt is ignored
        let muted = session.toggle_mute().await;
        assert!(muted);
        assert!(session.is_muted());

        // Removal restores the capability but does not auto-unmute
        session.apply_room_snapshot(snapshot("", Vec::new())).await;
        assert!(!session.is_forced_muted());
        assert!(session.is_muted());

        let muted = session.toggle_mute().await;
        assert!(!muted);

        // The outgoing track was force-disabled exactly once by moderation
        let log = backend.log.lock().unwrap();
        assert!(log.iter().any(|op| op.ends_with("outgoing_enabled false")));
    }

    #[tokio::test]
    async fn presence_flip_triggers_exactly_one_offer() {
        let (mut session, transport, _backend) = session("alice");
        session.start_audio().await.unwrap();

        let bob = PresenceEntry {
            user_id: "bob".to_string(),
            display_name: "bob".to_string(),
            audio_active: true,
            last_active: 0,
        };

        session
            .handle_event(ServerEvent::Presence { users: vec![bob.clone()] })
            .await
            .unwrap();
        // A second identical roster must not re-offer
        session
            .handle_event(ServerEvent::Presence { users: vec![bob] })
            .await
            .unwrap();

        let published = transport.published.lock().unwrap();
        let offers = published
            .iter()
            .filter(|ev| matches!(ev, ClientEvent::Signal { payload, .. } if payload.kind() == "offer"))
            .count();
        assert_eq!(offers, 1);
    }

    #[tokio::test]
    async fn audio_inactive_side_does_not_initiate() {
        let (mut session, transport, _backend) = session("alice");

        let bob = PresenceEntry {
            user_id: "bob".to_string(),
            display_name: "bob".to_string(),
            audio_active: true,
            last_active: 0,
        };
        session
            .handle_event(ServerEvent::Presence { users: vec![bob] })
            .await
            .unwrap();

        let published = transport.published.lock().unwrap();
        assert!(!published
            .iter()
            .any(|ev| matches!(ev, ClientEvent::Signal { .. })));
    }

    #[tokio::test]
    async fn stop_runs_deterministic_teardown() {
        let (mut session, transport, _backend) = session("alice");
        session.start().await.unwrap();
        session.start_audio().await.unwrap();

        session.stop().await;
        assert!(*transport.closed.lock().unwrap());
        assert!(!session.is_audio_active());
        assert!(session.active_connections().is_empty());
    }

    #[tokio::test]
    async fn signals_addressed_elsewhere_are_ignored() {
        let (mut session, transport, backend) = session("carol");
        session.start_audio().await.unwrap();

        let envelope = crate::rtc::signal::SignalEnvelope {
            id: Uuid::new_v4(),
            from: "alice".to_string(),
            to: "bob".to_string(),
            payload: SignalPayload::Offer { sdp: "sdp".to_string() },
            timestamp: 0,
        };
        session
            .handle_event(ServerEvent::Signal(envelope))
            .await
            .unwrap();

        assert!(backend.opened.lock().unwrap().is_empty());
        let published = transport.published.lock().unwrap();
        assert!(!published
            .iter()
            .any(|ev| matches!(ev, ClientEvent::Signal { .. })));
    }
}
