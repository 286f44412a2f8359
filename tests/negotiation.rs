//! End-to-end negotiation scenarios: two room sessions wired through an
//! in-memory live channel with real mailbox semantics (addressed
//! delivery, delete-after-ack, re-delivery until consumed).

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use uuid::Uuid;

use pastejet::models::{ClientEvent, PresenceEntry, RoomSnapshot, ServerEvent};
use pastejet::rtc::peer::{LinkState, MediaBackend, MediaSession, SignalingState};
use pastejet::rtc::session::{RoomSession, RoomTransport};
use pastejet::rtc::signal::{CandidateInit, SignalEnvelope};
use pastejet::rtc::RtcError;

// ── In-memory live channel ──────────────────────────────────────────

#[derive(Default)]
struct HubState {
    content: String,
    muted_users: Vec<String>,
    presence: HashMap<String, PresenceEntry>,
    mailboxes: HashMap<String, Vec<SignalEnvelope>>,
    queues: HashMap<String, VecDeque<ServerEvent>>,
}

#[derive(Default)]
struct LocalHub {
    state: Mutex<HubState>,
}

fn snapshot_of(state: &HubState) -> RoomSnapshot {
    RoomSnapshot {
        room_id: "ABC123".to_string(),
        room_name: "lab".to_string(),
        language: "javascript".to_string(),
        content: state.content.clone(),
        is_private: false,
        is_active: true,
        created_by: "alice".to_string(),
        muted_users: state.muted_users.clone(),
    }
}

impl LocalHub {
    async fn register(&self, identity: &str) {
        let mut state = self.state.lock().await;
        state.queues.insert(identity.to_string(), VecDeque::new());
    }

    /// The owner's moderation write: replace the mute list and broadcast
    /// the room document to every subscriber
    async fn set_muted_users(&self, muted_users: Vec<String>) {
        let mut state = self.state.lock().await;
        state.muted_users = muted_users;
        let snapshot = snapshot_of(&state);
        for queue in state.queues.values_mut() {
            queue.push_back(ServerEvent::Room(snapshot.clone()));
        }
    }

    async fn pending_signals(&self) -> usize {
        let state = self.state.lock().await;
        state.mailboxes.values().map(|m| m.len()).sum()
    }
}

struct LocalTransport {
    hub: Arc<LocalHub>,
    identity: String,
}

#[async_trait]
impl RoomTransport for LocalTransport {
    async fn publish(&self, event: ClientEvent) -> Result<(), RtcError> {
        let mut state = self.hub.state.lock().await;
        match event {
            ClientEvent::Edit { content } => {
                state.content = content;
                let snapshot = snapshot_of(&state);
                for queue in state.queues.values_mut() {
                    queue.push_back(ServerEvent::Room(snapshot.clone()));
                }
            }
            ClientEvent::Heartbeat { audio_active } => {
                state.presence.insert(
                    self.identity.clone(),
                    PresenceEntry {
                        user_id: self.identity.clone(),
                        display_name: self.identity.clone(),
                        audio_active,
                        last_active: 0,
                    },
                );
                let users: Vec<PresenceEntry> = state.presence.values().cloned().collect();
                for queue in state.queues.values_mut() {
                    queue.push_back(ServerEvent::Presence { users: users.clone() });
                }
            }
            ClientEvent::Signal { to, payload } => {
                let envelope = SignalEnvelope {
                    id: Uuid::new_v4(),
                    from: self.identity.clone(),
                    to: to.clone(),
                    payload,
                    timestamp: 0,
                };
                state
                    .mailboxes
                    .entry(to.clone())
                    .or_default()
                    .push(envelope.clone());
                if let Some(queue) = state.queues.get_mut(&to) {
                    queue.push_back(ServerEvent::Signal(envelope));
                }
            }
            ClientEvent::SignalAck { id } => {
                if let Some(mailbox) = state.mailboxes.get_mut(&self.identity) {
                    mailbox.retain(|envelope| envelope.id != id);
                }
            }
            ClientEvent::Cursor { .. } | ClientEvent::Chat { .. } => {}
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), RtcError> {
        let mut state = self.hub.state.lock().await;
        state.presence.remove(&self.identity);
        state.queues.remove(&self.identity);
        let users: Vec<PresenceEntry> = state.presence.values().cloned().collect();
        for queue in state.queues.values_mut() {
            queue.push_back(ServerEvent::Presence { users: users.clone() });
        }
        Ok(())
    }
}

// ── Scripted media layer ────────────────────────────────────────────

struct TestSession {
    remote: String,
    log: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl MediaSession for TestSession {
    async fn create_offer(&mut self) -> Result<String, RtcError> {
        Ok(format!("offer-for-{}", self.remote))
    }

    async fn create_answer(&mut self) -> Result<String, RtcError> {
        Ok(format!("answer-for-{}", self.remote))
    }

    async fn set_local_description(&mut self, _sdp: &str) -> Result<(), RtcError> {
        self.log.lock().unwrap().push(format!("{}: set_local", self.remote));
        Ok(())
    }

    async fn set_remote_description(&mut self, _sdp: &str) -> Result<(), RtcError> {
        self.log.lock().unwrap().push(format!("{}: set_remote", self.remote));
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: &CandidateInit) -> Result<(), RtcError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}: add_candidate {}", self.remote, candidate.candidate));
        Ok(())
    }

    async fn attach_local_tracks(&mut self) -> Result<(), RtcError> {
        self.log.lock().unwrap().push(format!("{}: attach", self.remote));
        Ok(())
    }

    async fn set_outgoing_enabled(&mut self, enabled: bool) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}: outgoing {}", self.remote, enabled));
    }

    async fn close(&mut self) {
        self.log.lock().unwrap().push(format!("{}: close", self.remote));
    }
}

#[derive(Default)]
struct TestBackend {
    log: Arc<StdMutex<Vec<String>>>,
}

impl MediaBackend for TestBackend {
    fn open_session(&self, remote: &str) -> Box<dyn MediaSession> {
        Box::new(TestSession {
            remote: remote.to_string(),
            log: self.log.clone(),
        })
    }
}

// ── Harness ─────────────────────────────────────────────────────────

async fn participant(
    hub: &Arc<LocalHub>,
    identity: &str,
) -> (RoomSession, Arc<TestBackend>) {
    hub.register(identity).await;
    let transport = Arc::new(LocalTransport {
        hub: hub.clone(),
        identity: identity.to_string(),
    });
    let backend = Arc::new(TestBackend::default());
    (RoomSession::new(identity, transport, backend.clone()), backend)
}

/// Deliver queued events round-robin until every queue is quiet.
/// Handling one event may enqueue more (an offer produces an answer),
/// so the loop runs to a fixed point.
async fn pump(hub: &Arc<LocalHub>, sessions: &mut [&mut RoomSession]) {
    loop {
        let mut delivered = false;
        for session in sessions.iter_mut() {
            let event = {
                let mut state = hub.state.lock().await;
                state
                    .queues
                    .get_mut(session.identity())
                    .and_then(|queue| queue.pop_front())
            };
            if let Some(event) = event {
                session.handle_event(event).await.expect("event handling failed");
                delivered = true;
            }
        }
        if !delivered {
            break;
        }
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

/// A starts audio, B follows; A's presence subscription triggers the
/// offer, B answers, candidates flow, and both sides end up listing the
/// other as an active connection with every mailbox entry consumed.
#[tokio::test]
async fn two_participants_establish_a_call() {
    let hub = Arc::new(LocalHub::default());
    let (mut alice, _alice_media) = participant(&hub, "alice").await;
    let (mut bob, bob_media) = participant(&hub, "bob").await;

    alice.start().await.unwrap();
    bob.start().await.unwrap();
    pump(&hub, &mut [&mut alice, &mut bob]).await;

    alice.start_audio().await.unwrap();
    pump(&hub, &mut [&mut alice, &mut bob]).await;

    // Nobody calls yet: bob is not audio-active
    assert!(alice.peers().signaling_state("bob").is_none());

    bob.start_audio().await.unwrap();
    pump(&hub, &mut [&mut alice, &mut bob]).await;

    // Alice offered, bob answered, both sides are back to stable
    assert_eq!(
        alice.peers().signaling_state("bob"),
        Some(SignalingState::Stable)
    );
    assert_eq!(
        bob.peers().signaling_state("alice"),
        Some(SignalingState::Stable)
    );
    assert!(alice.peers().has_initiated("bob"));

    // Candidates discovered after the descriptions apply immediately
    alice
        .on_local_candidate(
            "bob",
            CandidateInit {
                candidate: "cand-a1".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
                username_fragment: None,
            },
        )
        .await
        .unwrap();
    pump(&hub, &mut [&mut alice, &mut bob]).await;
    {
        let log = bob_media.log.lock().unwrap();
        assert!(log.iter().any(|op| op == "alice: add_candidate cand-a1"));
    }

    // The platform reports connectivity; both sides list each other
    alice.on_peer_link_change("bob", LinkState::Connected).await;
    bob.on_peer_link_change("alice", LinkState::Connected).await;
    assert_eq!(alice.active_connections(), vec!["bob".to_string()]);
    assert_eq!(bob.active_connections(), vec!["alice".to_string()]);

    // Every signaling message was consumed and deleted
    assert_eq!(hub.pending_signals().await, 0);
}

/// Simultaneous mutual offers: each side drops the other's offer by
/// state-check and deletes it. With no tie-break both negotiations
/// stall until presence churn restarts one side; the discard itself
/// must stay clean.
#[tokio::test]
async fn simultaneous_offers_are_both_discarded() {
    let hub = Arc::new(LocalHub::default());
    let (mut alice, _alice_media) = participant(&hub, "alice").await;
    let (mut bob, _bob_media) = participant(&hub, "bob").await;

    alice.start().await.unwrap();
    bob.start().await.unwrap();
    pump(&hub, &mut [&mut alice, &mut bob]).await;

    // Both flip audio before either hears about the other, so the first
    // presence delivery makes each side offer at once
    alice.start_audio().await.unwrap();
    bob.start_audio().await.unwrap();
    pump(&hub, &mut [&mut alice, &mut bob]).await;

    // Glare: both offers were discarded, both sides still hold their
    // own outgoing offer
    assert_eq!(
        alice.peers().signaling_state("bob"),
        Some(SignalingState::HaveLocalOffer)
    );
    assert_eq!(
        bob.peers().signaling_state("alice"),
        Some(SignalingState::HaveLocalOffer)
    );

    // The dropped offers were still deleted from the mailboxes
    assert_eq!(hub.pending_signals().await, 0);
}

/// Owner mutes everyone but itself: each muted member's outgoing track
/// disables within one room snapshot, the owner's stays untouched, and
/// a member's own unmute attempt keeps losing until the list clears.
#[tokio::test]
async fn mute_all_excludes_the_owner() {
    let hub = Arc::new(LocalHub::default());
    let (mut alice, alice_media) = participant(&hub, "alice").await;
    let (mut bob, bob_media) = participant(&hub, "bob").await;

    alice.start().await.unwrap();
    bob.start().await.unwrap();
    alice.start_audio().await.unwrap();
    bob.start_audio().await.unwrap();
    pump(&hub, &mut [&mut alice, &mut bob]).await;

    // The owner builds the target list from presence minus itself
    let targets: Vec<String> = {
        let state = hub.state.lock().await;
        state
            .presence
            .keys()
            .filter(|uid| uid.as_str() != "alice")
            .cloned()
            .collect()
    };
    hub.set_muted_users(targets).await;
    pump(&hub, &mut [&mut alice, &mut bob]).await;

    assert!(bob.is_forced_muted());
    assert!(bob.is_muted());
    assert!(!alice.is_forced_muted());
    assert!(!alice.is_muted());

    {
        let log = bob_media.log.lock().unwrap();
        assert!(log.iter().any(|op| op.ends_with("outgoing false")));
    }
    {
        let log = alice_media.log.lock().unwrap();
        assert!(!log.iter().any(|op| op.ends_with("outgoing false")));
    }

    // Bob's own unmute attempt loses while the list names him
    let muted = bob.toggle_mute().await;
    assert!(muted);

    // Clearing the list restores capability without auto-unmuting
    hub.set_muted_users(Vec::new()).await;
    pump(&hub, &mut [&mut alice, &mut bob]).await;
    assert!(!bob.is_forced_muted());
    assert!(bob.is_muted());
    let muted = bob.toggle_mute().await;
    assert!(!muted);
}

/// Text sync is last-write-wins at whole-document granularity, and the
/// unsuppressed echo of a participant's own write converges as a no-op.
#[tokio::test]
async fn text_sync_is_last_write_wins() {
    let hub = Arc::new(LocalHub::default());
    let (mut alice, _alice_media) = participant(&hub, "alice").await;
    let (mut bob, _bob_media) = participant(&hub, "bob").await;

    alice.start().await.unwrap();
    bob.start().await.unwrap();
    pump(&hub, &mut [&mut alice, &mut bob]).await;

    alice.on_local_edit("fn a() {}".to_string()).await.unwrap();
    bob.on_local_edit("fn b() {}".to_string()).await.unwrap();
    pump(&hub, &mut [&mut alice, &mut bob]).await;

    // The later write overwrote the earlier one everywhere; alice's
    // keystrokes are simply gone
    assert_eq!(alice.content(), "fn b() {}");
    assert_eq!(bob.content(), "fn b() {}");
}
