use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::signal::{CandidateInit, SignalEnvelope, SignalPayload};
use super::RtcError;

/// Mirror of the platform signaling states a connection walks through
/// during negotiation. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

/// Connectivity of the underlying media link, as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// One bidirectional media connection to a remote participant.
///
/// Implementations wrap the platform peer-connection object; the engine
/// only drives the negotiation sequence through this seam.
#[async_trait]
pub trait MediaSession: Send {
    async fn create_offer(&mut self) -> Result<String, RtcError>;
    async fn create_answer(&mut self) -> Result<String, RtcError>;
    async fn set_local_description(&mut self, sdp: &str) -> Result<(), RtcError>;
    async fn set_remote_description(&mut self, sdp: &str) -> Result<(), RtcError>;
    async fn add_ice_candidate(&mut self, candidate: &CandidateInit) -> Result<(), RtcError>;
    /// Attach the local microphone track to this connection
    async fn attach_local_tracks(&mut self) -> Result<(), RtcError>;
    /// Enable or disable the outgoing audio track
    async fn set_outgoing_enabled(&mut self, enabled: bool);
    /// Close the connection and detach any remote audio sink
    async fn close(&mut self);
}

/// Factory for media sessions, one per remote participant
pub trait MediaBackend: Send + Sync {
    fn open_session(&self, remote: &str) -> Box<dyn MediaSession>;
}

/// Outbound half of the signaling channel: send-and-forget writes plus
/// the delete-after-consume ack.
#[async_trait]
pub trait SignalOutbox: Send + Sync {
    async fn send(&self, to: &str, payload: SignalPayload) -> Result<(), RtcError>;
    async fn ack(&self, id: Uuid) -> Result<(), RtcError>;
}

/// What processing one signaling message did beyond signaling itself
#[derive(Debug, Default, Clone, Copy)]
pub struct HandleOutcome {
    /// An incoming offer pulled this side into the call: local media was
    /// acquired before answering
    pub media_started: bool,
}

struct PeerLink {
    session: Box<dyn MediaSession>,
    state: SignalingState,
    remote_description_set: bool,
    /// Candidates that arrived before the remote description, with the
    /// mailbox id of each so it can be deleted once applied
    candidate_queue: Vec<(CandidateInit, Uuid)>,
}

/// Owns one media connection per remote participant and drives the
/// negotiation state machine.
///
/// Glare is resolved by state-check discard only: when both sides offer
/// at once, each drops the other's offer and one side's re-initiate
/// (via presence) eventually wins. There is no polite-peer tie-break.
pub struct PeerManager {
    identity: String,
    backend: Arc<dyn MediaBackend>,
    outbox: Arc<dyn SignalOutbox>,
    links: HashMap<String, PeerLink>,
    /// Remotes this side has sent an offer to and not torn down since
    initiated: HashSet<String>,
    /// Remotes with a connected media link, for display
    active: HashSet<String>,
    volumes: HashMap<String, f32>,
    local_audio: bool,
}

impl PeerManager {
    pub fn new(
        identity: impl Into<String>,
        backend: Arc<dyn MediaBackend>,
        outbox: Arc<dyn SignalOutbox>,
    ) -> Self {
        Self {
            identity: identity.into(),
            backend,
            outbox,
            links: HashMap::new(),
            initiated: HashSet::new(),
            active: HashSet::new(),
            volumes: HashMap::new(),
            local_audio: false,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn local_audio_active(&self) -> bool {
        self.local_audio
    }

    pub fn has_initiated(&self, remote: &str) -> bool {
        self.initiated.contains(remote)
    }

    pub fn signaling_state(&self, remote: &str) -> Option<SignalingState> {
        self.links.get(remote).map(|link| link.state)
    }

    /// Remotes with an established media link, sorted for stable display
    pub fn active_connections(&self) -> Vec<String> {
        let mut connections: Vec<String> = self.active.iter().cloned().collect();
        connections.sort();
        connections
    }

    pub fn set_volume(&mut self, remote: &str, volume: f32) {
        self.volumes.insert(remote.to_string(), volume.clamp(0.0, 1.0));
    }

    pub fn volume(&self, remote: &str) -> f32 {
        self.volumes.get(remote).copied().unwrap_or(1.0)
    }

    /// Get the link for a remote, opening a fresh connection when none
    /// exists or the existing one is terminally closed.
    async fn ensure_link(&mut self, remote: &str) -> Result<&mut PeerLink, RtcError> {
        let needs_new = match self.links.get(remote) {
            None => true,
            Some(link) => link.state == SignalingState::Closed,
        };

        if needs_new {
            info!("Creating new peer connection for {}", remote);
            let mut session = self.backend.open_session(remote);
            if self.local_audio {
                session.attach_local_tracks().await?;
            }
            self.links.insert(
                remote.to_string(),
                PeerLink {
                    session,
                    state: SignalingState::Stable,
                    remote_description_set: false,
                    candidate_queue: Vec::new(),
                },
            );
        }

        self.links
            .get_mut(remote)
            .ok_or_else(|| RtcError::Media(format!("no connection for {}", remote)))
    }

    /// Offer a call to a remote participant.
    ///
    /// A no-op while a negotiation with that remote is already in flight:
    /// re-entrant calls must not produce a second offer.
    pub async fn initiate_call(&mut self, remote: &str) -> Result<(), RtcError> {
        if remote == self.identity {
            return Ok(());
        }

        if let Some(link) = self.links.get(remote) {
            if link.state == SignalingState::HaveLocalOffer
                || link.state == SignalingState::HaveRemoteOffer
            {
                warn!(
                    "Cannot initiate call to {}, connection not in stable state: {:?}",
                    remote, link.state
                );
                return Ok(());
            }
        }

        self.initiated.insert(remote.to_string());
        let result = self.send_offer(remote).await;
        if result.is_err() {
            // A failed offer must not block a later re-initiate
            self.initiated.remove(remote);
        }
        result
    }

    async fn send_offer(&mut self, remote: &str) -> Result<(), RtcError> {
        let outbox = self.outbox.clone();
        let link = self.ensure_link(remote).await?;

        let sdp = link.session.create_offer().await?;
        link.session.set_local_description(&sdp).await?;
        link.state = SignalingState::HaveLocalOffer;

        info!("Sending offer to {}", remote);
        outbox.send(remote, SignalPayload::Offer { sdp }).await
    }

    /// Process one inbound signaling message.
    ///
    /// Dropped messages (wrong state) are still acked: recovery relies on
    /// the sender retrying or a presence change triggering a new offer.
    pub async fn handle_signal(
        &mut self,
        envelope: SignalEnvelope,
    ) -> Result<HandleOutcome, RtcError> {
        if envelope.from == self.identity {
            info!("Ignoring signaling message from self");
            return Ok(HandleOutcome::default());
        }

        match envelope.payload.clone() {
            SignalPayload::Offer { sdp } => self.handle_offer(&envelope.from, envelope.id, sdp).await,
            SignalPayload::Answer { sdp } => {
                self.handle_answer(&envelope.from, envelope.id, sdp).await?;
                Ok(HandleOutcome::default())
            }
            SignalPayload::Candidate(candidate) => {
                self.handle_candidate(&envelope.from, envelope.id, candidate)
                    .await?;
                Ok(HandleOutcome::default())
            }
        }
    }

    async fn handle_offer(
        &mut self,
        remote: &str,
        id: Uuid,
        sdp: String,
    ) -> Result<HandleOutcome, RtcError> {
        let outbox = self.outbox.clone();

        // Reject mid-negotiation offers (glare): state-check discard
        if let Some(link) = self.links.get(remote) {
            if link.state != SignalingState::Stable && link.state != SignalingState::Closed {
                warn!(
                    "Ignoring offer from {} in non-stable state: {:?}",
                    remote, link.state
                );
                outbox.ack(id).await?;
                return Ok(HandleOutcome::default());
            }
        }

        // An offer pulls a passive participant into the call: local media
        // must be running before the answer goes out.
        let mut outcome = HandleOutcome::default();
        if !self.local_audio {
            info!("No local media yet, starting audio for offer from {}", remote);
            self.start_local_audio().await?;
            outcome.media_started = true;
        }

        let link = self.ensure_link(remote).await?;
        link.session.set_remote_description(&sdp).await?;
        link.remote_description_set = true;
        link.state = SignalingState::HaveRemoteOffer;

        Self::flush_candidates(link, &outbox).await?;

        let answer = link.session.create_answer().await?;
        link.session.set_local_description(&answer).await?;
        link.state = SignalingState::Stable;

        info!("Sending answer to {}", remote);
        outbox.send(remote, SignalPayload::Answer { sdp: answer }).await?;
        outbox.ack(id).await?;
        Ok(outcome)
    }

    async fn handle_answer(&mut self, remote: &str, id: Uuid, sdp: String) -> Result<(), RtcError> {
        let outbox = self.outbox.clone();

        let Some(link) = self.links.get_mut(remote) else {
            warn!("Answer from {} with no connection", remote);
            outbox.ack(id).await?;
            return Ok(());
        };
        if link.state != SignalingState::HaveLocalOffer {
            warn!("Ignoring answer from {} in wrong state: {:?}", remote, link.state);
            outbox.ack(id).await?;
            return Ok(());
        }

        link.session.set_remote_description(&sdp).await?;
        link.remote_description_set = true;
        link.state = SignalingState::Stable;

        Self::flush_candidates(link, &outbox).await?;
        outbox.ack(id).await?;
        info!("Answer from {} applied", remote);
        Ok(())
    }

    async fn handle_candidate(
        &mut self,
        remote: &str,
        id: Uuid,
        candidate: CandidateInit,
    ) -> Result<(), RtcError> {
        let outbox = self.outbox.clone();
        let link = self.ensure_link(remote).await?;

        // Candidates must never be applied before the remote description
        if !link.remote_description_set {
            info!("Queuing ICE candidate from {}", remote);
            link.candidate_queue.push((candidate, id));
            return Ok(());
        }

        link.session.add_ice_candidate(&candidate).await?;
        outbox.ack(id).await?;
        Ok(())
    }

    /// Apply queued candidates in arrival order, deleting each mailbox
    /// entry as it lands. Runs right after a remote description is set.
    async fn flush_candidates(
        link: &mut PeerLink,
        outbox: &Arc<dyn SignalOutbox>,
    ) -> Result<(), RtcError> {
        if link.candidate_queue.is_empty() {
            return Ok(());
        }

        info!("Applying {} queued candidates", link.candidate_queue.len());
        for (candidate, id) in std::mem::take(&mut link.candidate_queue) {
            link.session.add_ice_candidate(&candidate).await?;
            outbox.ack(id).await?;
        }
        Ok(())
    }

    /// Platform callback: a local network path candidate is ready to
    /// share with the remote side. Send and forget.
    pub async fn send_candidate(
        &mut self,
        remote: &str,
        candidate: CandidateInit,
    ) -> Result<(), RtcError> {
        self.outbox
            .send(remote, SignalPayload::Candidate(candidate))
            .await
    }

    /// React to a connectivity change of the media link
    pub async fn on_link_state_change(&mut self, remote: &str, state: LinkState) {
        match state {
            LinkState::Connected => {
                self.active.insert(remote.to_string());
            }
            LinkState::Disconnected | LinkState::Failed | LinkState::Closed => {
                warn!("Link to {} is {:?}, tearing down", remote, state);
                if let Some(mut link) = self.links.remove(remote) {
                    link.session.close().await;
                }
                // Allow a future re-initiate toward this remote
                self.initiated.remove(remote);
                self.active.remove(remote);
                self.volumes.remove(remote);
            }
        }
    }

    /// Mark local audio as running and attach the microphone track to
    /// every connection that is not terminally closed.
    pub async fn start_local_audio(&mut self) -> Result<(), RtcError> {
        if self.local_audio {
            return Ok(());
        }
        self.local_audio = true;

        for (remote, link) in self.links.iter_mut() {
            if link.state != SignalingState::Closed {
                info!("Adding local track to existing connection for {}", remote);
                link.session.attach_local_tracks().await?;
            }
        }
        Ok(())
    }

    /// Tear down every connection and reset call state
    pub async fn stop_audio(&mut self) {
        for (_, mut link) in self.links.drain() {
            link.session.close().await;
        }
        self.initiated.clear();
        self.active.clear();
        self.volumes.clear();
        self.local_audio = false;
    }

    /// Enable or disable the outgoing audio track on every connection
    pub async fn set_outgoing_enabled(&mut self, enabled: bool) {
        for link in self.links.values_mut() {
            link.session.set_outgoing_enabled(enabled).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted media session that records every operation
    pub struct ScriptedSession {
        remote: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl MediaSession for ScriptedSession {
        async fn create_offer(&mut self) -> Result<String, RtcError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}: create_offer", self.remote));
            Ok(format!("offer-sdp-for-{}", self.remote))
        }

        async fn create_answer(&mut self) -> Result<String, RtcError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}: create_answer", self.remote));
            Ok(format!("answer-sdp-for-{}", self.remote))
        }

        async fn set_local_description(&mut self, _sdp: &str) -> Result<(), RtcError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}: set_local", self.remote));
            Ok(())
        }

        async fn set_remote_description(&mut self, _sdp: &str) -> Result<(), RtcError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}: set_remote", self.remote));
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
            self.log
                .lock()
                .unwrap()
                .push(format!("{}: attach_tracks", self.remote));
            Ok(())
        }

        async fn set_outgoing_enabled(&mut self, enabled: bool) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}: outgoing_enabled {}", self.remote, enabled));
        }

        async fn close(&mut self) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}: close", self.remote));
        }
    }

    #[derive(Default)]
    pub struct ScriptedBackend {
        pub log: Arc<Mutex<Vec<String>>>,
        pub opened: Mutex<Vec<String>>,
    }

    impl MediaBackend for ScriptedBackend {
        fn open_session(&self, remote: &str) -> Box<dyn MediaSession> {
            self.opened.lock().unwrap().push(remote.to_string());
            Box::new(ScriptedSession {
                remote: remote.to_string(),
                log: self.log.clone(),
            })
        }
    }

    /// Outbox recording sent payloads and acked ids
    #[derive(Default)]
    pub struct RecordingOutbox {
        pub sent: Mutex<Vec<(String, SignalPayload)>>,
        pub acked: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl SignalOutbox for RecordingOutbox {
        async fn send(&self, to: &str, payload: SignalPayload) -> Result<(), RtcError> {
            self.sent.lock().unwrap().push((to.to_string(), payload));
            Ok(())
        }

        async fn ack(&self, id: Uuid) -> Result<(), RtcError> {
            self.acked.lock().unwrap().push(id);
            Ok(())
        }
    }

    fn envelope(from: &str, to: &str, payload: SignalPayload) -> SignalEnvelope {
        SignalEnvelope {
            id: Uuid::new_v4(),
            from: from.to_string(),
            to: to.to_string(),
            payload,
            timestamp: 0,
        }
    }

    fn candidate(n: u32) -> CandidateInit {
        CandidateInit {
            candidate: format!("cand-{}", n),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        }
    }

    fn manager(identity: &str) -> (PeerManager, Arc<ScriptedBackend>, Arc<RecordingOutbox>) {
        let backend = Arc::new(ScriptedBackend::default());
        let outbox = Arc::new(RecordingOutbox::default());
        let manager = PeerManager::new(identity, backend.clone(), outbox.clone());
        (manager, backend, outbox)
    }

    #[tokio::test]
    async fn initiate_call_sends_one_offer() {
        let (mut manager, _backend, outbox) = manager("alice");
        manager.start_local_audio().await.unwrap();

        manager.initiate_call("bob").await.unwrap();
        assert_eq!(manager.signaling_state("bob"), Some(SignalingState::HaveLocalOffer));
        assert!(manager.has_initiated("bob"));

        // Re-entrant initiate while an offer is in flight must not send
        // a second offer
        manager.initiate_call("bob").await.unwrap();

        let sent = outbox.sent.lock().unwrap();
        let offers = sent
            .iter()
            .filter(|(to, p)| to == "bob" && p.kind() == "offer")
            .count();
        assert_eq!(offers, 1);
    }

    #[tokio::test]
    async fn candidates_queue_until_answer_then_apply_in_order() {
        let (mut manager, backend, outbox) = manager("alice");
        manager.start_local_audio().await.unwrap();
        manager.initiate_call("bob").await.unwrap();

        let c1 = envelope("bob", "alice", SignalPayload::Candidate(candidate(1)));
        let c2 = envelope("bob", "alice", SignalPayload::Candidate(candidate(2)));
        let c1_id = c1.id;
        let c2_id = c2.id;
        manager.handle_signal(c1).await.unwrap();
        manager.handle_signal(c2).await.unwrap();

        // Nothing applied or deleted while the remote description is unset
        {
            let log = backend.log.lock().unwrap();
            assert!(!log.iter().any(|op| op.contains("add_candidate")));
        }
        assert!(outbox.acked.lock().unwrap().is_empty());

        let answer = envelope(
            "bob",
            "alice",
            SignalPayload::Answer { sdp: "answer-sdp".to_string() },
        );
        let answer_id = answer.id;
        manager.handle_signal(answer).await.unwrap();

        let log = backend.log.lock().unwrap();
        let relevant: Vec<&str> = log
            .iter()
            .map(|op| op.as_str())
            .filter(|op| op.contains("set_remote") || op.contains("add_candidate"))
            .collect();
        // Remote description strictly precedes every candidate; arrival
        // order preserved; each candidate applied exactly once
        assert_eq!(
            relevant,
            vec![
                "bob: set_remote",
                "bob: add_candidate cand-1",
                "bob: add_candidate cand-2",
            ]
        );

        let acked = outbox.acked.lock().unwrap();
        assert!(acked.contains(&c1_id));
        assert!(acked.contains(&c2_id));
        assert!(acked.contains(&answer_id));
        assert_eq!(manager.signaling_state("bob"), Some(SignalingState::Stable));
    }

    #[tokio::test]
    async fn offer_creates_connection_and_sends_one_answer() {
        let (mut manager, backend, outbox) = manager("bob");
        manager.start_local_audio().await.unwrap();

        let offer = envelope(
            "alice",
            "bob",
            SignalPayload::Offer { sdp: "offer-sdp".to_string() },
        );
        manager.handle_signal(offer).await.unwrap();

        assert_eq!(backend.opened.lock().unwrap().as_slice(), ["alice"]);
        let sent = outbox.sent.lock().unwrap();
        let answers: Vec<_> = sent
            .iter()
            .filter(|(to, p)| to == "alice" && p.kind() == "answer")
            .collect();
        assert_eq!(answers.len(), 1);
        assert_eq!(manager.signaling_state("alice"), Some(SignalingState::Stable));
    }

    #[tokio::test]
    async fn offer_while_negotiating_is_dropped_but_deleted() {
        let (mut manager, _backend, outbox) = manager("alice");
        manager.start_local_audio().await.unwrap();
        manager.initiate_call("bob").await.unwrap();

        // Glare: bob's offer lands while we are in have-local-offer
        let offer = envelope(
            "bob",
            "alice",
            SignalPayload::Offer { sdp: "offer-sdp".to_string() },
        );
        let offer_id = offer.id;
        manager.handle_signal(offer).await.unwrap();

        // Still our own offer in flight, no answer sent
        assert_eq!(manager.signaling_state("bob"), Some(SignalingState::HaveLocalOffer));
        let sent = outbox.sent.lock().unwrap();
        assert!(!sent.iter().any(|(_, p)| p.kind() == "answer"));
        // The dropped offer is deleted anyway; it is unrecoverable until
        // the sender retries
        assert!(outbox.acked.lock().unwrap().contains(&offer_id));
    }

    #[tokio::test]
    async fn answer_in_wrong_state_is_dropped() {
        let (mut manager, backend, outbox) = manager("alice");
        manager.start_local_audio().await.unwrap();

        let answer = envelope(
            "bob",
            "alice",
            SignalPayload::Answer { sdp: "answer-sdp".to_string() },
        );
        let answer_id = answer.id;
        manager.handle_signal(answer).await.unwrap();

        assert!(backend.log.lock().unwrap().is_empty());
        assert!(outbox.acked.lock().unwrap().contains(&answer_id));
    }

    #[tokio::test]
    async fn candidate_with_description_applies_immediately() {
        let (mut manager, backend, outbox) = manager("bob");
        manager.start_local_audio().await.unwrap();

        let offer = envelope(
            "alice",
            "bob",
            SignalPayload::Offer { sdp: "offer-sdp".to_string() },
        );
        manager.handle_signal(offer).await.unwrap();

        let cand = envelope("alice", "bob", SignalPayload::Candidate(candidate(7)));
        let cand_id = cand.id;
        manager.handle_signal(cand).await.unwrap();

        let log = backend.log.lock().unwrap();
        assert!(log.iter().any(|op| op == "alice: add_candidate cand-7"));
        assert!(outbox.acked.lock().unwrap().contains(&cand_id));
    }

    #[tokio::test]
    async fn link_failure_allows_re_initiate() {
        let (mut manager, _backend, outbox) = manager("alice");
        manager.start_local_audio().await.unwrap();
        manager.initiate_call("bob").await.unwrap();
        assert!(manager.has_initiated("bob"));

        manager.on_link_state_change("bob", LinkState::Failed).await;
        assert!(!manager.has_initiated("bob"));
        assert!(manager.signaling_state("bob").is_none());
        assert!(manager.active_connections().is_empty());

        // A fresh connection and a second offer are allowed now
        manager.initiate_call("bob").await.unwrap();
        let sent = outbox.sent.lock().unwrap();
        let offers = sent.iter().filter(|(_, p)| p.kind() == "offer").count();
        assert_eq!(offers, 2);
    }

    #[tokio::test]
    async fn offer_pulls_passive_participant_into_call() {
        let (mut manager, backend, _outbox) = manager("bob");
        assert!(!manager.local_audio_active());

        let offer = envelope(
            "alice",
            "bob",
            SignalPayload::Offer { sdp: "offer-sdp".to_string() },
        );
        let outcome = manager.handle_signal(offer).await.unwrap();

        assert!(outcome.media_started);
        assert!(manager.local_audio_active());
        let log = backend.log.lock().unwrap();
        assert!(log.iter().any(|op| op == "alice: attach_tracks"));
    }

    #[tokio::test]
    async fn own_messages_are_ignored() {
        let (mut manager, backend, _outbox) = manager("alice");
        let offer = envelope(
            "alice",
            "alice",
            SignalPayload::Offer { sdp: "offer-sdp".to_string() },
        );
        manager.handle_signal(offer).await.unwrap();
        assert!(backend.opened.lock().unwrap().is_empty());
    }
}
