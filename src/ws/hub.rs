use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config;
use crate::db::{self, RoomRow, RoomVersionRow};
use crate::models::{CursorEntry, PresenceEntry, RoomSnapshot, ServerEvent};
use crate::rtc::signal::SignalEnvelope;

/// Build the broadcastable snapshot of a room document
pub fn snapshot_of(row: &RoomRow) -> RoomSnapshot {
    RoomSnapshot {
        room_id: row.room_id.clone(),
        room_name: row.room_name.clone(),
        language: row.language.clone(),
        content: row.content.clone(),
        is_private: row.is_private,
        is_active: row.is_active,
        created_by: row.created_by.clone(),
        muted_users: row.muted_users.clone(),
    }
}

/// Counters exposed through the diagnostics endpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct HubStats {
    pub rooms: u32,
    pub connections: u32,
    pub pending_signals: u32,
}

/// Result of unregistering a connection
pub struct ConnCleanup {
    /// Identity whose last connection just closed, if any
    pub identity_left: Option<String>,
    /// Whether the channel has no connections left
    pub channel_empty: bool,
}

struct ChannelState {
    connections: HashMap<Uuid, String>,
    presence: HashMap<String, PresenceEntry>,
    cursors: HashMap<String, CursorEntry>,
    /// Per-identity mailboxes of unacked signaling messages.
    /// Entries are deleted on ack and re-delivered on reconnect.
    mailboxes: HashMap<String, Vec<SignalEnvelope>>,
    dirty: bool,
    last_editor: Option<String>,
    saver: Option<JoinHandle<()>>,
}

/// The live channel of one room: a broadcast fan-out plus the room's
/// ephemeral records (presence, cursors, signaling mailboxes). Durable
/// state stays in the database; everything here dies with the channel.
pub struct RoomChannel {
    pub room_id: String,
    tx: broadcast::Sender<ServerEvent>,
    state: Mutex<ChannelState>,
}

impl RoomChannel {
    fn new(room_id: String) -> Self {
        let (tx, _rx) = broadcast::channel::<ServerEvent>(256);
        Self {
            room_id,
            tx,
            state: Mutex::new(ChannelState {
                connections: HashMap::new(),
                presence: HashMap::new(),
                cursors: HashMap::new(),
                mailboxes: HashMap::new(),
                dirty: false,
                last_editor: None,
                saver: None,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event to every subscriber, including the sender.
    /// The own-write echo is deliberate: receivers apply snapshots
    /// idempotently instead of the server deduplicating.
    pub fn send(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    pub async fn register_conn(&self, conn_id: Uuid, identity: &str) {
        let mut state = self.state.lock().await;
        state.connections.insert(conn_id, identity.to_string());
    }

    pub async fn unregister_conn(&self, conn_id: Uuid) -> ConnCleanup {
        let mut state = self.state.lock().await;
        let identity = state.connections.remove(&conn_id);

        let identity_left = match identity {
            Some(identity) => {
                let still_connected = state.connections.values().any(|i| *i == identity);
                if still_connected {
                    None
                } else {
                    Some(identity)
                }
            }
            None => None,
        };

        ConnCleanup {
            identity_left,
            channel_empty: state.connections.is_empty(),
        }
    }

    /// Upsert a presence record and broadcast the full roster
    pub async fn upsert_presence(&self, entry: PresenceEntry) {
        let users = {
            let mut state = self.state.lock().await;
            state.presence.insert(entry.user_id.clone(), entry);
            state.presence.values().cloned().collect::<Vec<_>>()
        };
        self.send(ServerEvent::Presence { users });
    }

    /// Delete a presence record immediately and broadcast the roster.
    /// Peers notice removal through the subscription, not a timeout.
    pub async fn remove_presence(&self, user_id: &str) {
        let users = {
            let mut state = self.state.lock().await;
            state.presence.remove(user_id);
            state.presence.values().cloned().collect::<Vec<_>>()
        };
        self.send(ServerEvent::Presence { users });
    }

    pub async fn roster(&self) -> Vec<PresenceEntry> {
        let state = self.state.lock().await;
        state.presence.values().cloned().collect()
    }

    /// Identities currently present in the room
    pub async fn presence_user_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.presence.keys().cloned().collect()
    }

    /// Overwrite a participant's cursor record and broadcast it
    pub async fn upsert_cursor(&self, entry: CursorEntry) {
        {
            let mut state = self.state.lock().await;
            state.cursors.insert(entry.user_id.clone(), entry.clone());
        }
        self.send(ServerEvent::Cursor(entry));
    }

    pub async fn remove_cursor(&self, user_id: &str) {
        let mut state = self.state.lock().await;
        state.cursors.remove(user_id);
    }

    pub async fn cursors(&self) -> Vec<CursorEntry> {
        let state = self.state.lock().await;
        state.cursors.values().cloned().collect()
    }

    /// Append a signaling message to the addressee's mailbox and push it
    /// to live subscribers. The entry stays until the addressee acks it.
    pub async fn push_signal(&self, envelope: SignalEnvelope) {
        {
            let mut state = self.state.lock().await;
            state
                .mailboxes
                .entry(envelope.to.clone())
                .or_default()
                .push(envelope.clone());
        }
        self.send(ServerEvent::Signal(envelope));
    }

    /// Delete a consumed signaling message from the caller's mailbox
    pub async fn ack_signal(&self, identity: &str, id: Uuid) {
        let mut state = self.state.lock().await;
        if let Some(mailbox) = state.mailboxes.get_mut(identity) {
            mailbox.retain(|envelope| envelope.id != id);
            if mailbox.is_empty() {
                state.mailboxes.remove(identity);
            }
        }
    }

    /// Unacked signaling messages addressed to an identity, in receipt order
    pub async fn pending_signals(&self, identity: &str) -> Vec<SignalEnvelope> {
        let state = self.state.lock().await;
        state.mailboxes.get(identity).cloned().unwrap_or_default()
    }

    /// Record that the room content changed since the last version snapshot
    pub async fn mark_dirty(&self, editor: &str) {
        let mut state = self.state.lock().await;
        state.dirty = true;
        state.last_editor = Some(editor.to_string());
    }

    async fn take_dirty(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        if state.dirty {
            state.dirty = false;
            state.last_editor.take().or_else(|| Some("unknown".to_string()))
        } else {
            None
        }
    }

    async fn stats(&self) -> (u32, u32) {
        let state = self.state.lock().await;
        let pending: usize = state.mailboxes.values().map(|m| m.len()).sum();
        (state.connections.len() as u32, pending as u32)
    }
}

/// Registry of live room channels
pub struct RoomHub {
    channels: RwLock<HashMap<String, Arc<RoomChannel>>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Get the live channel of a room, if one is open
    pub async fn channel(&self, room_id: &str) -> Option<Arc<RoomChannel>> {
        let channels = self.channels.read().await;
        channels.get(room_id).cloned()
    }

    /// Get or create the live channel of a room. Creating a channel also
    /// starts its periodic version-snapshot task.
    pub async fn join(&self, room_id: &str) -> Arc<RoomChannel> {
        let mut channels = self.channels.write().await;
        if let Some(channel) = channels.get(room_id) {
            return channel.clone();
        }

        let channel = Arc::new(RoomChannel::new(room_id.to_string()));
        channels.insert(room_id.to_string(), channel.clone());

        let saver = tokio::spawn(run_version_saver(channel.clone()));
        channel.state.lock().await.saver = Some(saver);

        info!("Live channel opened for room {}", room_id);
        channel
    }

    /// Tear down an idle channel: save a final version snapshot when the
    /// content is dirty, stop the saver task, drop the channel.
    pub async fn close_channel(&self, room_id: &str) {
        let channel = {
            let mut channels = self.channels.write().await;
            channels.remove(room_id)
        };

        let Some(channel) = channel else {
            return;
        };

        if let Some(editor) = channel.take_dirty().await {
            save_version(&channel.room_id, &editor).await;
        }

        let saver = channel.state.lock().await.saver.take();
        if let Some(saver) = saver {
            saver.abort();
        }

        info!("Live channel closed for room {}", room_id);
    }

    /// Re-read the room document and broadcast it to subscribers.
    /// Used by REST handlers after moderation, settings and restore writes.
    pub async fn broadcast_room(&self, room_id: &str) {
        let Some(channel) = self.channel(room_id).await else {
            return;
        };

        let db = match db::get_db() {
            Some(db) => db,
            None => {
                error!("Database not initialized, cannot broadcast room {}", room_id);
                return;
            }
        };

        match db.get_room(room_id).await {
            Ok(Some(row)) => channel.send(ServerEvent::Room(snapshot_of(&row))),
            Ok(None) => warn!("Room {} vanished while broadcasting", room_id),
            Err(e) => error!("Failed to load room {} for broadcast: {}", room_id, e),
        }
    }

    /// Aggregate counters across all live channels
    pub async fn stats(&self) -> HubStats {
        let channels = {
            let guard = self.channels.read().await;
            guard.values().cloned().collect::<Vec<_>>()
        };

        let mut stats = HubStats {
            rooms: channels.len() as u32,
            ..Default::default()
        };
        for channel in channels {
            let (connections, pending) = channel.stats().await;
            stats.connections += connections;
            stats.pending_signals += pending;
        }
        stats
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically snapshot dirty room content into the version history.
/// The channel owns the timer, so snapshots keep happening while any
/// member is connected, owner present or not.
async fn run_version_saver(channel: Arc<RoomChannel>) {
    let interval = config::get_config().version_save_interval_secs;
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so an empty room does not
    // snapshot its seed content.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Some(editor) = channel.take_dirty().await {
            save_version(&channel.room_id, &editor).await;
        }
    }
}

async fn save_version(room_id: &str, editor: &str) {
    let Some(db) = db::get_db() else {
        error!("Database not initialized, cannot save version for room {}", room_id);
        return;
    };

    let row = match db.get_room(room_id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            warn!("Room {} not found while saving version", room_id);
            return;
        }
        Err(e) => {
            error!("Failed to load room {} for version save: {}", room_id, e);
            return;
        }
    };

    let version = RoomVersionRow {
        id: Uuid::new_v4(),
        room_id: room_id.to_string(),
        content: row.content,
        saved_by: editor.to_string(),
        created_date: chrono::Utc::now(),
    };

    if let Err(e) = db.insert_room_version(&version).await {
        error!("Failed to save version for room {}: {}", room_id, e);
    }
}
