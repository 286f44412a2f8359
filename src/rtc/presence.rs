use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::RtcError;

/// Presence records refresh on this cadence while a participant stays
/// in the room
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Writer half of the presence record owned by this participant
#[async_trait]
pub trait PresenceWriter: Send + Sync {
    /// Upsert the record with the current audio flag and a fresh
    /// last-active timestamp
    async fn upsert(&self, audio_active: bool) -> Result<(), RtcError>;
    /// Delete the record immediately
    async fn delete(&self) -> Result<(), RtcError>;
}

/// Periodic heartbeat keeping this participant's presence record fresh.
///
/// There is no server-side TTL for stale records: a client that dies
/// without running `stop()` leaves its record behind until the transport
/// notices the broken connection. Orderly departure deletes the record
/// immediately so peers learn of it through the subscription, not a
/// timeout.
pub struct PresenceTracker {
    writer: Arc<dyn PresenceWriter>,
    audio_active: Arc<AtomicBool>,
    heartbeat: Option<JoinHandle<()>>,
}

impl PresenceTracker {
    pub fn new(writer: Arc<dyn PresenceWriter>) -> Self {
        Self {
            writer,
            audio_active: Arc::new(AtomicBool::new(false)),
            heartbeat: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.heartbeat.is_some()
    }

    pub fn audio_active(&self) -> bool {
        self.audio_active.load(Ordering::Relaxed)
    }

    /// Write the record now and start the 30-second refresh task
    pub async fn start(&mut self) -> Result<(), RtcError> {
        if self.heartbeat.is_some() {
            return Ok(());
        }

        self.writer.upsert(self.audio_active()).await?;

        let writer = self.writer.clone();
        let audio_active = self.audio_active.clone();
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            // The immediate first tick duplicates the write above
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = writer.upsert(audio_active.load(Ordering::Relaxed)).await {
                    warn!("Presence heartbeat failed: {}", e);
                }
            }
        }));

        info!("Presence heartbeat started");
        Ok(())
    }

    /// Flip the audio flag and push the record right away
    pub async fn set_audio_active(&self, active: bool) -> Result<(), RtcError> {
        self.audio_active.store(active, Ordering::Relaxed);
        self.writer.upsert(active).await
    }

    /// Stop the heartbeat and delete the record immediately.
    /// Deletion is best effort; a failure degrades to a stale record.
    pub async fn stop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        if let Err(e) = self.writer.delete().await {
            warn!("Failed to delete presence record: {}", e);
        }
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWriter {
        upserts: Mutex<Vec<bool>>,
        deletes: Mutex<u32>,
    }

    #[async_trait]
    impl PresenceWriter for RecordingWriter {
        async fn upsert(&self, audio_active: bool) -> Result<(), RtcError> {
            self.upserts.lock().unwrap().push(audio_active);
            Ok(())
        }

        async fn delete(&self) -> Result<(), RtcError> {
            *self.deletes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_writes_immediately_and_stop_deletes() {
        let writer = Arc::new(RecordingWriter::default());
        let mut tracker = PresenceTracker::new(writer.clone());

        tracker.start().await.unwrap();
        assert!(tracker.is_started());
        assert_eq!(writer.upserts.lock().unwrap().as_slice(), [false]);

        // Starting twice must not double the heartbeat
        tracker.start().await.unwrap();
        assert_eq!(writer.upserts.lock().unwrap().len(), 1);

        tracker.set_audio_active(true).await.unwrap();
        assert_eq!(writer.upserts.lock().unwrap().as_slice(), [false, true]);
        assert!(tracker.audio_active());

        tracker.stop().await;
        assert!(!tracker.is_started());
        assert_eq!(*writer.deletes.lock().unwrap(), 1);
    }
}
