// Folding row changes on the streams table into the local stream list.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use pitchside_core::mapper::map_stream;
use pitchside_core::model::Stream;

use crate::backend::{RowChange, Subscription};

/// A change to apply to the local stream list.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Inserted(Stream),
    Updated(Stream),
    Deleted { id: String },
}

impl From<RowChange> for StreamEvent {
    fn from(change: RowChange) -> Self {
        match change {
            RowChange::Insert(row) => StreamEvent::Inserted(map_stream(row)),
            RowChange::Update(row) => StreamEvent::Updated(map_stream(row)),
            RowChange::Delete { id } => StreamEvent::Deleted { id },
        }
    }
}

/// Apply one event to `streams`.
///
/// Inserts go to the front, unless the id is already listed, in which case
/// the entry is replaced where it stands. Updates replace the entry with the
/// same id and are dropped when there is none. Deletes remove the entry with the id, if
/// any. Other entries keep their relative order.
pub fn apply_event(streams: &mut Vec<Stream>, event: StreamEvent) {
    match event {
        StreamEvent::Inserted(stream) => match streams.iter_mut().find(|s| s.id == stream.id) {
            Some(existing) => {
                debug!("Insert for listed stream {}, replacing it", stream.id);
                *existing = stream;
            }
            None => streams.insert(0, stream),
        },
        StreamEvent::Updated(stream) => {
            match streams.iter_mut().find(|s| s.id == stream.id) {
                Some(existing) => *existing = stream,
                None => debug!("Ignoring update for unknown stream {}", stream.id),
            }
        }
        StreamEvent::Deleted { id } => {
            if let Some(pos) = streams.iter().position(|s| s.id == id) {
                streams.remove(pos);
            }
        }
    }
}

/// One live subscription and the task applying its events in receipt order.
pub struct RealtimeSync {
    task: JoinHandle<()>,
}

impl RealtimeSync {
    /// Start applying changes from `subscription` through `apply`.
    ///
    /// The task ends when the feed closes or `stop` is called; either way the
    /// subscription is dropped, which closes the transport.
    pub fn spawn<F>(mut subscription: Subscription, mut apply: F) -> Self
    where
        F: FnMut(StreamEvent) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            while let Some(change) = subscription.recv().await {
                apply(StreamEvent::from(change));
            }
            info!("Realtime feed closed");
        });
        RealtimeSync { task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}
