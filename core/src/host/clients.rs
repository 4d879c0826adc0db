// Connected bridge clients and the channels between them and the host

use crate::bridge::{HostLink, LinkError};
use crate::protocol::HostEvent;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

pub type ClientId = u64;

/// Inputs to the host actor
#[derive(Debug)]
pub(crate) enum HostInput {
    /// Raw wire command from a client
    Command(Value),
    Shutdown(oneshot::Sender<()>),
}

/// Every foreground context currently attached to the host
#[derive(Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: Mutex<Vec<(ClientId, mpsc::UnboundedSender<HostEvent>)>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (ClientId, mpsc::UnboundedReceiver<HostEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.lock().push((id, tx));
        tracing::debug!("Client {} connected", id);
        (id, rx)
    }

    /// Send `event` to every live client, pruning the ones that went away.
    /// Returns how many clients received it.
    pub fn broadcast(&self, event: &HostEvent) -> usize {
        let mut clients = self.clients.lock();
        clients.retain(|(id, tx)| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                tracing::debug!("Client {} gone, pruning", id);
            }
            alive
        });
        clients.len()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}

/// Client → host command channel
#[derive(Clone)]
pub struct ClientLink {
    pub(crate) tx: mpsc::UnboundedSender<HostInput>,
}

impl HostLink for ClientLink {
    fn post(&self, command: Value) -> Result<(), LinkError> {
        self.tx
            .send(HostInput::Command(command))
            .map_err(|_| LinkError::Closed)
    }
}

/// A client's two ends: commands go out on `link`, broadcasts arrive on `events`
pub struct ClientPort {
    pub id: ClientId,
    pub link: ClientLink,
    pub events: mpsc::UnboundedReceiver<HostEvent>,
}
