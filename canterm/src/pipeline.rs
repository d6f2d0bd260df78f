//! UDS message pipeline: one adapter, many callers.

use canterm_interface::{Header, Message, Result};
use tokio::sync::Mutex;

use crate::adapter::Adapter;

/// Serializes access to one [`Adapter`].
///
/// At most one `send` is in flight at any time across all callers; everyone
/// else queues on the internal lock. Adapter errors propagate unchanged.
pub struct UdsPipeline {
    adapter: Mutex<Adapter>,
}

impl UdsPipeline {
    /// Take ownership of a connected adapter.
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter: Mutex::new(adapter),
        }
    }

    /// Send one UDS service request and await the assembled reply.
    pub async fn send(&self, to: Header, reply: Header, service: &[u8]) -> Result<Message> {
        let mut adapter = self.adapter.lock().await;
        adapter
            .send_uds(&Message::new(to, reply, service.to_vec()))
            .await
    }

    /// The adapter's current transport MTU, for callers that chunk at the
    /// UDS layer (e.g. `TransferData` block sizing).
    pub async fn mtu(&self) -> usize {
        self.adapter.lock().await.mtu()
    }

    /// Run a closure against the underlying adapter while holding the
    /// pipeline lock.
    pub async fn with_adapter<T>(&self, f: impl FnOnce(&mut Adapter) -> T) -> T {
        let mut adapter = self.adapter.lock().await;
        f(&mut adapter)
    }

    /// Tear down the adapter and its queue.
    pub async fn shutdown(&self) {
        let mut adapter = self.adapter.lock().await;
        adapter.shutdown().await;
    }
}
