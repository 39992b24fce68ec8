//! Transport abstraction for the sync protocol.
//!
//! A transport is a point-to-point channel primitive: it can publish an
//! identity, dial another identity, and move text frames. Implementations may
//! use WebRTC data channels, a LAN socket, or anything else.
//!
//! Lifecycle events are pushed into the [`EventSender`] the transport was
//! opened with. The session controller opens one transport per session through
//! a [`Connector`] and drops it on teardown, so events from a superseded
//! transport can never reach a newer session.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::messages::{ConnectionId, PeerId, SyncMessage};

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The local identity is registered and reachable.
    Opened(PeerId),
    /// A remote peer dialed our identity.
    IncomingConnection(ConnectionId),
    /// A text frame arrived. Untrusted until decoded.
    Data { conn: ConnectionId, data: String },
    /// A channel closed.
    Closed { conn: ConnectionId },
    /// The transport failed.
    Error(String),
}

/// Sending half of a transport's event stream.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of a transport's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Point-to-point transport used by one sync session.
#[async_trait]
pub trait Transport: Send {
    /// Register a fresh identity that peers can dial.
    ///
    /// Emits [`TransportEvent::Opened`] once the identity is usable.
    async fn create_identity(&mut self) -> Result<PeerId>;

    /// Dial a remote identity.
    ///
    /// May wait indefinitely; the caller bounds it with a timeout.
    async fn connect(&mut self, peer: &PeerId) -> Result<ConnectionId>;

    /// Send a message. Silently dropped if the channel is not open.
    fn send(&mut self, conn: ConnectionId, message: &SyncMessage);

    /// Close one channel. The remote side sees [`TransportEvent::Closed`].
    fn close(&mut self, conn: ConnectionId);

    /// Close every channel and release the identity.
    fn destroy(&mut self);
}

/// Opens transports.
pub trait Connector: Send {
    type Transport: Transport;

    /// Open a transport that reports its events to `events`.
    fn open(&mut self, events: EventSender) -> Self::Transport;
}

/// In-memory transport for tests.
///
/// Uses channels to simulate a signalling service and data channels between
/// transports that share one [`memory::MemoryNetwork`].
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, MutexGuard};

    use crate::codec;
    use crate::error::SyncError;

    /// One data channel between two transports.
    struct Link {
        dialer: EventSender,
        listener: EventSender,
        open: bool,
    }

    #[derive(Default)]
    struct NetworkInner {
        /// Registered identities and where to deliver their events.
        peers: HashMap<PeerId, EventSender>,
        links: HashMap<ConnectionId, Link>,
        next_conn: u64,
    }

    /// Shared state for the memory transport network.
    #[derive(Default)]
    pub struct MemoryNetwork {
        inner: Mutex<NetworkInner>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a connector that opens transports on this network.
        pub fn connector(self: &Arc<Self>) -> MemoryConnector {
            MemoryConnector {
                network: Arc::clone(self),
            }
        }

        /// Number of channels currently open.
        pub fn open_links(&self) -> usize {
            self.lock().links.values().filter(|link| link.open).count()
        }

        /// True if `peer` is registered.
        pub fn is_registered(&self, peer: &PeerId) -> bool {
            self.lock().peers.contains_key(peer)
        }

        fn lock(&self) -> MutexGuard<'_, NetworkInner> {
            // A poisoned lock only means a test panicked mid-update.
            self.inner.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    /// Opens [`MemoryTransport`]s on a shared network.
    #[derive(Clone)]
    pub struct MemoryConnector {
        network: Arc<MemoryNetwork>,
    }

    impl MemoryConnector {
        pub fn network(&self) -> &Arc<MemoryNetwork> {
            &self.network
        }
    }

    impl Connector for MemoryConnector {
        type Transport = MemoryTransport;

        fn open(&mut self, events: EventSender) -> MemoryTransport {
            MemoryTransport {
                network: Arc::clone(&self.network),
                events,
                identity: None,
                connections: Vec::new(),
            }
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        network: Arc<MemoryNetwork>,
        events: EventSender,
        identity: Option<PeerId>,
        connections: Vec<ConnectionId>,
    }

    impl MemoryTransport {
        /// Deliver a raw text frame, bypassing the encoder.
        ///
        /// Lets tests play a peer that sends malformed or hostile data.
        pub fn send_raw(&mut self, conn: ConnectionId, data: String) {
            let inner = self.network.lock();
            let Some(link) = inner.links.get(&conn).filter(|link| link.open) else {
                tracing::debug!(%conn, "dropping frame on closed channel");
                return;
            };
            let target = if link.dialer.same_channel(&self.events) {
                &link.listener
            } else {
                &link.dialer
            };
            let _ = target.send(TransportEvent::Data { conn, data });
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn create_identity(&mut self) -> Result<PeerId> {
            let id = PeerId::random();
            self.network
                .lock()
                .peers
                .insert(id.clone(), self.events.clone());
            self.identity = Some(id.clone());
            let _ = self.events.send(TransportEvent::Opened(id.clone()));
            Ok(id)
        }

        async fn connect(&mut self, peer: &PeerId) -> Result<ConnectionId> {
            let conn = {
                let mut inner = self.network.lock();
                match inner.peers.get(peer).cloned() {
                    Some(listener) => {
                        inner.next_conn += 1;
                        let conn = ConnectionId(inner.next_conn);
                        inner.links.insert(
                            conn,
                            Link {
                                dialer: self.events.clone(),
                                listener: listener.clone(),
                                open: true,
                            },
                        );
                        listener
                            .send(TransportEvent::IncomingConnection(conn))
                            .map_err(|_| SyncError::TransportError("peer unavailable".into()))?;
                        Some(conn)
                    }
                    None => None,
                }
            };

            match conn {
                Some(conn) => {
                    self.connections.push(conn);
                    Ok(conn)
                }
                // Like a signalling server holding the dial open, an unknown
                // identity never answers.
                None => std::future::pending().await,
            }
        }

        fn send(&mut self, conn: ConnectionId, message: &SyncMessage) {
            match codec::encode(message) {
                Ok(data) => self.send_raw(conn, data),
                Err(e) => tracing::warn!(%conn, "failed to encode {}: {}", message.kind(), e),
            }
        }

        fn close(&mut self, conn: ConnectionId) {
            let mut inner = self.network.lock();
            if let Some(link) = inner.links.get_mut(&conn) {
                if link.open {
                    link.open = false;
                    let _ = link.dialer.send(TransportEvent::Closed { conn });
                    let _ = link.listener.send(TransportEvent::Closed { conn });
                }
            }
            inner.links.remove(&conn);
            self.connections.retain(|c| *c != conn);
        }

        fn destroy(&mut self) {
            let mut inner = self.network.lock();
            let events = &self.events;
            let owned: Vec<ConnectionId> = inner
                .links
                .iter()
                .filter(|(_, link)| {
                    link.dialer.same_channel(events) || link.listener.same_channel(events)
                })
                .map(|(conn, _)| *conn)
                .collect();
            for conn in owned {
                if let Some(link) = inner.links.remove(&conn) {
                    if link.open {
                        let _ = link.dialer.send(TransportEvent::Closed { conn });
                        let _ = link.listener.send(TransportEvent::Closed { conn });
                    }
                }
            }
            if let Some(id) = self.identity.take() {
                inner.peers.remove(&id);
            }
            self.connections.clear();
        }
    }

    impl Drop for MemoryTransport {
        fn drop(&mut self) {
            self.destroy();
        }
    }
}
