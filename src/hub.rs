//! Connected client registry and fan-out
//!
//! Connections are tagged with a role once the client identifies. Every
//! send is best-effort: a frame queued to a closed transport is dropped
//! silently, and the connection task removes itself on close.

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::messages::{ClientRole, ServerMessage};

/// One connected client
#[derive(Debug, Clone)]
pub struct ClientEntry {
    /// Unset until the client sends `identify`
    pub role: Option<ClientRole>,
    pub name: Option<String>,
    tx: UnboundedSender<String>,
}

/// Registry of all live connections, keyed by connection id
pub struct ClientHub {
    clients: DashMap<Uuid, ClientEntry>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register a connection; the returned id doubles as the subtitler id
    pub fn add(&self, tx: UnboundedSender<String>) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.clients.insert(
            conn_id,
            ClientEntry {
                role: None,
                name: None,
                tx,
            },
        );
        conn_id
    }

    /// Drop a connection from the registry
    pub fn remove(&self, conn_id: Uuid) {
        self.clients.remove(&conn_id);
    }

    /// Record the role (and display name) from an `identify` frame
    pub fn identify(&self, conn_id: Uuid, role: ClientRole, name: Option<String>) {
        if let Some(mut entry) = self.clients.get_mut(&conn_id) {
            entry.role = Some(role);
            if name.is_some() {
                entry.name = name;
            }
        }
    }

    pub fn role_of(&self, conn_id: Uuid) -> Option<ClientRole> {
        self.clients.get(&conn_id).and_then(|e| e.role)
    }

    pub fn name_of(&self, conn_id: Uuid) -> Option<String> {
        self.clients.get(&conn_id).and_then(|e| e.name.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Send one frame to one connection, dropping it if the transport is
    /// gone
    pub fn send_to(&self, conn_id: Uuid, msg: &ServerMessage) {
        if let Some(entry) = self.clients.get(&conn_id) {
            let _ = entry.tx.send(msg.to_json());
        }
    }

    /// Fan a frame out to every connection matching `filter`
    pub fn broadcast<F>(&self, msg: &ServerMessage, filter: F)
    where
        F: Fn(&ClientEntry) -> bool,
    {
        let frame = msg.to_json();
        for entry in self.clients.iter() {
            if filter(entry.value()) {
                let _ = entry.value().tx.send(frame.clone());
            }
        }
    }

    /// Fan out to every connection regardless of role
    pub fn broadcast_all(&self, msg: &ServerMessage) {
        self.broadcast(msg, |_| true);
    }

    pub fn to_admins(&self, msg: &ServerMessage) {
        self.broadcast(msg, |c| c.role == Some(ClientRole::Admin));
    }

    pub fn to_spectators(&self, msg: &ServerMessage) {
        self.broadcast(msg, |c| c.role == Some(ClientRole::Spectator));
    }

    /// Echo to the other subtitlers, not the sender
    pub fn to_subtitlers_except(&self, sender: Uuid, msg: &ServerMessage) {
        let frame = msg.to_json();
        for entry in self.clients.iter() {
            if *entry.key() != sender && entry.value().role == Some(ClientRole::Subtitler) {
                let _ = entry.value().tx.send(frame.clone());
            }
        }
    }
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}
