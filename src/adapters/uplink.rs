//! Network handle: a remote store reached over a link.
//!
//! Pairs a [`RemoteStore`] with the [`ConnectivityPort`] it depends on so
//! the supervisor gets one `net` argument.  Calls made while the link is
//! down fail fast with [`RemoteError::Offline`] instead of waiting for a
//! transport timeout.

use serde_json::Value;

use crate::app::ports::{ConnectivityPort, RemoteStore};
use crate::error::RemoteError;

pub struct Uplink<S, L> {
    store: S,
    link: L,
}

impl<S: RemoteStore, L: ConnectivityPort> Uplink<S, L> {
    pub fn new(store: S, link: L) -> Self {
        Self { store, link }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn online(&self) -> Result<(), RemoteError> {
        if self.link.is_up() { Ok(()) } else { Err(RemoteError::Offline) }
    }
}

impl<S: RemoteStore, L: ConnectivityPort> RemoteStore for Uplink<S, L> {
    fn put(&mut self, path: &str, body: &Value, timeout_ms: u64) -> Result<(), RemoteError> {
        self.online()?;
        self.store.put(path, body, timeout_ms)
    }

    fn get(&mut self, path: &str, timeout_ms: u64) -> Result<Value, RemoteError> {
        self.online()?;
        self.store.get(path, timeout_ms)
    }

    fn remove(&mut self, path: &str, timeout_ms: u64) -> Result<(), RemoteError> {
        self.online()?;
        self.store.remove(path, timeout_ms)
    }
}

impl<S: RemoteStore, L: ConnectivityPort> ConnectivityPort for Uplink<S, L> {
    fn is_up(&self) -> bool {
        self.link.is_up()
    }

    fn reconnect(&mut self, timeout_ms: u64) -> bool {
        self.link.reconnect(timeout_ms)
    }
}
