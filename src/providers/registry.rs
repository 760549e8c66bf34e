//! Name-to-client lookup for registered providers.
//!
//! The registry is populated once at build time and read for every call.
//! Resolution is strictly by name; there is no fallback chain, since which
//! vendor answers a prompt is the caller's choice and silently switching
//! vendors would change both cost and output. Unknown names fail fast with
//! [`BifrostError::UnknownProvider`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::{BifrostError, Result};

use super::traits::ProviderClient;

/// Immutable map of provider name to client, shared by the gateway.
#[derive(Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own [`name`](ProviderClient::name).
    ///
    /// Registering a second client with the same name replaces the first.
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.name().to_owned(), client);
    }

    /// Resolve a provider by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderClient>> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| BifrostError::UnknownProvider(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// Registered provider names, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
