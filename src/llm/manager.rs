// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Client manager for model backends
//!
//! Backends are registered as builders and constructed lazily on first use.
//! The cache is guarded by an async mutex held across construction, so
//! concurrent first use from multiple conversations cannot double-initialize
//! a backend.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ColloquyError, Result};
use crate::llm::client::ModelClient;

/// Builder for a lazily-constructed backend
pub type ClientBuilderFn = Box<dyn Fn() -> Result<Arc<dyn ModelClient>> + Send + Sync>;

/// Registry of model backends keyed by name
pub struct ClientManager {
    builders: HashMap<String, ClientBuilderFn>,
    clients: Mutex<HashMap<String, Arc<dyn ModelClient>>>,
}

impl ClientManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Register a backend builder under a name
    pub fn register(&mut self, name: impl Into<String>, builder: ClientBuilderFn) {
        self.builders.insert(name.into(), builder);
    }

    /// Registered backend names
    pub fn backend_names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    /// Get a backend, constructing it on first use.
    ///
    /// The cache lock is held across construction so two conversations
    /// racing on first use share one instance.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn ModelClient>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(name) {
            return Ok(client.clone());
        }

        let builder = self.builders.get(name).ok_or_else(|| {
            ColloquyError::Config(format!("unknown backend: {}", name))
        })?;

        tracing::debug!(
            target: "colloquy.llm.manager",
            backend = %name,
            "initializing backend on first use"
        );
        let client = builder()?;
        clients.insert(name.to_string(), client.clone());
        Ok(client)
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
