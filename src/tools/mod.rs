// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for Colloquy
//!
//! Defines the parsed tool invocation shape, tool results, and the external
//! tool-execution capability the coordinator drives. The engine never runs
//! tools itself; it hands invocations to a [`ToolCapability`] and feeds the
//! results back into the model.

pub mod coordinator;

pub use coordinator::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A tool request parsed from model output.
///
/// Parameters keep their order of appearance in the markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Tool name
    pub name: String,
    /// Ordered parameter list
    pub params: Vec<(String, String)>,
}

impl ToolInvocation {
    /// Create a new invocation
    pub fn new(name: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Look up a parameter by name
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Result of executing one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The tool that produced this result
    pub tool_name: String,
    /// Whether the tool succeeded
    pub success: bool,
    /// Output text, or the error text on failure
    pub payload: String,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(tool_name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            payload: payload.into(),
        }
    }

    /// Create an error result
    pub fn error(tool_name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            payload: payload.into(),
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        !self.success
    }
}

/// Descriptor of an available tool, rendered into the system prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// What the tool does
    pub description: String,
    /// Parameter names with one-line descriptions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<(String, String)>,
}

/// External tool-execution capability.
///
/// Each call is synchronous from the coordinator's point of view and runs
/// inside a cancellable task.
#[async_trait]
pub trait ToolCapability: Send + Sync {
    /// Tools this capability can execute
    fn descriptors(&self) -> Vec<ToolDescriptor>;

    /// Execute one invocation
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult>;
}
