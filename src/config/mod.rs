// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Colloquy
//!
//! Handles loading and saving settings from ~/.colloquy/settings.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Environment variable that overrides the configured summary trigger ratio.
pub const SUMMARY_RATIO_ENV: &str = "COLLOQUY_SUMMARY_RATIO";

/// Main settings structure, stored in ~/.colloquy/settings.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Default selections for new turns
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Token budget defaults
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Conversation and token estimation settings
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Default selections for new turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default backend name resolved through the client manager
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Default model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Token budget configuration for a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Token budget for the whole conversation window
    #[serde(default = "default_budget_max_tokens")]
    pub max_tokens: u32,

    /// Fraction of `max_tokens` at which the engine hands off to
    /// summarization instead of issuing another model call
    #[serde(default = "default_summary_ratio")]
    pub summary_ratio: f32,
}

/// Conversation and token estimation settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Heuristic characters-per-token ratio used when no client estimate
    /// is available
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: u32,
}

fn default_backend() -> String {
    "primary".to_string()
}

fn default_model() -> String {
    "default".to_string()
}

fn default_max_tokens() -> u32 {
    8_192
}

fn default_temperature() -> f32 {
    0.7
}

fn default_budget_max_tokens() -> u32 {
    200_000
}

fn default_summary_ratio() -> f32 {
    0.8
}

fn default_chars_per_token() -> u32 {
    4
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_budget_max_tokens(),
            summary_ratio: default_summary_ratio(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            chars_per_token: default_chars_per_token(),
        }
    }
}

impl Settings {
    /// Get the Colloquy home directory (~/.colloquy)
    pub fn colloquy_home() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".colloquy")
    }

    /// Path to the settings file
    pub fn settings_path() -> PathBuf {
        Self::colloquy_home().join("settings.toml")
    }

    /// Load settings from the default path, falling back to defaults when
    /// the file does not exist. The summary ratio env override is applied
    /// after parsing so the threshold stays tunable without editing files.
    pub fn load() -> Result<Self> {
        let path = Self::settings_path();
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut settings: Self = toml::from_str(&content)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Save settings to the default path, creating the home directory if
    /// needed.
    pub fn save(&self) -> Result<()> {
        let home = Self::colloquy_home();
        if !home.exists() {
            std::fs::create_dir_all(&home)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::settings_path(), content)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(SUMMARY_RATIO_ENV) {
            match value.parse::<f32>() {
                Ok(ratio) if (0.0..=1.0).contains(&ratio) => {
                    self.budget.summary_ratio = ratio;
                }
                _ => {
                    tracing::warn!(
                        target: "colloquy.config",
                        value = %value,
                        "ignoring invalid {} override",
                        SUMMARY_RATIO_ENV
                    );
                }
            }
        }
    }
}
