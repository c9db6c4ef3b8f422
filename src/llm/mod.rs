// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model client abstraction for Colloquy
//!
//! Provides the black-box streaming backend interface the engine drives.

pub mod client;
pub mod manager;
pub mod message;
pub mod mock_client;

pub use client::*;
pub use manager::*;
pub use message::*;
