// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Utility modules
//!
//! Terminal helpers shared by the curaflow CLI.

pub mod colors;
pub mod spinner;

pub use colors::*;
pub use spinner::*;
