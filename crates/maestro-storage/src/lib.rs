// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for Maestro.
//!
//! Provides a WAL-mode database with embedded migrations and the
//! [`SqlitePluginLog`] audit sink. All access goes through the single
//! `tokio-rusqlite` background thread.

pub mod database;
mod migrations;
pub mod plugin_log;

pub use database::Database;
pub use plugin_log::SqlitePluginLog;
