//! # takt-core
//!
//! State engine for the takt scheduling server. Owns the in-memory system
//! state, the only path that mutates it (transmission dispatch), the
//! versioned on-disk format, and licensing.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use takt_core::config::Config;
//! use takt_core::context::ProcessContext;
//! use takt_core::dispatch::{DispatchWorker, EventBus, TransmissionDispatcher};
//! use takt_core::persistence::load_state;
//!
//! // 1. Build the process context from config
//! let config = Config::load();
//! let ctx = Arc::new(ProcessContext::new(config.is_server(), config.retry_policy()));
//!
//! // 2. Restore the state (or start blank)
//! let state = Arc::new(load_state(&config.state_path())?);
//!
//! // 3. Dispatch transmissions inline or through a worker thread
//! let dispatcher = Arc::new(TransmissionDispatcher::new(state, ctx, Arc::new(EventBus::new())));
//! let handle = DispatchWorker::spawn(Arc::clone(&dispatcher));
//! handle.submit(transmission)?;
//! ```
//!
//! ## Module Overview
//!
//! - [`sync`]: `Guarded<T>` with timed shared/exclusive acquisition and
//!   retry-with-backoff
//! - [`state`]: `SystemState`: settings, scenario collection, users, and the
//!   lock-ordered accessors over them
//! - [`dispatch`]: `TransmissionDispatcher`, the event bus, wire framing and
//!   the dispatch worker
//! - [`persistence`]: versioned binary codec, atomic save and load
//! - [`license`]: key verification, license limits, data-model fingerprint
//! - [`recording`]: JSON-lines transmission recording and replay
//! - [`config`]: TOML configuration (embedded + user override)
//! - [`context`]: `ProcessContext`: role, read-only flag, shutdown

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod license;
pub mod persistence;
pub mod recording;
pub mod state;
pub mod sync;
