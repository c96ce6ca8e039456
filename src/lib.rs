//! Queuectl core — a durable background job queue
//!
//! Jobs are shell commands persisted in an embedded SQLite store, claimed
//! atomically by a pool of independent worker processes, retried with
//! exponential backoff, and parked in a dead letter queue once their retry
//! budget runs out. All state survives process restarts.

#![allow(missing_docs)]

pub mod boot;
pub mod cli;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod settings;
pub mod setup_tracing;
pub mod store;
