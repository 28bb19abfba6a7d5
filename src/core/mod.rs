//! Core primitives for Spacekeep's local-first persistence engine.
//!
//! Storage, configuration, the graph model and the hierarchy algorithms live here.
//! Plugins build the registry, the per-space store and sharing on top of them.

pub mod broker;
pub mod config;
pub mod db;
pub mod debounce;
pub mod error;
pub mod events;
pub mod hierarchy;
pub mod migration;
pub mod model;
pub mod remote;
pub mod schemas;
pub mod store;
pub mod time;
