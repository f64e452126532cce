//! # Fleet Controller
//!
//! Control plane that drives image registries, model registries and cluster nodes
//! toward their desired state.
//!
//! ## Overview
//!
//! 1. **Reconciliation engine** - A deduplicating, rate-limited work queue drained by a
//!    worker pool, refilled by a periodic full resync
//! 2. **Resource controllers** - Phase machines for `ImageRegistry` and `ModelRegistry`
//!    records, persisting a status document after each step
//! 3. **Remote command runner** - SSH execution on cluster nodes with control-master
//!    reuse, environment export and optional post-run shutdown
//!
//! ## Features
//!
//! - **Storage-agnostic**: Controllers consume a narrow `Storage` trait; a PostgREST
//!   client is provided
//! - **Level-triggered**: Every resource is re-listed each sync interval, so missed
//!   work is picked up on the next pass
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

pub mod command_runner;
pub mod config;
pub mod constants;
pub mod controller;
pub mod model;
pub mod observability;
pub mod provider;
pub mod runtime;
pub mod storage;
