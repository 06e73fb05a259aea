//! # driverhub-app
//!
//! Device executor core, **port definitions** (traits) plus the
//! in-process infrastructure that drives them.
//!
//! ## Responsibilities
//! - Define **port traits** the outside world implements:
//!   - `DriverHandler`: how a device driver reacts to events
//!   - `DriverContext`: per-device state and platform access
//!   - `Scheduler`: delayed execution on a shared pool
//!   - `PlatformBus`: outbound platform messages
//! - Provide the **per-device executor**: single-owner draining on borrowed
//!   threads, ordered queue with head-of-line blocking, deferred and named
//!   events with blocking-safe futures
//! - Provide the **executor registry** (address → executor, lifecycle hooks)
//! - Provide **in-process infrastructure** that doesn't need IO: platform
//!   bus, tokio scheduler, in-memory device context
//!
//! ## Dependency rule
//! Depends on `driverhub-domain` only (plus `tokio` for the runtime handle
//! and channels). Never imports adapter crates. Adapters depend on *this*
//! crate, not the reverse.

pub mod config;
pub mod context;
pub mod executor;
pub mod platform_bus;
pub mod ports;
pub mod registry;
pub mod scheduler;
