//! # driverhub-domain
//!
//! Pure domain model for the driverhub device-driver runtime.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Addresses** (driver, protocol, service and client endpoints)
//! - Define **Platform messages** (requests/responses/events exchanged with the platform)
//! - Define **Protocol messages** (raw device traffic from a hub or bridge)
//! - Define **Driver events** (lifecycle transitions and driver-local events)
//! - Define the **executor event** envelope: the closed set of things a
//!   device executor can queue and dispatch
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod address;
pub mod driver;
pub mod event;
pub mod message;
