//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the executor core and the outside world.
//! They are defined here (in `app`) so that both the executor and the adapter
//! layer can depend on them without creating circular dependencies.

pub mod context;
pub mod handler;
pub mod platform_bus;
pub mod scheduler;

pub use context::DriverContext;
pub use handler::{DriverHandler, HandlerResult};
pub use platform_bus::PlatformBus;
pub use scheduler::{Scheduler, Task};
