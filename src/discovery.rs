//! Discovery of containers below the container runtime's base directory.
mod docker;

pub use docker::{Discoverer, Error, Result, discover_existing, events_task};
