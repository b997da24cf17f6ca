//! Host-side helpers for driving the `engine` sidecar.

pub mod sidecar;

pub use sidecar::{Sidecar, SidecarEvent, SidecarRequest, Transcript};
