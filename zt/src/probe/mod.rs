//! Reference collaborators that feed the engine
//!
//! Each probe is a [`Task`](crate::domain::Task) the `scan` command submits.

mod port;
mod resolve;

pub use port::{COMMON_PORTS, PortProbe, service_name};
pub use resolve::ResolveProbe;
