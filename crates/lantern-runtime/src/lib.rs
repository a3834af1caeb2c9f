//! Lantern Runtime - OS collaborators: liveness, process trees, ports, wrapper launch

pub mod launch;
pub mod port;
pub mod process;

pub use launch::{spawn_wrapper, split_command_line, wrapper_executable};
pub use nix::sys::signal::Signal;
pub use port::{allocate_from, allocate_port, port_is_free, wait_port_free};
pub use process::{OsProcessControl, ProcessControl};
