//! # Runtime Module
//!
//! Runtime components for the control plane: initialization, the controller run
//! loop and signal handling.

pub mod controller_loop;
pub mod initialization;

pub use controller_loop::*;
pub use initialization::*;
