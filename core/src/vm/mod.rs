//! Stack bytecode VM subsystem
//!
//! Code units (built with [`CodeBuilder`], loaded from JSON assembly, or
//! decoded from an `SVMB` container) run on a [`Vm`] against a [`VmContext`]
//! holding globals and builtins.

mod asm;
mod builder;
mod builtins;
mod code;
mod container;
mod context;
mod decode;
mod error;
mod opcode;
#[allow(clippy::module_inception)]
mod vm;

pub use asm::*;
pub use builder::*;
pub use builtins::check_arity;
pub use code::*;
pub use container::*;
pub use context::VmContext;
pub use decode::*;
pub use error::*;
pub use opcode::*;
pub use vm::*;

#[cfg(test)]
mod vm_test;
