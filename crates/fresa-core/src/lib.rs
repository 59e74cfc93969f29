//! Core motion planning for Fresa.
//!
//! This crate turns G-code blocks into time-parameterized motion: it owns
//! the point model, block parsing with arc geometry, the quantized velocity
//! profile and the evaluator used by the control loop. It performs no I/O
//! beyond reading a program file.

mod arc;
pub mod block;
pub mod machine;
pub mod point;
pub mod profile;
pub mod program;

pub use block::{Block, BlockError, BlockKind, InterpolationError, ParseFailure};
pub use machine::{Machine, MachineError};
pub use point::{Axis, Point};
pub use profile::Profile;
pub use program::{Diagnostic, Program, ProgramError};
