//! Implementation of the LS-8, an 8-bit toy computer
//!
//! 256 bytes of memory, 8 registers, a downward growing stack and a handful of
//! flags. Programs are written as listings of binary literals, see [`loader`].

pub mod loader;
pub mod opcode;
pub mod region;
pub mod vm;
