//! lanlink-core — field codec, wire format, and configuration.
//! The protocol crates depend on this one and nothing else in the workspace.

pub mod codec;
pub mod config;
pub mod wire;

pub use codec::{CodecError, FieldReader, FieldWriter};
pub use wire::{ProbeEcho, ProbePing, WireError};
