//! Crate containing a discrete-time simulation core for freight-rail
//! networks: heterogeneous trains advance over a directed graph of track
//! links, with per-tick longitudinal dynamics, multi-source powertrain energy
//! accounting (fuel, electric, and hybrid locomotives with regenerative
//! braking), and queue-based mutual exclusion at shared junctions.
//!
//! # Helpful Tips
//! Config and state structs implement [traits::SerdeAPI] for reading and
//! writing themselves to standard text formats.
//!
//! # Feature Flags
#![doc = document_features::document_features!()]

#[macro_use]
pub mod macros;

pub mod consist;
pub mod error;
pub mod imports;
pub mod input;
pub mod network;
pub mod prelude;
pub mod si;
pub mod sim;
pub mod train;
pub mod traits;
pub mod uc;
pub mod utils;
