//! # tlv-field
//!
//! tlv-field is a small Rust library for persisting distributed numeric
//! arrays as type-tagged binary containers ("TLV files"), designed for
//! scientific computing and PDE codes. A TLV file holds exactly one flat
//! value array with a 1-byte type/label header and a 64-bit global element
//! count; a fixed-size group of cooperating processes writes and reads
//! non-overlapping slices of the body through a collective protocol.
//!
//! ## Features
//! - Byte-exact container layout: `[header:1][count:8][count * elem]`
//! - Closed [`format::TypeTag`] enumeration of the six supported scalars
//! - Collective create/barrier/write-own-slice/barrier write protocol with
//!   loud failure on rank disagreement
//! - Balanced contiguous partitioning of `[0, n)` across ranks
//! - CSR-style connectivity companion files and an optional one-shot
//!   in-memory metadata cache for repeated reads
//! - Pluggable communication backends (serial, intra-process threads, MPI)
//!
//! ## Usage
//! Add `tlv-field` as a dependency in your `Cargo.toml` and enable features
//! as needed:
//!
//! ```toml
//! [dependencies]
//! tlv-field = "0.3"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! All container operations are collective: every rank in the group must
//! call them in the same order with the same paths and global sizes.

pub mod collective;
pub mod comm;
pub mod container;
pub mod field;
pub mod format;
pub mod partition;
pub mod range_io;
pub mod tlv_error;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::comm::{Communicator, LocalComm, NoComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::container::{CachedMetadata, ContainerOptions, TlvContainer};
    pub use crate::field::{FieldVector, MeshConnectivity, ScatterInput};
    pub use crate::format::{FormatDescriptor, TlvScalar, TypeTag};
    pub use crate::partition::local_range;
    pub use crate::tlv_error::TlvError;
}
