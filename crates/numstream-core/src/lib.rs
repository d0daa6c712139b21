#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// Generated protobuf messages and gRPC stubs for `numstream.v1`.
pub mod proto {
    tonic::include_proto!("numstream.v1");

    /// Encoded descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("numstream_descriptor");
}

// Public re-export so downstream crates share the same big integer type.
pub use num_bigint;
