/// Builds the gRPC client and server code for `numstream.proto` using
/// `tonic-prost-build`.
///
/// # Byte Field Optimization
///
/// The `value` and `checksum` fields of `SequenceResponse` are mapped to
/// `Bytes` (from the `bytes` crate) instead of `Vec<u8>`, so decoding a value
/// does not copy the payload out of the receive buffer.
///
/// # Output
///
/// The generated module is included by the crate as:
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("numstream.v1");
/// }
/// ```
///
/// A file descriptor set is written next to it for the reflection service.
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("numstream_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .bytes([".numstream.v1.SequenceResponse"])
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/numstream.proto"], &["proto"])
        .unwrap();
}
