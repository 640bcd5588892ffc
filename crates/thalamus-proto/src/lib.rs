//! Generated protobuf/gRPC types for the Thalamus wire protocol. The actual
//! message and service code is emitted by `build.rs` via `tonic-build` from
//! `proto/thalamus.proto`; this crate just re-exports it under a stable
//! path so downstream crates don't need to know the generated module name.

tonic::include_proto!("thalamus");
