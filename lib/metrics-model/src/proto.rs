//! Generated protobuf types, wired in from the `build.rs` codegen step.

pub mod client_model {
    include!(concat!(env!("OUT_DIR"), "/client_model.rs"));
}

pub mod prometheus_remote {
    include!(concat!(env!("OUT_DIR"), "/prometheus_remote.rs"));
}
