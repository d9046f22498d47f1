fn main() {
    println!("cargo:rerun-if-changed=proto/metric_family.proto");
    println!("cargo:rerun-if-changed=proto/remote.proto");

    prost_build::Config::new()
        .compile_protos(
            &["proto/metric_family.proto", "proto/remote.proto"],
            &["proto"],
        )
        .unwrap();
}
