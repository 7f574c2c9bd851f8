//!
//! Generate Protobuf code
//!

fn main() {
    prost_build::Config::new()
        .btree_map(["."])
        .include_file("protobuf.rs")
        .compile_protos(
            &["../shared/protobuf/dispatch_job.proto"],
            &["../shared/protobuf/"],
        )
        .unwrap();
}
