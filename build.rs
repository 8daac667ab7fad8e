use std::path::PathBuf;

const PROTO: &str = "proto/ecs/inventory/v1/inventory.proto";

fn main() {
    println!("cargo:rerun-if-changed={PROTO}");
    println!("cargo:rerun-if-env-changed=ECS_EXPORTER_REGENERATE_PROTO");

    // generated code is committed under src/api/generated
    if std::env::var_os("ECS_EXPORTER_REGENERATE_PROTO").is_none() {
        return;
    }

    let out_dir = PathBuf::from("src/api/generated");
    std::fs::create_dir_all(&out_dir).unwrap();

    tonic_prost_build::configure()
        .out_dir(&out_dir)
        .compile_protos(&[PROTO], &["proto"])
        .unwrap();

    // Add SPDX header to generated files
    let generated_file = out_dir.join("ecs.inventory.v1.rs");
    if generated_file.exists() {
        let content = std::fs::read_to_string(&generated_file).unwrap();
        let new_content = format!(
            "// SPDX-License-Identifier: MIT OR Apache-2.0\n// DO NOT EDIT\n{}",
            content
        );
        std::fs::write(generated_file, new_content).unwrap();
    }
}
