use std::{env, path::PathBuf};

use anyhow::{Context, Result};

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=../../proto/storage.proto");

    let out_dir = PathBuf::from(env::var("OUT_DIR").context("OUT_DIR not set")?);

    // Chunks are handed to the blob store as-is, so generate `Bytes` fields
    // instead of `Vec<u8>`.
    let storage_files = ["../../proto/storage.proto"];
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .bytes(["."])
        .file_descriptor_set_path(out_dir.join("storage_descriptor.bin"))
        .compile_protos(&storage_files, &["../../proto"])?;

    Ok(())
}
