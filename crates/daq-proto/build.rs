//! Build script for daq-proto
//!
//! Generates the NI-DAQmx gRPC client bindings during `cargo build`.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/nidaqmx.proto");

    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .type_attribute(".", "#[allow(missing_docs)]")
        .compile(&["proto/nidaqmx.proto"], &["proto"])?;

    Ok(())
}
