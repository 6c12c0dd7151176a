//! Compiles the hosts agent protocol into tonic client and server stubs.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/cloudone/hosts/v1/hosts.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto");
    Ok(())
}
