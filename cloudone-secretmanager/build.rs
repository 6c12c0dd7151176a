//! Compiles the Secret Manager and IAM protos into tonic stubs.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    let well_known = protoc_bin_vendored::include_path()?;

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "proto/google/iam/v1/policy.proto",
                "proto/google/iam/v1/iam_policy.proto",
                "proto/google/cloud/secretmanager/v1/resources.proto",
                "proto/google/cloud/secretmanager/v1/service.proto",
            ]
            .map(std::path::PathBuf::from),
            &[std::path::PathBuf::from("proto"), well_known],
        )?;

    println!("cargo:rerun-if-changed=proto");
    Ok(())
}
