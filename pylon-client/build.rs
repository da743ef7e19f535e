//! Build script compiling the pool service definition

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protos = ["proto/pool_connector.proto"];

    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&protos, &["proto"])?;

    println!("cargo:rerun-if-changed=build.rs");
    for proto in &protos {
        println!("cargo:rerun-if-changed={proto}");
    }

    Ok(())
}
