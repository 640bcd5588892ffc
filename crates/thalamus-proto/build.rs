fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Proto compilation is optional: skip gracefully if protoc isn't on the
    // host so the workspace still builds in environments without it.
    std::fs::create_dir_all("src/generated").ok();

    let proto_path = "proto/thalamus.proto";
    if std::path::Path::new(proto_path).exists() {
        match tonic_build::configure()
            .build_server(true)
            .build_client(true)
            .out_dir("src/generated")
            .compile(&[proto_path], &["proto"])
        {
            Ok(_) => println!("cargo:warning=thalamus proto compilation successful"),
            Err(e) => {
                println!("cargo:warning=thalamus proto compilation skipped: {e}");
                println!("cargo:warning=install protoc to enable the gRPC service");
            }
        }
    }

    Ok(())
}
