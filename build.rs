fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    let out_dir = std::env::var("OUT_DIR")?;
    tonic_build::configure()
        .file_descriptor_set_path(std::path::PathBuf::from(&out_dir).join("chord_descriptor.bin"))
        .compile(&["proto/chord.proto"], &["proto"])?;
    Ok(())
}
