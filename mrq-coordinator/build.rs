fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the shared proto via `prost`, generating service stubs
    // and message definitions for use with `tonic`.
    tonic_build::compile_protos("../protos/coordinator.proto")?;
    Ok(())
}
