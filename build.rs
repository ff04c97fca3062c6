fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "proto/copilot/v1/copilot.proto",
                "proto/copilot/scheduler/v1/scheduler.proto",
            ],
            &["proto"],
        )?;
    Ok(())
}
