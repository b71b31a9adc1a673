//! Main application entry point (native).

#[cfg(feature = "native")]
mod cli;

#[cfg(feature = "native")]
fn main() -> std::process::ExitCode {
    use clap::Parser;

    env_logger::init();
    log::info!("Starting ChunkCanvas");

    cli::run(cli::CliArgs::parse())
}

#[cfg(not(feature = "native"))]
fn main() -> std::process::ExitCode {
    eprintln!("Native feature not enabled. Use `cargo run --features native`");
    std::process::ExitCode::FAILURE
}
