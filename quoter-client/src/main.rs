use quoter_client::cli::run_cli;

fn main() -> Result<(), String> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start tokio runtime: {e}"))?
        .block_on(run_cli())
}
