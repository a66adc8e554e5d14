use tracing::info;

use lrdb_dap::DebugAdapter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting lrdb-dap adapter");
    let mut adapter = DebugAdapter::new();
    if let Err(err) = adapter.run_stdio() {
        eprintln!("lrdb-dap error: {err}");
        std::process::exit(1);
    }
}
