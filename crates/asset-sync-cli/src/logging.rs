use tracing_subscriber::EnvFilter;

const CRATES: [&str; 4] = [
    "asset_sync",
    "asset_sync_remote",
    "asset_sync_store",
    "asset_syncer",
];

/// Filter used when `RUST_LOG` is unset: our crates at `info` (or `debug`
/// when verbose), everything else at `warn`.
pub fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    std::iter::once("warn".to_owned())
        .chain(CRATES.iter().map(|c| format!("{c}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
