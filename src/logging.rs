/// Logs to stderr, filtered by `RUST_LOG` when set.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whatsnep=debug,tower_http=info,info".into()),
        )
        .try_init();
}
