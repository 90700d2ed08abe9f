use backtrace::Backtrace;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt,
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type FmtLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Sets up logging. Logs go to a daily rolling file in `LOG_PATH` if it's set,
/// and to stdout otherwise. The filter is read from `LOG_LEVEL`
///
/// The returned guard has to be kept alive for file logs to be flushed
pub fn setup_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let (fmt_layer, guard): (FmtLayer, _) = match std::env::var("LOG_PATH") {
        Ok(log_path) => {
            let file_appender = tracing_appender::rolling::daily(log_path, "app.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = fmt::layer().pretty().with_writer(non_blocking);

            // on debug, also log to stdout
            #[cfg(debug_assertions)]
            let layer = layer.and_then(fmt::layer().with_writer(std::io::stdout));

            (layer.boxed(), Some(guard))
        }
        Err(_) => (fmt::layer().with_writer(std::io::stdout).boxed(), None),
    };

    registry.with(fmt_layer).init();

    set_panic_hook();

    guard
}

fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        let b = Backtrace::new();
        if let Some(location) = panic.location() {
            tracing::error!(
                message = %panic,
                panic.file = location.file(),
                panic.line = location.line(),
                panic.column = location.column(),
                backtrace = ?b,
            );
        } else {
            tracing::error!(message = %panic, backtrace = ?b);
        }
    }));
}
