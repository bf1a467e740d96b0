//! Logging init: a stdout layer, plus a non-blocking file layer when
//! configured. Levels come from the config's filter directive.

use std::mem::forget;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Config;

pub fn init_logging(config: &Config) {
    let directive = &config.tracing.level;
    let stdout_filter =
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).with_filter(stdout_filter);

    let Some(path) = &config.tracing.log_file else {
        tracing_subscriber::registry().with(stdout_layer).init();
        return;
    };

    let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_name = path.file_name().map_or_else(
        || std::ffi::OsString::from("ethrelayd.log"),
        std::ffi::OsStr::to_os_string,
    );
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
    // The guard must outlive the process for the writer to keep flushing.
    forget(guard);

    let file_filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();
}
