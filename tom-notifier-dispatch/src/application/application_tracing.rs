use super::ApplicationEnv;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// HTTP and driver internals are only interesting when something breaks
const QUIET_DEPENDENCIES: [&str; 4] = ["hyper_util=warn", "reqwest=warn", "mongodb=warn", "amqprs=warn"];

pub fn setup_tracing(env: &ApplicationEnv) -> anyhow::Result<()> {
    let mut console_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env()?;
    let mut file_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse("")?;
    for directive in QUIET_DEPENDENCIES {
        console_filter = console_filter.add_directive(directive.parse()?);
        file_filter = file_filter.add_directive(directive.parse()?);
    }

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    let file_appender = tracing_appender::rolling::hourly(&env.log_directory, &env.log_filename);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(())
}
