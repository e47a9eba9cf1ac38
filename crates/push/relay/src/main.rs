//! Push Relay - delivers JSON messages read from stdin through one provider.
//!
//! Usage: `push-relay [CONFIG]`. Each stdin line is a message; each stdout
//! line is the response for one completed message. Logs go to stderr.

mod relay;

use std::path::PathBuf;

use color_eyre::eyre::WrapErr as _;
use push_core::Config;
use push_core::config::ProviderConfig;
use push_engine::Pusher;
use tokio::io::BufReader;

const CONFIG_ENV: &str = "PUSH_RELAY_CONFIG";
const DEFAULT_CONFIG: &str = "push-relay.toml";

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let path = config_path();
    let config = Config::load(&path)
        .wrap_err_with(|| format!("failed to load config from {}", path.display()))?;

    tracing::info!(
        config = %path.display(),
        environment = ?config.engine.environment,
        senders = config.engine.sender_count,
        "push-relay starting"
    );

    let summary = match &config.provider {
        ProviderConfig::Apns(apns) => serve(push_providers::apns(apns, &config.engine)?).await?,
        ProviderConfig::Fcm(fcm) => serve(push_providers::fcm(fcm, &config.engine)?).await?,
        ProviderConfig::Hcm(hcm) => serve(push_providers::hcm(hcm, &config.engine)?).await?,
    };

    tracing::info!(
        queued = summary.queued,
        skipped = summary.skipped,
        responses = summary.responses,
        "push-relay finished"
    );

    Ok(())
}

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_ENV))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

async fn serve<P: Pusher>(pusher: P) -> color_eyre::eyre::Result<relay::Summary> {
    let input = BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    relay::run(pusher, input, &mut output).await
}
