use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use hostpulse::collector::start_all_collectors;
use hostpulse::collectors::builtin_collectors;
use hostpulse::config::{DEFAULT_CONFIG_PATH, ENV_PREFIX, SettingsBuilder};
use hostpulse::delivery::{Endpoint, HttpDeliveryClient};
use hostpulse::dispatcher::{Dispatcher, DispatcherConfig};
use hostpulse::remote_config::{ConfigClient, HostInfo, await_enabled};
use hostpulse::retry::RetryBuilder;
use hostpulse::shutdown::Shutdown;
use hostpulse::util::{Logger, logging};

/// Collects host measurements and ships them to a collection server
#[derive(Parser, Debug)]
#[command(name = "hostpulse", version, about)]
struct Args {
    /// Collection server, `host[:port]` or a base URL
    server: Option<String>,

    /// Name this host reports as; defaults to the host name
    #[arg(short, long)]
    fqdn: Option<String>,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = SettingsBuilder::new()
        .add_file(&args.config)
        .add_env(ENV_PREFIX)
        .set_opt("server", args.server)
        .set_opt("fqdn", args.fqdn)
        .build()
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;

    logging::init(&settings.log_level)?;
    let logger = Logger::global("hostpulse");

    let endpoint = Endpoint::new(&settings.server, settings.client_id()?, settings.secret.clone());
    logger.info(format_args!(
        "hostpulse {} reporting as {} to {}",
        hostpulse::VERSION,
        endpoint.client_id(),
        endpoint.redacted_packet_url()
    ));

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        let logger = logger.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                logger.info(format_args!("Interrupt received, shutting down"));
                shutdown.trigger();
            }
        });
    }

    let config_client = ConfigClient::new(
        endpoint.clone(),
        HostInfo::detect(),
        settings.request_timeout(),
    )?;
    let retry = RetryBuilder::new()
        .max_attempts(10)
        .initial_delay(1_000)
        .build();
    let mut listener = shutdown.listener();
    let Some(remote) =
        await_enabled(&config_client, &retry, &logger.scoped("config"), &mut listener)
            .await
            .context("Failed to obtain client configuration")?
    else {
        logger.info(format_args!("Stopped before the server enabled this client"));
        return Ok(());
    };

    let collectors = remote
        .registry()
        .select(builtin_collectors(&settings), &logger);
    let mut harness = start_all_collectors(
        collectors,
        settings.queue_config(),
        &logger,
        shutdown.listener(),
    )?;

    let dispatcher_config = DispatcherConfig::from_send_throttle(remote.send_throttle)
        .context("Server sent an unusable send_throttle")?
        .flush_on_shutdown(settings.flush_on_shutdown);
    let client = HttpDeliveryClient::new(endpoint, settings.request_timeout())?;

    let report = Dispatcher::new(
        harness.queue(),
        client,
        dispatcher_config,
        logger.scoped("dispatcher"),
    )
    .run(shutdown.listener())
    .await;

    for (name, outcome) in harness.join_finished() {
        logger.debug(format_args!("Collector {} ended: {:?}", name, outcome));
    }
    logger.info(format_args!(
        "Shut down: {} batches delivered, {} discarded, {} collectors left running",
        report.delivered,
        report.discarded,
        harness.active_count()
    ));

    Ok(())
}
