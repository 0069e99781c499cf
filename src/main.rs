mod cli;

use crate::cli::DevpxArguments;
use anyhow::Result;
use clap::Parser;
use devpx::config::{Config, EnvSecrets};
use devpx::proxy::static_files::StaticFiles;
use devpx::proxy::upstream::UpstreamClient;
use devpx::proxy::{ProxyRuleTable, ProxyState, start_dev_server};
use log::{LevelFilter, info, trace};

#[tokio::main]
async fn main() -> Result<()> {
    let args = DevpxArguments::parse();
    pretty_env_logger::env_logger::builder()
        .format_timestamp(None)
        .filter_level(if args.verbose { LevelFilter::Trace } else { LevelFilter::Info })
        .parse_default_env()
        .init();

    if args.handle_arguments().await? {
        return Ok(());
    }

    info!("Starting devpx");
    trace!("Arguments: {:#?}", args);

    let config_path = Config::resolve_config_path(args.config_path.clone());
    let mut config = Config::try_load(&config_path).await?;
    args.apply_overrides(&mut config);
    let listen = config.listen_addr()?;

    let secrets = EnvSecrets::load();
    let table = ProxyRuleTable::from_config(&config, &secrets)?;
    info!("Loaded {} proxy rules", table.len());
    for line in table.to_string().lines() {
        info!("  {}", line);
    }

    let assets = StaticFiles::from_config(&config);
    info!("Serving unmatched requests from {}", assets.root().display());
    let state = ProxyState::new(table, UpstreamClient::new()?, assets);
    start_dev_server(listen, state).await
}
