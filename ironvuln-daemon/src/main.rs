use anyhow::Result;
use clap::Parser;

use ironvuln_core::config::IronvulnConfig;
use ironvuln_daemon::cli::DaemonCli;
use ironvuln_daemon::{Daemon, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 파일 → 환경변수 → CLI 순으로 덮어쓴다
    let mut config = IronvulnConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "ironvuln-daemon starting"
    );

    let daemon = Daemon::build(config).await?;
    daemon.run().await
}
