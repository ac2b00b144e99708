use anyhow::Result;

use wisun_meter::{boot, cli, core::config::AppConfig, utils::Shutdown};

fn run() -> Result<()> {
    let matches = cli::parse_args();
    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(wisun_meter::core::config::DEFAULT_CONFIG_PATH);
    let config = AppConfig::load_or_default(config_path)?;

    boot::init_logging(config.logging.file.as_deref());
    log::debug!("Loaded config from {config_path}: {config:?}");

    if cli::actions::run_one_shot_actions(&matches, &config)? {
        return Ok(());
    }

    let shutdown = Shutdown::new();
    boot::install_signal_handler(shutdown.clone())?;
    cli::actions::run_meter(&matches, &config, shutdown)
}

fn main() {
    if let Err(err) = run() {
        log::error!("{err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
