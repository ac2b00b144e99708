pub mod actions;

use clap::{Arg, ArgMatches, Command};

use crate::core::config::DEFAULT_CONFIG_PATH;

/// Build the command line definition.
pub fn command() -> Command {
    Command::new("wisun-meter")
        .about("Read a smart electricity meter over the Wi-SUN B route")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Path of the TOML configuration file")
                .value_name("FILE")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("force-rescan")
                .long("force-rescan")
                .help("Ignore the cached session and run the full scan")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-config-cache")
                .long("no-config-cache")
                .help("Neither read nor write the session cache")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Log measurements instead of writing them to InfluxDB")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-ports")
                .long("list-ports")
                .short('l')
                .help("List all available serial ports and exit")
                .action(clap::ArgAction::SetTrue)
                .conflicts_with("device-version"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .short('j')
                .help("Output the port list in JSON format")
                .requires("list-ports")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("device-version")
                .long("device-version")
                .help("Print the adapter firmware version (SKVER) and exit")
                .action(clap::ArgAction::SetTrue),
        )
}

/// Parse command line arguments and return ArgMatches.
pub fn parse_args() -> ArgMatches {
    command().get_matches()
}
