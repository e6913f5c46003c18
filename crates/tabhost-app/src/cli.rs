use std::path::PathBuf;

use clap::Parser;

/// tabhost: a privileged multi-tab surface host speaking line-delimited
/// JSON on stdin/stdout.
#[derive(Parser, Debug)]
#[command(name = "tabhost", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error or a full
    /// filter directive).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print the effective config as JSON and exit.
    #[arg(long)]
    pub print_config: bool,
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let args = Args::parse_from([
            "tabhost",
            "--config",
            "/tmp/tabhost.toml",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/tabhost.toml")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(!args.print_config);
    }

    #[test]
    fn defaults_are_empty() {
        let args = Args::parse_from(["tabhost"]);
        assert!(args.config.is_none());
        assert!(args.log_level.is_none());
    }
}
