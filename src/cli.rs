use std::env;
use std::path::PathBuf;

/// Default configuration path, relative to the working directory.
pub const DEFAULT_CONFIG: &str = "config/microgrid.toml";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(CliOptions),
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub config: PathBuf,
    pub seed: Option<u64>,
    pub log: Option<String>,
}

pub fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

pub fn parse_args_from(args: Vec<String>) -> Result<Command, String> {
    let mut i = 0usize;
    let mut config = None;
    let mut seed = None;
    let mut log = None;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --config (expected a TOML file path)")?;
                if config.replace(PathBuf::from(path)).is_some() {
                    return Err("--config provided more than once".to_string());
                }
            }
            "--seed" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --seed (expected an unsigned integer)")?;
                let value = raw
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --seed \"{raw}\" (expected an unsigned integer)"))?;
                if seed.replace(value).is_some() {
                    return Err("--seed provided more than once".to_string());
                }
            }
            "--log" => {
                i += 1;
                let filter = args.next_or_err(i, "missing value for --log (expected a filter such as \"debug\")")?;
                if log.replace(filter.to_string()).is_some() {
                    return Err("--log provided more than once".to_string());
                }
            }
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    Ok(Command::Run(CliOptions {
        config: config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG)),
        seed,
        log,
    }))
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("microgrid-sim: simulated battery, recloser, solar and load devices on a message bus");
    eprintln!();
    eprintln!("Usage: microgrid-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>   Device configuration (default: {DEFAULT_CONFIG})");
    eprintln!("  --seed <u64>      Override the random seed");
    eprintln!("  --log <filter>    Log filter when RUST_LOG is unset (e.g. debug)");
    eprintln!("  --help            Show this help message");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_shipped_config() {
        let cmd = parse_args_from(Vec::new()).expect("parse should succeed");
        assert_eq!(
            cmd,
            Command::Run(CliOptions {
                config: PathBuf::from(DEFAULT_CONFIG),
                seed: None,
                log: None,
            })
        );
    }

    #[test]
    fn supports_all_options() {
        let cmd = parse_args_from(args(&["--config", "site.toml", "--seed", "9", "--log", "debug"]))
            .expect("parse should succeed");
        let Command::Run(opts) = cmd else {
            panic!("expected run");
        };
        assert_eq!(opts.config, PathBuf::from("site.toml"));
        assert_eq!(opts.seed, Some(9));
        assert_eq!(opts.log.as_deref(), Some("debug"));
    }

    #[test]
    fn help_wins() {
        assert_eq!(parse_args_from(args(&["-h"])), Ok(Command::Help));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args_from(args(&["--seed", "-1"])).is_err());
        assert!(parse_args_from(args(&["--config"])).is_err());
        assert!(parse_args_from(args(&["--config", "a", "--config", "b"])).is_err());
        assert!(parse_args_from(args(&["--verbose"])).is_err());
    }
}
