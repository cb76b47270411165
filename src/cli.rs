use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "HTTP:   rouille (sync)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Media node control backend (displays, audio, player and browser instances)
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Address to bind (overrides `host` in app.ini)
    #[arg(long = "host", value_name = "ADDR")]
    pub host: Option<String>,

    /// Port to listen on (overrides `port` in app.ini)
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Enable logging to file (default: media-node.log in the config directory)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from(["media-node", "-vv", "--port", "8080", "-c", "/etc/node", "--log"]);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.config_dir, Some(PathBuf::from("/etc/node")));
        assert_eq!(args.log_file, Some(None));
        assert_eq!(args.host, None);
    }

    #[test]
    fn test_log_file_value() {
        let args = Args::parse_from(["media-node", "--log", "/tmp/node.log"]);
        assert_eq!(args.log_file, Some(Some(PathBuf::from("/tmp/node.log"))));
    }
}
