//! Command-line surface shared by both roles.
//!
//! [`Cli`] is what clap parses; [`Cli::resolve`] validates it once into an
//! immutable [`Mode`] that the rest of the program consumes.

use crate::client::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{MAX_PACKET_SIZE, MIN_PACKET_SIZE};
use crate::server::config::{ServerConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_UPDATE_INTERVAL_MS};
use clap::{ArgGroup, Parser, ValueEnum};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 8888;

/// Highest accepted `--sync-rounds`; each round needs its own reserved sequence number.
pub const MAX_SYNC_ROUNDS: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => write!(f, "TCP"),
            Transport::Udp => write!(f, "UDP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn unspecified(self) -> IpAddr {
        match self {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    /// Parse an IP literal, rejecting literals of the other family.
    pub fn parse_ip(self, literal: &str) -> Result<IpAddr> {
        let parsed = match self {
            AddressFamily::V4 => Ipv4Addr::from_str(literal).map(IpAddr::V4).ok(),
            AddressFamily::V6 => Ipv6Addr::from_str(literal).map(IpAddr::V6).ok(),
        };
        parsed.ok_or_else(|| Error::Config(format!("invalid {} address: {}", self, literal)))
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "netprobe")]
#[command(about = "Network latency and jitter measurement tool (probe client and echo server)")]
#[command(group(ArgGroup::new("role").required(true).args(["server", "client"])))]
pub struct Cli {
    /// Run as echo server
    #[arg(short = 's', long)]
    pub server: bool,

    /// Run as client against this IP address
    #[arg(short = 'c', long = "client", value_name = "IP")]
    pub client: Option<String>,

    /// TCP/UDP port
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Use UDP instead of TCP
    #[arg(short = 'u', long)]
    pub udp: bool,

    /// Number of measurement packets
    #[arg(short = 'n', long = "count", default_value_t = 100)]
    pub count: usize,

    /// Delay between packets in milliseconds (used when --rate is 0)
    #[arg(short = 'd', long = "delay", default_value_t = 100)]
    pub delay_ms: u64,

    /// Packet size in bytes, clamped to [64, 8192]
    #[arg(short = 'l', long = "length", default_value_t = 1024)]
    pub packet_size: usize,

    /// Target send rate in packets/second; overrides --delay when > 0
    #[arg(short = 'r', long = "rate", default_value_t = 10)]
    pub rate_pps: u32,

    /// Write per-packet results to this CSV file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Use IPv6 instead of IPv4
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// Enable clock synchronization for direct one-way latency
    #[arg(short = 't', long = "time-sync")]
    pub time_sync: bool,

    /// Number of clock synchronization rounds
    #[arg(long, default_value_t = 10)]
    pub sync_rounds: usize,

    /// Warm-up exchanges whose samples are discarded
    #[arg(long, default_value_t = 0)]
    pub warmup: usize,

    /// Receive timeout per packet in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,

    /// Server bind address (defaults to the wildcard address of the family)
    #[arg(long, value_name = "IP")]
    pub bind: Option<String>,

    /// Maximum concurrent TCP connections served
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Monitor update interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_UPDATE_INTERVAL_MS)]
    pub update_interval: u64,

    /// Disable progress bar / live status line
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Immutable per-run settings for the selected role.
#[derive(Debug, Clone)]
pub enum Mode {
    Server(ServerConfig),
    Client(ClientConfig),
}

impl Cli {
    pub fn transport(&self) -> Transport {
        if self.udp {
            Transport::Udp
        } else {
            Transport::Tcp
        }
    }

    pub fn family(&self) -> AddressFamily {
        if self.ipv6 {
            AddressFamily::V6
        } else {
            AddressFamily::V4
        }
    }

    /// Returns true if JSON format logging is enabled
    pub fn is_json_format(&self) -> bool {
        self.log_format == LogFormat::Json
    }

    /// Validate the arguments and resolve them into a run mode.
    pub fn resolve(&self) -> Result<Mode> {
        debug!("Validating configuration");

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        if self.port == 0 {
            return Err(Error::Config("port must be > 0".into()));
        }

        let family = self.family();
        let mode = if self.server {
            let ip = match &self.bind {
                Some(literal) => family.parse_ip(literal)?,
                None => family.unspecified(),
            };
            if self.max_connections == 0 {
                return Err(Error::Config("max_connections must be > 0".into()));
            }
            if self.update_interval == 0 {
                return Err(Error::Config("update_interval must be > 0".into()));
            }
            Mode::Server(ServerConfig {
                bind: SocketAddr::new(ip, self.port),
                transport: self.transport(),
                max_connections: self.max_connections,
                update_interval_ms: self.update_interval,
                quiet: self.quiet,
            })
        } else {
            let literal = self
                .client
                .as_deref()
                .ok_or_else(|| Error::Config("either -s or -c <ip> is required".into()))?;
            let ip = family.parse_ip(literal)?;

            if self.count == 0 {
                return Err(Error::Config("count must be > 0".into()));
            }
            if self.timeout_ms == 0 {
                return Err(Error::Config("timeout must be > 0".into()));
            }
            if self.time_sync && !(1..=MAX_SYNC_ROUNDS).contains(&self.sync_rounds) {
                return Err(Error::Config(format!(
                    "sync_rounds must be in 1..={}",
                    MAX_SYNC_ROUNDS
                )));
            }

            Mode::Client(ClientConfig {
                target: SocketAddr::new(ip, self.port),
                transport: self.transport(),
                packet_size: self.packet_size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE),
                packet_count: self.count,
                delay_ms: self.delay_ms,
                rate_pps: self.rate_pps,
                clock_sync: self.time_sync,
                sync_rounds: self.sync_rounds,
                warmup: self.warmup,
                timeout: Duration::from_millis(self.timeout_ms),
                output: self.output.clone(),
                quiet: self.quiet,
            })
        };

        debug!(?mode, "Configuration validated successfully");
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["netprobe"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn client(args: &[&str]) -> ClientConfig {
        match parse(args).resolve().unwrap() {
            Mode::Client(config) => config,
            Mode::Server(_) => panic!("expected client mode"),
        }
    }

    #[test]
    fn test_client_defaults() {
        let config = client(&["-c", "127.0.0.1"]);
        assert_eq!(config.target, "127.0.0.1:8888".parse().unwrap());
        assert_eq!(config.transport, Transport::Tcp);
        assert_eq!(config.packet_size, 1024);
        assert_eq!(config.packet_count, 100);
        assert_eq!(config.delay_ms, 100);
        assert_eq!(config.rate_pps, 10);
        assert!(!config.clock_sync);
        assert!(config.output.is_none());
    }

    #[test]
    fn test_short_flags() {
        let config = client(&[
            "-c", "10.0.0.5", "-p", "9000", "-u", "-n", "10", "-d", "5", "-l", "64", "-r", "0",
            "-o", "out.csv", "-t",
        ]);
        assert_eq!(config.target, "10.0.0.5:9000".parse().unwrap());
        assert_eq!(config.transport, Transport::Udp);
        assert_eq!(config.packet_count, 10);
        assert_eq!(config.delay_ms, 5);
        assert_eq!(config.rate_pps, 0);
        assert_eq!(config.output, Some(PathBuf::from("out.csv")));
        assert!(config.clock_sync);
    }

    #[test]
    fn test_packet_size_is_clamped() {
        assert_eq!(client(&["-c", "127.0.0.1", "-l", "10"]).packet_size, 64);
        assert_eq!(client(&["-c", "127.0.0.1", "-l", "100000"]).packet_size, 8192);
        assert_eq!(client(&["-c", "127.0.0.1", "-l", "500"]).packet_size, 500);
    }

    #[test]
    fn test_ipv6_client() {
        let config = client(&["-6", "-c", "::1"]);
        assert_eq!(config.target, "[::1]:8888".parse().unwrap());
    }

    #[test]
    fn test_ip_family_mismatch_rejected() {
        assert!(parse(&["-c", "::1"]).resolve().is_err());
        assert!(parse(&["-6", "-c", "127.0.0.1"]).resolve().is_err());
        assert!(parse(&["-c", "not-an-ip"]).resolve().is_err());
    }

    #[test]
    fn test_server_mode() {
        match parse(&["-s", "-u", "-p", "7000"]).resolve().unwrap() {
            Mode::Server(config) => {
                assert_eq!(config.bind, "0.0.0.0:7000".parse().unwrap());
                assert_eq!(config.transport, Transport::Udp);
                assert_eq!(config.max_connections, 64);
            }
            Mode::Client(_) => panic!("expected server mode"),
        }
        match parse(&["-s", "-6"]).resolve().unwrap() {
            Mode::Server(config) => assert_eq!(config.bind, "[::]:8888".parse().unwrap()),
            Mode::Client(_) => panic!("expected server mode"),
        }
    }

    #[test]
    fn test_role_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["netprobe"]).is_err());
        assert!(Cli::try_parse_from(["netprobe", "-s", "-c", "127.0.0.1"]).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse(&["-c", "127.0.0.1", "-n", "0"]).resolve().is_err());
        assert!(parse(&["-c", "127.0.0.1", "-p", "0"]).resolve().is_err());
        assert!(parse(&["-c", "127.0.0.1", "-t", "--sync-rounds", "30"])
            .resolve()
            .is_err());
        assert!(parse(&["-s", "--log-level", "loud"]).resolve().is_err());
        assert!(parse(&["-s", "--max-connections", "0"]).resolve().is_err());
    }
}
