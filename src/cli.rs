use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap_derive::Parser;
use tracing::Level;

use crate::config::{source_port, UdpPingConfig};
use crate::node_id::DEFAULT_NODE_ID_FILE;

/// UDP ping: continuous RTT measurement against a UDP echo service
#[derive(Parser, Debug)]
#[command(name = "udpping", version)]
pub struct Args {
    /// Measurement instance ID
    #[arg(short = 'i', long)]
    pub instance: u32,

    /// Destination IP address
    #[arg(short = 'D', long, default_value = "128.39.37.70")]
    pub daddr: IpAddr,

    /// Destination port
    #[arg(short = 'd', long, default_value_t = 7)]
    pub dport: u16,

    /// Interface name
    #[arg(short = 'I', long)]
    pub iface: String,

    /// Payload size in bytes
    #[arg(short = 'S', long, default_value_t = 20)]
    pub psize: usize,

    /// Reply timeout in seconds
    #[arg(short = 't', long, default_value_t = 60)]
    pub timeout: u64,

    /// Network identifier, used to derive a fixed source port from the node number
    #[arg(short = 'N', long)]
    pub network_id: Option<u16>,

    /// Do not compress rotated measurement data files
    #[arg(long)]
    pub no_compress: bool,

    #[arg(long, default_value = "/nne/log")]
    pub log_dir: PathBuf,

    #[arg(long, default_value = "/nne/data")]
    pub data_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_NODE_ID_FILE)]
    pub node_id_file: PathBuf,

    /// More verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Builds and validates the configuration. The node number is only looked up if a network
    ///  identifier requires a fixed source port.
    pub fn into_config(self, node_number: impl FnOnce() -> anyhow::Result<u32>) -> anyhow::Result<UdpPingConfig> {
        let mut config = UdpPingConfig::new(self.instance, SocketAddr::new(self.daddr, self.dport), self.iface);

        if let Some(network_id) = self.network_id {
            config.source_port = source_port(node_number()?, network_id)?;
        }
        config.payload_size = self.psize;
        config.reply_timeout = Duration::from_secs(self.timeout);
        config.compress = !self.no_compress;
        config.log_dir = self.log_dir;
        config.data_dir = self.data_dir;

        config.validate()?;
        Ok(config)
    }
}


#[cfg(test)]
mod tests {
    use anyhow::bail;
    use clap::Parser;
    use rstest::rstest;

    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<UdpPingConfig> {
        let args = Args::try_parse_from(std::iter::once("udpping").chain(args.iter().copied()))?;
        args.into_config(|| Ok(412))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["-i", "3", "-I", "eth0"]).unwrap();

        assert_eq!(config.instance_id, 3);
        assert_eq!(config.destination, "128.39.37.70:7".parse().unwrap());
        assert_eq!(config.interface, "eth0");
        assert_eq!(config.source_port, 0);
        assert_eq!(config.payload_size, 20);
        assert_eq!(config.reply_timeout, Duration::from_secs(60));
        assert!(config.compress);
        assert_eq!(config.data_log_file(), PathBuf::from("/nne/data/uping_3.dat"));
    }

    #[test]
    fn test_all_options() {
        let config = parse(&[
            "--instance", "5", "-D", "2001:db8::1", "-d", "7777", "-I", "wwan0", "-S", "100",
            "-t", "10", "-N", "2", "--no-compress", "--log-dir", "/tmp/log", "--data-dir", "/tmp/data",
        ]).unwrap();

        assert_eq!(config.destination, "[2001:db8::1]:7777".parse().unwrap());
        assert_eq!(config.interface, "wwan0");
        assert_eq!(config.source_port, 14122);
        assert_eq!(config.payload_size, 100);
        assert_eq!(config.reply_timeout, Duration::from_secs(10));
        assert!(!config.compress);
        assert_eq!(config.operational_log_file(), PathBuf::from("/tmp/log/uping_5.log"));
    }

    #[rstest]
    #[case::missing_instance(&["-I", "eth0"])]
    #[case::missing_interface(&["-i", "1"])]
    #[case::invalid_address(&["-i", "1", "-I", "eth0", "-D", "nne.example.org"])]
    #[case::port_zero(&["-i", "1", "-I", "eth0", "-d", "0"])]
    #[case::port_too_large(&["-i", "1", "-I", "eth0", "-d", "65536"])]
    #[case::payload_too_small(&["-i", "1", "-I", "eth0", "-S", "15"])]
    #[case::payload_too_large(&["-i", "1", "-I", "eth0", "-S", "2049"])]
    #[case::timeout_zero(&["-i", "1", "-I", "eth0", "-t", "0"])]
    #[case::timeout_too_large(&["-i", "1", "-I", "eth0", "-t", "86401"])]
    #[case::network_id_too_large(&["-i", "1", "-I", "eth0", "-N", "1000"])]
    fn test_invalid(#[case] args: &[&str]) {
        assert!(parse(args).is_err());
    }

    #[test]
    fn test_node_number_only_resolved_with_network_id() {
        let args = Args::try_parse_from(["udpping", "-i", "1", "-I", "eth0"]).unwrap();
        let config = args.into_config(|| bail!("no node number")).unwrap();
        assert_eq!(config.source_port, 0);

        let args = Args::try_parse_from(["udpping", "-i", "1", "-I", "eth0", "-N", "1"]).unwrap();
        assert!(args.into_config(|| bail!("no node number")).is_err());
    }

    #[rstest]
    #[case(&[], Level::INFO)]
    #[case(&["-v"], Level::DEBUG)]
    #[case(&["-vv"], Level::TRACE)]
    #[case(&["-v", "-v", "-v"], Level::TRACE)]
    fn test_log_level(#[case] verbosity: &[&str], #[case] expected: Level) {
        let args = Args::try_parse_from(["udpping", "-i", "1", "-I", "eth0"].into_iter().chain(verbosity.iter().copied())).unwrap();
        assert_eq!(args.log_level(), expected);
    }
}
