use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;

use crate::probe::probe::{MAX_PAYLOAD_SIZE, MIN_PAYLOAD_SIZE};

pub const MAX_REPLY_TIMEOUT: Duration = Duration::from_secs(86400);
pub const MAX_NETWORK_ID: u16 = 999;

#[derive(Debug, Clone)]
pub struct UdpPingConfig {
    /// Measurement instance ID: tags every Outcome Record and the log file names
    pub instance_id: u32,

    /// The echo peer. Its address family determines which interface address is used
    pub destination: SocketAddr,
    pub interface: String,
    /// 0 for an ephemeral port
    pub source_port: u16,

    pub payload_size: usize,
    /// Probes without a reply after this time are counted as lost
    pub reply_timeout: Duration,

    pub compress: bool,
    pub log_dir: PathBuf,
    pub data_dir: PathBuf,

    pub send_interval: Duration,
    /// upper bound for a single receive attempt - this determines how often the receive loop
    ///  sweeps for expired probes and checks for termination
    pub receive_timeout: Duration,
    /// pause after a failed session before trying to start a new one
    pub restart_backoff: Duration,
    pub receiver_join_timeout: Duration,
    /// replies with an RTT above this are considered corrupt and discarded
    pub max_valid_rtt: Duration,

    pub data_rotation_interval: Duration,
    pub log_rotation_interval: Duration,
}

impl UdpPingConfig {
    pub fn new(instance_id: u32, destination: SocketAddr, interface: impl Into<String>) -> UdpPingConfig {
        UdpPingConfig {
            instance_id,
            destination,
            interface: interface.into(),
            source_port: 0,
            payload_size: 20,
            reply_timeout: Duration::from_secs(60),
            compress: true,
            log_dir: PathBuf::from("/nne/log"),
            data_dir: PathBuf::from("/nne/data"),
            send_interval: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(1),
            restart_backoff: Duration::from_secs(300),
            receiver_join_timeout: Duration::from_secs(5),
            max_valid_rtt: Duration::from_secs(300),
            data_rotation_interval: Duration::from_secs(15),
            log_rotation_interval: Duration::from_secs(86400),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.destination.port() == 0 {
            bail!("destination port must be in the range 1-65535");
        }
        if self.interface.is_empty() {
            bail!("interface name must not be empty");
        }
        if !(MIN_PAYLOAD_SIZE..=MAX_PAYLOAD_SIZE).contains(&self.payload_size) {
            bail!("payload size must be in the range {}-{}, was {}", MIN_PAYLOAD_SIZE, MAX_PAYLOAD_SIZE, self.payload_size);
        }
        if self.reply_timeout < Duration::from_secs(1) || self.reply_timeout > MAX_REPLY_TIMEOUT {
            bail!("reply timeout must be in the range 1-{}s, was {:?}", MAX_REPLY_TIMEOUT.as_secs(), self.reply_timeout);
        }
        if self.send_interval.is_zero() || self.receive_timeout.is_zero() {
            bail!("send interval and receive timeout must be positive");
        }
        Ok(())
    }

    pub fn operational_log_file(&self) -> PathBuf {
        self.log_dir.join(format!("uping_{}.log", self.instance_id))
    }

    pub fn data_log_file(&self) -> PathBuf {
        self.data_dir.join(format!("uping_{}.dat", self.instance_id))
    }
}


/// The fixed source port of a probing instance with a configured network ID, derived from
///  the node number
pub fn source_port(node_number: u32, network_id: u16) -> anyhow::Result<u16> {
    if network_id > MAX_NETWORK_ID {
        bail!("network identifier must be in the range 0-{}, was {}", MAX_NETWORK_ID, network_id);
    }

    let port = 10_000u64 + 10 * node_number as u64 + network_id as u64;
    match u16::try_from(port) {
        Ok(port) => Ok(port),
        Err(_) => bail!("node number {} and network identifier {} result in an invalid source port {}", node_number, network_id, port),
    }
}
