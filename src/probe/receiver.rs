use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tokio::select;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::UdpPingConfig;
use crate::probe::outcome::{Outcome, OutcomeRecord, OutcomeSink};
use crate::probe::probe::{format_micros_utc, now_micros, Probe, MAX_PAYLOAD_SIZE};
use crate::probe::request_table::RequestTable;
use crate::session::socket::{is_transient, ProbeSocket};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReceiverExit {
    Stopped,
    /// The socket failed in a way that requires a new session
    RestartRequested,
}


/// Consumes replies from the session's socket, turning them into Outcome Records, and detects
///  lost probes by sweeping the request table after every receive attempt.
///
/// NB: There is no separate timer for loss detection - a receive attempt is bounded by
///      `receive_timeout`, so the sweep happens at least that often.
pub struct Receiver {
    instance_id: u32,
    request_table: Arc<RequestTable>,
    sink: Arc<dyn OutcomeSink>,
    reply_timeout: Duration,
    receive_timeout: Duration,
    max_valid_rtt: Duration,
}
impl Receiver {
    pub fn new(config: &UdpPingConfig, request_table: Arc<RequestTable>, sink: Arc<dyn OutcomeSink>) -> Receiver {
        Receiver {
            instance_id: config.instance_id,
            request_table,
            sink,
            reply_timeout: config.reply_timeout,
            receive_timeout: config.receive_timeout,
            max_valid_rtt: config.max_valid_rtt,
        }
    }

    /// Runs until `stop` is cancelled or the socket fails. In the latter case, `stop` is
    ///  cancelled by the receiver to make the sender terminate as well.
    pub async fn run(self, socket: Arc<dyn ProbeSocket>, stop: CancellationToken) -> ReceiverExit {
        info!("starting receiver");

        let mut buf = vec![0u8; MAX_PAYLOAD_SIZE];
        let mut exit = ReceiverExit::Stopped;

        while !stop.is_cancelled() {
            let received = select! {
                r = timeout(self.receive_timeout, socket.recv(&mut buf)) => r,
                _ = stop.cancelled() => break,
            };

            match received {
                Err(_) => {
                    // receive timeout: nothing arrived during this cycle
                }
                Ok(Ok(len)) => {
                    self.on_reply(&buf[..len], now_micros());
                }
                Ok(Err(e)) if is_transient(&e) => {
                    warn!("transient error receiving reply: {}", e);
                }
                Ok(Err(e)) => {
                    error!("error receiving reply, requesting restart: {}", e);
                    exit = ReceiverExit::RestartRequested;
                    stop.cancel();
                }
            }

            self.expire_requests(now_micros());
        }

        debug!("receiver stopped: {:?}", exit);
        exit
    }

    /// Handles a single reply that arrived at `arrival_micros`. The payload is removed from the
    ///  request table whether or not the reply turns out to be valid.
    pub fn on_reply(&self, payload: &[u8], arrival_micros: u64) {
        let was_in_flight = self.request_table.remove(payload).is_some();

        match self.classify(payload, arrival_micros, was_in_flight) {
            Ok(record) => self.sink.record(&record),
            Err(e) => warn!("discarding reply {:?}: {}", String::from_utf8_lossy(payload), e),
        }
    }

    fn classify(&self, payload: &[u8], arrival_micros: u64, was_in_flight: bool) -> anyhow::Result<OutcomeRecord> {
        let probe = Probe::decode(payload)?;

        let rtt = match arrival_micros.checked_sub(probe.send_timestamp_micros) {
            Some(micros) => Duration::from_micros(micros),
            None => bail!("invalid RTT: reply arrived before it was sent"),
        };
        if rtt > self.max_valid_rtt {
            bail!("invalid RTT: {:?}", rtt);
        }

        if was_in_flight {
            trace!(seq = probe.sequence_number.value(), ?rtt, "received reply");
        }
        else {
            warn!("duplicate or expired, seq={} sent at {}", probe.sequence_number.value(), format_micros_utc(probe.send_timestamp_micros));
        }

        Ok(OutcomeRecord {
            send_timestamp_micros: probe.send_timestamp_micros,
            instance_id: self.instance_id,
            sequence_number: probe.sequence_number,
            outcome: Outcome::Received {
                rtt,
                duplicate_or_expired: !was_in_flight,
            },
        })
    }

    /// Removes all probes that have been waiting for a reply longer than the reply timeout,
    ///  recording each of them as lost
    pub fn expire_requests(&self, now_micros: u64) -> usize {
        self.request_table.expire(now_micros, self.reply_timeout, |payload, send_timestamp_micros| {
            match Probe::decode(payload) {
                Ok(probe) => {
                    debug!(seq = probe.sequence_number.value(), "probe lost");
                    self.sink.record(&OutcomeRecord {
                        send_timestamp_micros,
                        instance_id: self.instance_id,
                        sequence_number: probe.sequence_number,
                        outcome: Outcome::Lost,
                    });
                }
                Err(e) => {
                    error!("expired request table entry can not be decoded - this is a bug: {}", e);
                }
            }
        })
    }
}
