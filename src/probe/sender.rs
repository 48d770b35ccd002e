use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::select;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::probe::probe::{now_micros, Probe, SequenceNumber};
use crate::probe::request_table::RequestTable;
use crate::session::socket::{is_transient, ProbeSocket};

/// Sending state that outlives sessions: the next sequence number to use, and when the last send
///  attempt happened so that the cadence is kept across session restarts.
#[derive(Clone, Copy, Debug, Default)]
pub struct SendProgress {
    pub sequence_number: SequenceNumber,
    pub last_send: Option<Instant>,
}
impl SendProgress {
    /// The point in time before which no probe may be sent
    pub fn next_send_due(&self, send_interval: Duration) -> Option<Instant> {
        self.last_send.map(|t| t + send_interval)
    }
}


/// Sends one probe per `send_interval` on a connected socket, registering each probe in the
///  request table before it goes out.
pub struct Sender {
    request_table: Arc<RequestTable>,
    payload_size: usize,
    send_interval: Duration,
}
impl Sender {
    pub fn new(request_table: Arc<RequestTable>, payload_size: usize, send_interval: Duration) -> Sender {
        Sender {
            request_table,
            payload_size,
            send_interval,
        }
    }

    /// Runs until `stop` is cancelled. A failure to send terminates the loop with an error,
    ///  there is no retry here: the session as a whole is considered broken. Transient (ICMP
    ///  related) errors are the exception, they only skip the current cycle.
    ///
    /// `progress` is owned by the caller so that it survives session restarts. The first probe
    ///  goes out right away, the caller is responsible for waiting until it is due.
    pub async fn run(&self, socket: &dyn ProbeSocket, progress: &mut SendProgress, stop: &CancellationToken) -> anyhow::Result<()> {
        debug!("starting send loop");

        while !stop.is_cancelled() {
            let cycle_start = Instant::now();
            progress.last_send = Some(cycle_start);

            match self.send_probe(socket, progress.sequence_number).await {
                Ok(probe) => {
                    trace!(seq = probe.sequence_number.value(), "sent probe");
                    progress.sequence_number = progress.sequence_number.next();
                }
                Err(e) if e.downcast_ref::<std::io::Error>().is_some_and(is_transient) => {
                    // NB: the sequence number was not used, it goes out with the next probe
                    warn!("transient error sending probe: {:#}", e);
                }
                Err(e) => return Err(e),
            }

            // self-correcting cadence: processing time is subtracted from the pause
            select! {
                _ = sleep_until(cycle_start + self.send_interval) => {}
                _ = stop.cancelled() => {}
            }
        }

        debug!("send loop stopped");
        Ok(())
    }

    /// Sends a single probe. If sending fails, the probe is removed from the request table again
    ///  so that it does not show up as lost.
    pub async fn send_probe(&self, socket: &dyn ProbeSocket, sequence_number: SequenceNumber) -> anyhow::Result<Probe> {
        let probe = Probe::new(sequence_number, now_micros(), self.payload_size);

        self.request_table.insert(probe.payload.clone(), probe.send_timestamp_micros);
        if let Err(e) = socket.send(&probe.payload).await {
            self.request_table.remove(&probe.payload);
            return Err(e).with_context(|| format!("error sending probe {}", sequence_number.value()));
        }
        Ok(probe)
    }
}
