use std::sync::Arc;

use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::UdpPingConfig;
use crate::probe::outcome::OutcomeSink;
use crate::probe::receiver::{Receiver, ReceiverExit};
use crate::probe::request_table::RequestTable;
use crate::probe::sender::{SendProgress, Sender};
use crate::session::session::SessionOpener;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Starting,
    Running,
    Error,
    Stopping,
    Stopped,
}

#[derive(Debug, Eq, PartialEq)]
enum SessionEnd {
    Shutdown,
    RestartRequested,
}


/// Drives the probing sessions for one configured interface / destination: opens a session,
///  runs receiver and sender against it, and starts over on any failure until shutdown.
///
/// Errors while starting a session or while sending lead to a pause of `restart_backoff` before
///  the next attempt. A restart requested by the receiver is done as soon as the next probe is
///  due, so that restarts never push the send rate above one probe per `send_interval`.
///
/// The request table and the send progress outlive sessions, so probes that are in flight
///  when a session breaks down still get their Outcome Record.
pub struct SessionController {
    config: Arc<UdpPingConfig>,
    opener: Arc<dyn SessionOpener>,
    sink: Arc<dyn OutcomeSink>,
    request_table: Arc<RequestTable>,
    progress: SendProgress,
    shutdown: CancellationToken,
    state: SessionState,
}
impl SessionController {
    pub fn new(config: Arc<UdpPingConfig>, opener: Arc<dyn SessionOpener>, sink: Arc<dyn OutcomeSink>, shutdown: CancellationToken) -> SessionController {
        SessionController {
            config,
            opener,
            sink,
            request_table: Arc::new(RequestTable::new()),
            progress: SendProgress::default(),
            shutdown,
            state: SessionState::Stopped,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn request_table(&self) -> &Arc<RequestTable> {
        &self.request_table
    }

    pub fn progress(&self) -> &SendProgress {
        &self.progress
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("session state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Runs sessions until the shutdown token is cancelled
    pub async fn run(&mut self) {
        while !self.shutdown.is_cancelled() {
            self.set_state(SessionState::Starting);

            match self.run_session().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::RestartRequested) => {
                    info!("restarting session");
                }
                Err(e) => {
                    self.set_state(SessionState::Error);
                    error!("session failed, retrying in {:?}: {:#}", self.config.restart_backoff, e);

                    select! {
                        _ = sleep(self.config.restart_backoff) => {}
                        _ = self.shutdown.cancelled() => {}
                    }
                }
            }
        }

        self.set_state(SessionState::Stopping);
        info!("stopped probing {} with {} probes in flight", self.config.destination, self.request_table.len());
        self.set_state(SessionState::Stopped);
    }

    async fn run_session(&mut self) -> anyhow::Result<SessionEnd> {
        if let Some(due) = self.progress.next_send_due(self.config.send_interval) {
            select! {
                _ = sleep_until(due) => {}
                _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            }
        }

        let session = self.opener.open_session(&self.config)?;

        // NB: cancelling the session's token does not affect the global shutdown token
        let stop = self.shutdown.child_token();

        let receiver = Receiver::new(&self.config, self.request_table.clone(), self.sink.clone());
        let receiver_handle = tokio::spawn(receiver.run(session.socket.clone(), stop.clone()));

        self.set_state(SessionState::Running);
        let sender = Sender::new(self.request_table.clone(), self.config.payload_size, self.config.send_interval);
        let send_result = sender.run(session.socket.as_ref(), &mut self.progress, &stop).await;

        // the old receiver is torn down no matter how the session ended
        stop.cancel();
        self.join_receiver(receiver_handle).await;
        drop(session);

        send_result?;
        if self.shutdown.is_cancelled() {
            Ok(SessionEnd::Shutdown)
        }
        else {
            Ok(SessionEnd::RestartRequested)
        }
    }

    async fn join_receiver(&self, mut handle: JoinHandle<ReceiverExit>) {
        match timeout(self.config.receiver_join_timeout, &mut handle).await {
            Ok(Ok(exit)) => debug!("receiver terminated: {:?}", exit),
            Ok(Err(e)) => error!("receiver task failed: {}", e),
            Err(_) => {
                warn!("receiver did not terminate within {:?} - proceeding without it", self.config.receiver_join_timeout);
                handle.abort();
            }
        }
    }
}
