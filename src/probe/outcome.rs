use std::fmt::{Display, Formatter};
use std::time::Duration;

#[cfg(test)] use mockall::automock;

use crate::probe::probe::{format_micros_utc, SequenceNumber};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Outcome {
    /// A reply was received. `duplicate_or_expired` is set if the probe was no longer in flight,
    ///  i.e. it was already answered or had already been counted as lost.
    ///
    /// NB: Both cases are deliberately indistinguishable
    Received {
        rtt: Duration,
        duplicate_or_expired: bool,
    },
    Lost,
}
impl Outcome {
    pub fn error_flag(&self) -> u8 {
        match self {
            Outcome::Received { duplicate_or_expired: true, .. } => 1,
            _ => 0,
        }
    }
}


/// One line in the measurement log
#[derive(Clone, Debug, PartialEq)]
pub struct OutcomeRecord {
    pub send_timestamp_micros: u64,
    pub instance_id: u32,
    pub sequence_number: SequenceNumber,
    pub outcome: Outcome,
}

impl Display for OutcomeRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}\t{}\t",
               format_micros_utc(self.send_timestamp_micros),
               self.instance_id,
               self.sequence_number.value(),
        )?;
        match self.outcome {
            Outcome::Received { rtt, .. } => {
                write!(f, "<d e=\"{}\"><rtt>{:.6}</rtt></d>", self.outcome.error_flag(), rtt.as_secs_f64())
            }
            Outcome::Lost => {
                write!(f, "<d e=\"0\"/>")
            }
        }
    }
}


/// Destination of Outcome Records. Implementations must not block for long since they are
///  called from the receive loop.
#[cfg_attr(test, automock)]
pub trait OutcomeSink: Send + Sync {
    fn record(&self, record: &OutcomeRecord);
}
