use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail};
use bytes::Bytes;
use chrono::{DateTime, Utc};

pub const MIN_PAYLOAD_SIZE: usize = 16;
pub const MAX_PAYLOAD_SIZE: usize = 2048;


/// Sequence number of a probe. It starts at 1 and wraps around to 1 after reaching the maximum
///  value, so it is never 0.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SequenceNumber(u64);
impl SequenceNumber {
    pub const MAX: SequenceNumber = SequenceNumber(u64::MAX);

    pub fn first() -> SequenceNumber {
        SequenceNumber(1)
    }

    pub fn new(value: u64) -> anyhow::Result<SequenceNumber> {
        if value == 0 {
            bail!("sequence number 0 is invalid");
        }
        Ok(SequenceNumber(value))
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn next(&self) -> SequenceNumber {
        if *self >= Self::MAX {
            SequenceNumber(1)
        }
        else {
            SequenceNumber(self.0 + 1)
        }
    }
}
impl Default for SequenceNumber {
    fn default() -> Self {
        Self::first()
    }
}


/// Microseconds since the Unix epoch, the resolution of send timestamps on the wire
pub fn now_micros() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_micros() as u64,
        // the system clock is set to before 1970 - nothing sensible to measure against
        Err(_) => 0,
    }
}

/// Human-readable UTC rendering of a microsecond timestamp, as it appears in Outcome Records
pub fn format_micros_utc(micros: u64) -> String {
    let secs = (micros / 1_000_000) as i64;
    let nanos = ((micros % 1_000_000) * 1000) as u32;
    match DateTime::<Utc>::from_timestamp(secs, nanos) {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        None => format!("@{}", micros),
    }
}


/// A single probe as it goes over the wire: sequence number and send timestamp (microseconds)
///  as decimal text, separated by a space and left-padded with spaces to the payload size.
///
/// The encoded bytes are the probe's identity: the request table is keyed by them, and a reply
///  matches a probe if and only if it echoes the identical bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Probe {
    pub sequence_number: SequenceNumber,
    pub send_timestamp_micros: u64,
    pub payload: Bytes,
}
impl Probe {
    pub fn new(sequence_number: SequenceNumber, send_timestamp_micros: u64, payload_size: usize) -> Probe {
        let identity = format!("{} {}", sequence_number.value(), send_timestamp_micros);
        // NB: identity strings longer than the payload size are sent unpadded rather than truncated
        let payload = format!("{:>width$}", identity, width = payload_size);

        Probe {
            sequence_number,
            send_timestamp_micros,
            payload: Bytes::from(payload),
        }
    }

    /// Parse a reply payload back into sequence number and send timestamp. Padding (leading or
    ///  trailing whitespace) is ignored.
    pub fn decode(payload: &[u8]) -> anyhow::Result<Probe> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| anyhow!("payload is not valid UTF-8"))?;

        let mut parts = text.split_whitespace();
        let (seq, timestamp) = match (parts.next(), parts.next(), parts.next()) {
            (Some(seq), Some(timestamp), None) => (seq, timestamp),
            _ => bail!("payload does not consist of sequence number and timestamp: {:?}", text),
        };

        let sequence_number = SequenceNumber::new(seq.parse()
            .map_err(|e| anyhow!("invalid sequence number {:?}: {}", seq, e))?)?;
        let send_timestamp_micros = timestamp.parse()
            .map_err(|e| anyhow!("invalid send timestamp {:?}: {}", timestamp, e))?;

        Ok(Probe {
            sequence_number,
            send_timestamp_micros,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}
