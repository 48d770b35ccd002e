use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::error;

/// The set of probes that were sent and neither matched by a reply nor expired yet, mapping
///  each probe's payload to its send timestamp (microseconds since epoch).
///
/// The table is shared between sender and receiver. Every operation is a single critical
///  section, so a probe can never be both matched and expired, or expired twice.
#[derive(Default)]
pub struct RequestTable {
    entries: Mutex<FxHashMap<Bytes, u64>>,
}
impl RequestTable {
    pub fn new() -> RequestTable {
        Default::default()
    }

    pub fn insert(&self, payload: Bytes, send_timestamp_micros: u64) {
        self.lock().insert(payload, send_timestamp_micros);
    }

    /// Removes a payload, returning its send timestamp if it was still in flight
    pub fn remove(&self, payload: &[u8]) -> Option<u64> {
        self.lock().remove(payload)
    }

    pub fn contains(&self, payload: &[u8]) -> bool {
        self.lock().contains_key(payload)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes all entries that are older than `timeout` at `now_micros`, calling `on_expired`
    ///  for each of them while still holding the lock. Returns the number of expired entries.
    pub fn expire(&self, now_micros: u64, timeout: Duration, mut on_expired: impl FnMut(&Bytes, u64)) -> usize {
        let timeout_micros = timeout.as_micros() as u64;

        let mut entries = self.lock();
        let expired = entries.iter()
            .filter(|&(_, &sent)| now_micros.saturating_sub(sent) > timeout_micros)
            .map(|(payload, _)| payload.clone())
            .collect::<Vec<_>>();

        for payload in &expired {
            if let Some(sent) = entries.remove(payload) {
                on_expired(payload, sent);
            }
        }
        expired.len()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<Bytes, u64>> {
        // A panic while holding the lock can not leave the map itself in an inconsistent
        //  state, so there is no reason to stop measuring
        self.entries.lock()
            .unwrap_or_else(|poisoned| {
                error!("request table lock was poisoned - continuing");
                poisoned.into_inner()
            })
    }
}


#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn payload(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_insert_remove() {
        let table = RequestTable::new();
        table.insert(payload("1 100"), 100);
        table.insert(payload("2 200"), 200);

        assert_eq!(table.len(), 2);
        assert!(table.contains(b"1 100"));

        assert_eq!(table.remove(b"1 100"), Some(100));
        assert_eq!(table.remove(b"1 100"), None);
        assert!(!table.contains(b"1 100"));
        assert_eq!(table.len(), 1);
    }

    #[rstest]
    #[case::nothing_expired(1_000_000, vec![])]
    #[case::exactly_at_timeout(1_100_000, vec![])]
    #[case::first_expired(1_100_001, vec!["1 100000"])]
    #[case::all_expired(5_000_000, vec!["1 100000", "2 600000"])]
    fn test_expire(#[case] now: u64, #[case] expected: Vec<&str>) {
        let table = RequestTable::new();
        table.insert(payload("1 100000"), 100_000);
        table.insert(payload("2 600000"), 600_000);

        let mut expired = Vec::new();
        let num_expired = table.expire(now, Duration::from_secs(1), |p, _| expired.push(p.clone()));
        expired.sort();

        let expected = expected.into_iter().map(payload).collect::<Vec<_>>();
        assert_eq!(expired, expected);
        assert_eq!(num_expired, expected.len());
        assert_eq!(table.len(), 2 - expected.len());
        for p in &expected {
            assert!(!table.contains(p));
        }
    }

    #[test]
    fn test_expire_only_once() {
        let table = RequestTable::new();
        table.insert(payload("6 0"), 0);

        let mut count = 0;
        table.expire(61_000_000, Duration::from_secs(60), |_, _| count += 1);
        table.expire(62_000_000, Duration::from_secs(60), |_, _| count += 1);
        assert_eq!(count, 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_timestamps_in_the_future_do_not_expire() {
        let table = RequestTable::new();
        table.insert(payload("1 9000000"), 9_000_000);

        assert_eq!(table.expire(1_000_000, Duration::from_secs(1), |_, _| {}), 0);
        assert_eq!(table.len(), 1);
    }
}
