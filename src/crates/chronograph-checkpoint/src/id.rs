//! Time-ordered checkpoint identifiers
//!
//! Checkpoint ids are UUID-shaped strings whose upper 64 bits hold a
//! microsecond timestamp and whose lower 64 bits are random. Because the
//! hyphenated lowercase form is fixed-width hex, comparing ids as strings
//! compares them by creation time, which lets storage backends order and
//! filter with plain string comparison (`ORDER BY checkpoint_id DESC`).
//!
//! Within one process ids are strictly increasing even when the wall clock
//! stalls or steps backwards.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Checkpoint ID type
pub type CheckpointId = String;

static LAST_MICROS: AtomicU64 = AtomicU64::new(0);

fn next_tick() -> u64 {
    let now = Utc::now().timestamp_micros().max(0) as u64;
    let mut last = LAST_MICROS.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_MICROS.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return candidate,
            Err(observed) => last = observed,
        }
    }
}

/// Generate a fresh checkpoint id, greater than every id previously
/// generated in this process.
pub fn new_checkpoint_id() -> CheckpointId {
    let high = next_tick() as u128;
    let low = Uuid::new_v4().as_u128() as u64 as u128;
    Uuid::from_u128((high << 64) | low).hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_strictly_increase() {
        let ids: Vec<_> = (0..1000).map(|_| new_checkpoint_id()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| new_checkpoint_id()).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_id_is_uuid_shaped() {
        let id = new_checkpoint_id();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(id.len(), 36);
    }
}
