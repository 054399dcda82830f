//! Round arithmetic (spec.md §4.1): mapping wall time to round numbers and
//! deriving the canonical per-round message every honest node signs.

use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};

use crate::group::GroupDescriptor;

/// Largest round `r` with `genesis_time + r*period <= now`, and the
/// instant round `r+1` is scheduled. Ties resolve to the round that just
/// ticked: at exactly `genesis_time + r*period`, round `r` is current.
pub fn round_at(genesis_time: u64, period: Duration, now: SystemTime) -> (u64, SystemTime) {
    let genesis = SystemTime::UNIX_EPOCH + Duration::from_secs(genesis_time);
    if now < genesis {
        return (0, genesis + period);
    }
    let elapsed = now.duration_since(genesis).unwrap_or_default();
    let round = (elapsed.as_secs_f64() / period.as_secs_f64()).floor() as u64;
    let next_tick = genesis + period * (round as u32 + 1);
    (round, next_tick)
}

/// The wall-clock instant round `round` is scheduled at.
pub fn round_time(genesis_time: u64, period: Duration, round: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(genesis_time) + period * round as u32
}

/// Deterministic per-round message every honest node derives identically:
/// `SHA-256(previous_rand || round_be64)`. This is what partial signatures
/// are computed over, which is what makes them aggregatable.
pub fn message(previous_rand: &[u8], round: u64) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(previous_rand);
    hasher.update(round.to_be_bytes());
    hasher.finalize().to_vec()
}

/// Rejects a group whose schedule can't be driven: delegates to
/// [`GroupDescriptor::verify_schedule`], kept as a free function so the
/// driver can call it without naming the type explicitly.
pub fn verify_schedule(group: &GroupDescriptor) -> crate::Result<()> {
    group.verify_schedule()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_at_ticks_on_boundary() {
        let genesis = 1_000;
        let period = Duration::from_secs(10);
        // Exactly at round 3's tick: round 3 is current, not round 2.
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_030);
        let (round, next_tick) = round_at(genesis, period, now);
        assert_eq!(round, 3);
        assert_eq!(next_tick, SystemTime::UNIX_EPOCH + Duration::from_secs(1_040));
    }

    #[test]
    fn round_at_mid_period() {
        let genesis = 1_000;
        let period = Duration::from_secs(10);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_035);
        let (round, _) = round_at(genesis, period, now);
        assert_eq!(round, 3);
    }

    #[test]
    fn round_at_before_genesis() {
        let genesis = 1_000;
        let period = Duration::from_secs(10);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(500);
        let (round, _) = round_at(genesis, period, now);
        assert_eq!(round, 0);
    }

    #[test]
    fn message_is_deterministic() {
        let a = message(b"seed", 1);
        let b = message(b"seed", 1);
        assert_eq!(a, b);
        let c = message(b"seed", 2);
        assert_ne!(a, c);
    }

    #[test]
    fn round_time_round_trips_with_round_at() {
        let genesis = 1_000;
        let period = Duration::from_secs(10);
        let t = round_time(genesis, period, 5);
        let (round, _) = round_at(genesis, period, t);
        assert_eq!(round, 5);
    }
}
