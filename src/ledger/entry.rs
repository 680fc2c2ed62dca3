use chrono::{DateTime, Utc};
use serenity::all::{RoleId, UserId};

/// Per-member record of cumulative voice-channel time and progression state.
///
/// `total_minutes_connected` is the single source of truth for how long the
/// member has been present; it only ever grows. `expected_intervals` holds the
/// ascending cumulative-minute thresholds still ahead of the member, one per
/// role above their current rank, and is drained from the front as thresholds
/// are crossed.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LedgerEntry {
    pub member_id: UserId,
    /// Cached label for humans; never used for identity.
    pub display_name: String,
    pub highest_role_id: RoleId,
    /// Start of the currently open session; `None` while disconnected.
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    /// Start of the previous completed session, for inspection only.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Duration of the previous completed session, in minutes.
    pub last_connected_minutes: Option<f64>,
    pub expected_intervals: Vec<f64>,
    pub total_minutes_connected: f64,
}

impl LedgerEntry {
    pub fn new(
        member_id: UserId,
        display_name: String,
        highest_role_id: RoleId,
        expected_intervals: Vec<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            member_id,
            display_name,
            highest_role_id,
            connected_at: Some(now),
            disconnected_at: None,
            last_connected_at: None,
            last_connected_minutes: None,
            expected_intervals,
            total_minutes_connected: 0.0,
        }
    }

    /// Start a session. If a session was already open (e.g. the disconnect was
    /// never observed), its start moves to `last_connected_at` unchanged; the
    /// lost time is not guessed at.
    pub fn open_session(&mut self, now: DateTime<Utc>) {
        if let Some(previous) = self.connected_at {
            self.last_connected_at = Some(previous);
        }
        self.connected_at = Some(now);
    }

    /// Close the open session and fold its duration into the total.
    ///
    /// A disconnect without a matching connect, or one that predates its
    /// connect, counts as a zero-length session rather than an error.
    /// Returns the session length in minutes.
    pub fn close_session(&mut self, now: DateTime<Utc>) -> f64 {
        self.disconnected_at = Some(now);

        let minutes = match self.connected_at {
            Some(start) if now >= start => (now - start).num_seconds() as f64 / 60.0,
            _ => 0.0,
        };

        self.total_minutes_connected += minutes;
        self.last_connected_minutes = Some(minutes);
        if let Some(start) = self.connected_at.take() {
            self.last_connected_at = Some(start);
        }

        minutes
    }

    /// Whether an open session exists whose start does not postdate `now`.
    /// False means a disconnect observed now would count as malformed.
    pub fn session_open(&self, now: DateTime<Utc>) -> bool {
        self.connected_at.is_some_and(|start| start <= now)
    }

    /// Operator repair for a session whose disconnect was never observed:
    /// restart the open session at `now`. The lost time is not credited.
    pub fn reset_session_start(&mut self, now: DateTime<Utc>) {
        self.connected_at = Some(now);
    }

    /// How many leading thresholds the accumulated total has passed.
    pub fn crossed_count(&self) -> usize {
        self.expected_intervals
            .iter()
            .take_while(|threshold| **threshold < self.total_minutes_connected)
            .count()
    }

    /// Drop the first `count` thresholds, keeping the remainder in order.
    pub fn remove_crossed(&mut self, count: usize) {
        let count = count.min(self.expected_intervals.len());
        self.expected_intervals.drain(..count);
    }

    /// Minutes still needed to reach the next threshold. `None` when no
    /// threshold remains.
    pub fn minutes_to_next(&self) -> Option<f64> {
        self.expected_intervals
            .first()
            .map(|threshold| threshold - self.total_minutes_connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    fn entry() -> LedgerEntry {
        LedgerEntry::new(
            UserId::new(42),
            "piper".to_string(),
            RoleId::new(7),
            vec![100.0, 500.0],
            at(0),
        )
    }

    #[test]
    fn session_duration_accumulates_in_minutes() {
        let mut e = entry();
        let minutes = e.close_session(at(30));
        assert_eq!(minutes, 30.0);
        assert_eq!(e.total_minutes_connected, 30.0);
        assert_eq!(e.last_connected_minutes, Some(30.0));
        assert_eq!(e.last_connected_at, Some(at(0)));
        assert_eq!(e.connected_at, None);
    }

    #[test]
    fn disconnect_without_connect_counts_zero() {
        let mut e = entry();
        e.connected_at = None;
        let minutes = e.close_session(at(30));
        assert_eq!(minutes, 0.0);
        assert_eq!(e.total_minutes_connected, 0.0);
    }

    #[test]
    fn disconnect_before_connect_counts_zero() {
        let mut e = entry();
        e.connected_at = Some(at(30));
        let minutes = e.close_session(at(10));
        assert_eq!(minutes, 0.0);
        assert_eq!(e.total_minutes_connected, 0.0);
    }

    #[test]
    fn rejoin_stashes_previous_session_start() {
        let mut e = entry();
        e.close_session(at(10));
        e.open_session(at(20));
        assert_eq!(e.connected_at, Some(at(20)));
        assert_eq!(e.last_connected_at, Some(at(0)));
    }

    #[test]
    fn missed_disconnect_does_not_invent_time() {
        let mut e = entry();
        // Second join without an observed leave.
        e.open_session(at(20));
        assert_eq!(e.last_connected_at, Some(at(0)));
        assert_eq!(e.total_minutes_connected, 0.0);
    }

    #[test]
    fn crossed_count_is_strict() {
        let mut e = entry();
        e.total_minutes_connected = 100.0;
        assert_eq!(e.crossed_count(), 0);
        e.total_minutes_connected = 100.1;
        assert_eq!(e.crossed_count(), 1);
        e.total_minutes_connected = 600.0;
        assert_eq!(e.crossed_count(), 2);
    }

    #[test]
    fn session_open_requires_a_usable_start() {
        let mut e = entry();
        assert!(e.session_open(at(30)));
        // Start in the future means the timestamps are not usable.
        assert!(!e.session_open(at(0) - chrono::Duration::minutes(1)));
        e.connected_at = None;
        assert!(!e.session_open(at(30)));
    }

    #[test]
    fn reset_session_start_drops_time_before_the_reset() {
        let mut e = entry();
        e.reset_session_start(at(30));
        let minutes = e.close_session(at(40));
        assert_eq!(minutes, 10.0);
        assert_eq!(e.total_minutes_connected, 10.0);
        assert_eq!(e.last_connected_at, Some(at(30)));
    }

    #[test]
    fn json_round_trip_is_field_for_field_equal() {
        let mut e = entry();
        e.close_session(at(45));
        let json = serde_json::to_string(&e).unwrap();
        let back: LedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(e, back);
    }

    #[test]
    fn absent_optionals_serialize_as_null() {
        let e = entry();
        let json: serde_json::Value = serde_json::to_value(&e).unwrap();
        assert!(json["disconnected_at"].is_null());
        assert!(json["last_connected_minutes"].is_null());
    }
}
