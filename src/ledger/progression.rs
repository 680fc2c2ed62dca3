use crate::ledger::{
    entry::LedgerEntry,
    intervals,
    ladder::{RoleLadder, RoleRank},
};
use chrono::{DateTime, Utc};
use serenity::all::UserId;

/// A single role change to ask Discord for: drop the rung the member holds,
/// grant the one above (or below, for demotions).
#[derive(Clone, Debug, PartialEq)]
pub struct RoleDelta {
    pub remove: RoleRank,
    pub add: RoleRank,
    /// How many thresholds this evaluation consumed. Zero for manual moves.
    pub crossed: usize,
}

/// The progression state machine: reacts to connect/disconnect transitions,
/// accumulates session time, and decides when a member has earned the next
/// rung of the ladder.
///
/// Everything here works on value snapshots; callers apply the returned
/// [`RoleDelta`] against Discord and persist the entry themselves. Ledger
/// bookkeeping is deliberately not rolled back when the platform-side role
/// mutation fails, which can drift until the next recalculation.
#[derive(Clone, Copy, Debug)]
pub struct Progression {
    pub first_threshold_minutes: f64,
    pub final_threshold_minutes: f64,
}

impl Progression {
    /// Thresholds for every role strictly above `rank`.
    pub fn thresholds(&self, ladder: &RoleLadder, rank: usize) -> Vec<f64> {
        intervals::thresholds_above(
            self.first_threshold_minutes,
            self.final_threshold_minutes,
            ladder.len(),
            rank,
        )
    }

    /// Start tracking a member first seen connecting to voice.
    pub fn track_new(
        &self,
        member_id: UserId,
        display_name: String,
        ladder: &RoleLadder,
        observed: &RoleRank,
        now: DateTime<Utc>,
    ) -> LedgerEntry {
        let rank = ladder.rank_of(observed.id).unwrap_or(0);
        LedgerEntry::new(
            member_id,
            display_name,
            observed.id,
            self.thresholds(ladder, rank),
            now,
        )
    }

    /// `DISCONNECTED -> CONNECTED` for an already-tracked member: open the
    /// session, refresh the observed rank, then check whether time banked in
    /// earlier sessions has already earned a promotion.
    pub fn on_connect(
        &self,
        entry: &mut LedgerEntry,
        ladder: &RoleLadder,
        observed: &RoleRank,
        now: DateTime<Utc>,
    ) -> Option<RoleDelta> {
        entry.open_session(now);
        entry.highest_role_id = observed.id;
        self.evaluate(entry, ladder)
    }

    /// `CONNECTED -> DISCONNECTED`: close the session and fold it into the
    /// total. Returns the session length in minutes (zero for a malformed
    /// session).
    pub fn on_disconnect(&self, entry: &mut LedgerEntry, now: DateTime<Utc>) -> f64 {
        entry.close_session(now)
    }

    /// Count the leading thresholds the member's total has passed. If any
    /// were passed, consume them all and advance the member exactly one
    /// rank. A second evaluation with no new elapsed time is a no-op.
    pub fn evaluate(&self, entry: &mut LedgerEntry, ladder: &RoleLadder) -> Option<RoleDelta> {
        let crossed = entry.crossed_count();
        if crossed == 0 {
            return None;
        }

        let rank = ladder.rank_of(entry.highest_role_id)?;
        let current = ladder.get(rank)?.clone();
        // Already at the top; nothing to grant, keep the bookkeeping as-is.
        let target = ladder.get(rank + 1)?.clone();

        entry.remove_crossed(crossed);
        entry.highest_role_id = target.id;

        Some(RoleDelta {
            remove: current,
            add: target,
            crossed,
        })
    }

    /// Force the member one rank up and recompute their thresholds from the
    /// new rank. `None` when they already hold the top rank.
    pub fn promote_one(&self, entry: &mut LedgerEntry, ladder: &RoleLadder) -> Option<RoleDelta> {
        let rank = ladder.rank_of(entry.highest_role_id)?;
        let current = ladder.get(rank)?.clone();
        let target = ladder.get(rank + 1)?.clone();

        entry.highest_role_id = target.id;
        entry.expected_intervals = self.thresholds(ladder, rank + 1);

        Some(RoleDelta {
            remove: current,
            add: target,
            crossed: 0,
        })
    }

    /// Force the member one rank down and recompute their thresholds from the
    /// new rank. Only allowed while strictly above the bottom rank.
    pub fn demote_one(&self, entry: &mut LedgerEntry, ladder: &RoleLadder) -> Option<RoleDelta> {
        let rank = ladder.rank_of(entry.highest_role_id)?;
        if rank == 0 {
            return None;
        }
        let current = ladder.get(rank)?.clone();
        let target = ladder.get(rank - 1)?.clone();

        entry.highest_role_id = target.id;
        entry.expected_intervals = self.thresholds(ladder, rank - 1);

        Some(RoleDelta {
            remove: current,
            add: target,
            crossed: 0,
        })
    }

    /// Rebuild the member's thresholds from scratch for their current rank.
    pub fn recalculate(&self, entry: &mut LedgerEntry, ladder: &RoleLadder) {
        let rank = ladder.rank_of(entry.highest_role_id).unwrap_or(0);
        entry.expected_intervals = self.thresholds(ladder, rank);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ladder::tests::ladder;
    use chrono::TimeZone;
    use serenity::all::RoleId;

    const RULES: Progression = Progression {
        first_threshold_minutes: 12000.0,
        final_threshold_minutes: 200000.0,
    };

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn tracked(rank_role: u64, intervals: Vec<f64>, total: f64) -> LedgerEntry {
        let mut entry = LedgerEntry::new(
            UserId::new(42),
            "piper".to_string(),
            RoleId::new(rank_role),
            intervals,
            at(0),
        );
        entry.total_minutes_connected = total;
        entry
    }

    #[test]
    fn crossing_one_threshold_moves_one_rank() {
        let l = ladder(&["everyone", "recruit", "regular", "veteran"]);
        let mut entry = tracked(1, vec![12000.0, 50000.0, 200000.0], 15000.0);

        let delta = RULES.evaluate(&mut entry, &l).unwrap();
        assert_eq!(delta.remove.name, "everyone");
        assert_eq!(delta.add.name, "recruit");
        assert_eq!(delta.crossed, 1);
        assert_eq!(entry.expected_intervals, vec![50000.0, 200000.0]);
        assert_eq!(entry.highest_role_id, RoleId::new(2));
    }

    #[test]
    fn crossing_many_thresholds_still_moves_one_rank() {
        let l = ladder(&["everyone", "recruit", "regular", "veteran"]);
        let mut entry = tracked(1, vec![12000.0, 50000.0, 200000.0], 60000.0);

        let delta = RULES.evaluate(&mut entry, &l).unwrap();
        assert_eq!(delta.crossed, 2);
        assert_eq!(delta.add.name, "recruit");
        assert_eq!(entry.expected_intervals, vec![200000.0]);
    }

    #[test]
    fn evaluation_is_idempotent_without_new_time() {
        let l = ladder(&["everyone", "recruit", "regular"]);
        let mut entry = tracked(1, vec![100.0, 900.0], 500.0);

        assert!(RULES.evaluate(&mut entry, &l).is_some());
        assert!(RULES.evaluate(&mut entry, &l).is_none());
    }

    #[test]
    fn no_threshold_crossed_is_a_noop() {
        let l = ladder(&["everyone", "recruit"]);
        let mut entry = tracked(1, vec![12000.0], 11999.0);
        assert!(RULES.evaluate(&mut entry, &l).is_none());
        assert_eq!(entry.expected_intervals, vec![12000.0]);
    }

    #[test]
    fn promotion_at_top_rank_is_rejected_without_mutation() {
        let l = ladder(&["everyone", "recruit"]);
        let mut entry = tracked(2, vec![], 99999.0);

        assert!(RULES.promote_one(&mut entry, &l).is_none());
        assert_eq!(entry.highest_role_id, RoleId::new(2));
        assert!(entry.expected_intervals.is_empty());
    }

    #[test]
    fn demotion_at_bottom_rank_is_rejected_without_mutation() {
        let l = ladder(&["everyone", "recruit"]);
        let mut entry = tracked(1, vec![12000.0], 0.0);

        assert!(RULES.demote_one(&mut entry, &l).is_none());
        assert_eq!(entry.highest_role_id, RoleId::new(1));
        assert_eq!(entry.expected_intervals, vec![12000.0]);
    }

    #[test]
    fn demotion_above_bottom_rank_moves_down_and_recomputes() {
        let l = ladder(&["everyone", "recruit", "regular"]);
        let mut entry = tracked(3, vec![], 0.0);

        let delta = RULES.demote_one(&mut entry, &l).unwrap();
        assert_eq!(delta.remove.name, "regular");
        assert_eq!(delta.add.name, "recruit");
        assert_eq!(entry.highest_role_id, RoleId::new(2));
        // One role remains above the new rank.
        assert_eq!(entry.expected_intervals.len(), 1);
    }

    #[test]
    fn manual_promotion_recomputes_thresholds_for_the_new_rank() {
        let l = ladder(&["everyone", "recruit", "regular", "veteran"]);
        let mut entry = tracked(1, vec![1.0, 2.0, 3.0], 0.0);

        let delta = RULES.promote_one(&mut entry, &l).unwrap();
        assert_eq!(delta.add.name, "recruit");
        assert_eq!(entry.expected_intervals.len(), 2);
        for pair in entry.expected_intervals.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn connect_then_disconnect_accumulates_and_promotes_on_rejoin() {
        let l = ladder(&["everyone", "recruit"]);
        let observed = l.get(0).unwrap().clone();
        let mut entry =
            RULES.track_new(UserId::new(9), "quinn".to_string(), &l, &observed, at(0));
        assert_eq!(entry.expected_intervals.len(), 1);

        // Bank enough time to pass the only threshold.
        entry.total_minutes_connected = RULES.first_threshold_minutes + 1.0;
        let minutes = RULES.on_disconnect(&mut entry, at(2));
        assert_eq!(minutes, 120.0);

        let delta = RULES.on_connect(&mut entry, &l, &observed, at(3)).unwrap();
        assert_eq!(delta.add.name, "recruit");
        assert!(entry.expected_intervals.is_empty());
    }

    #[test]
    fn evaluation_at_top_rank_keeps_bookkeeping_intact() {
        let l = ladder(&["everyone", "recruit"]);
        // Stale thresholds below the total, but no rung left to grant.
        let mut entry = tracked(2, vec![100.0], 5000.0);

        assert!(RULES.evaluate(&mut entry, &l).is_none());
        assert_eq!(entry.expected_intervals, vec![100.0]);
    }
}
