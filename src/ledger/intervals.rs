//! Cumulative-minute thresholds for the role ladder.
//!
//! Thresholds are spaced geometrically between a configured minimum and
//! maximum, so early promotions come quickly and later ones take
//! progressively longer.

/// `count` points spaced geometrically between `start` and `stop` inclusive.
///
/// A single point degenerates to `start`; zero points yield an empty vec.
pub fn geometric_spacing(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let ratio = stop / start;
            (0..n)
                .map(|i| start * ratio.powf(i as f64 / (n - 1) as f64))
                .collect()
        }
    }
}

/// Thresholds a member at `rank` must cross, one per role strictly above
/// them on a ladder of `ladder_len` roles. The top rank gets an empty
/// sequence.
pub fn thresholds_above(
    first_threshold_minutes: f64,
    final_threshold_minutes: f64,
    ladder_len: usize,
    rank: usize,
) -> Vec<f64> {
    let remaining = ladder_len.saturating_sub(rank + 1);
    geometric_spacing(first_threshold_minutes, final_threshold_minutes, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: f64 = 200.0 * 60.0; // 200 hours
    const FINAL: f64 = 2.0 * 365.0 * 24.0 * 60.0; // 2 years

    #[test]
    fn one_threshold_per_role_above_current_rank() {
        for len in 1..8 {
            for rank in 0..len {
                let t = thresholds_above(FIRST, FINAL, len, rank);
                assert_eq!(t.len(), len - rank - 1, "len={} rank={}", len, rank);
            }
        }
    }

    #[test]
    fn thresholds_are_strictly_ascending() {
        let t = thresholds_above(FIRST, FINAL, 7, 0);
        for pair in t.windows(2) {
            assert!(pair[0] < pair[1], "{:?}", t);
        }
    }

    #[test]
    fn spans_configured_bounds() {
        let t = thresholds_above(FIRST, FINAL, 5, 0);
        assert_eq!(t.len(), 4);
        assert!((t[0] - FIRST).abs() < 1e-6);
        assert!((t[3] - FINAL).abs() < 1e-6);
    }

    #[test]
    fn top_rank_yields_empty_sequence() {
        assert!(thresholds_above(FIRST, FINAL, 5, 4).is_empty());
    }

    #[test]
    fn single_remaining_role_degenerates_to_the_minimum() {
        let t = thresholds_above(FIRST, FINAL, 5, 3);
        assert_eq!(t, vec![FIRST]);
    }
}
