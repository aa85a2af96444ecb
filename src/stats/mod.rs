//! Derived statistics over a game's event log.
//!
//! Everything here is a pure function of (players, events, today) and is
//! recomputed from scratch on every snapshot. At friend-group scale a full
//! recompute is O(events + players) and avoids incremental-update bugs.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{event, player};

/// How far back the on-time streak scan looks. A player with no late events
/// in the window (or none at all) shows a saturated streak.
pub const STREAK_WINDOW_DAYS: u32 = 365;

/// Per-player aggregate row for the leaderboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTotals {
    pub player_id: Uuid,
    pub name: String,
    pub late_count: u64,
    pub amount: f64,
    pub streak_days: u32,
}

/// Everything derived from one game's players + events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub total_pool: f64,
    pub leaderboard: Vec<PlayerTotals>,
}

/// Compute the full derived view for a game.
///
/// The leaderboard is sorted by contributed amount, descending. The sort is
/// stable, so tied players keep their input (creation) order.
#[must_use]
pub fn compute(players: &[player::Model], events: &[event::Model], today: NaiveDate) -> GameStats {
    let mut tally: HashMap<Uuid, (u64, f64)> =
        players.iter().map(|p| (p.id, (0, 0.0))).collect();
    let mut days_by_player: HashMap<Uuid, HashSet<NaiveDate>> = HashMap::new();

    for e in events {
        if let Some((count, amount)) = tally.get_mut(&e.player_id) {
            *count += 1;
            *amount += e.amount;
        }
        days_by_player
            .entry(e.player_id)
            .or_default()
            .insert(e.date_iso.date_naive());
    }

    let no_days = HashSet::new();
    let mut leaderboard: Vec<PlayerTotals> = players
        .iter()
        .map(|p| {
            let (late_count, amount) = tally.get(&p.id).copied().unwrap_or((0, 0.0));
            let event_days = days_by_player.get(&p.id).unwrap_or(&no_days);
            PlayerTotals {
                player_id: p.id,
                name: p.name.clone(),
                late_count,
                amount,
                streak_days: streak_days(event_days, today),
            }
        })
        .collect();

    leaderboard.sort_by(|a, b| {
        b.amount
            .partial_cmp(&a.amount)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    GameStats {
        total_pool: total_pool(events),
        leaderboard,
    }
}

/// Sum of all event amounts in the game, independent of ordering.
#[must_use]
pub fn total_pool(events: &[event::Model]) -> f64 {
    events.iter().map(|e| e.amount).sum()
}

/// Current on-time streak in days: scan backward from `today` (inclusive)
/// and stop at the first calendar day that has at least one event.
/// Saturates at [`STREAK_WINDOW_DAYS`].
#[must_use]
pub fn streak_days(event_days: &HashSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut days = 0;
    for offset in 0..STREAK_WINDOW_DAYS {
        let day = today - chrono::Duration::days(i64::from(offset));
        if event_days.contains(&day) {
            break;
        }
        days += 1;
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::prelude::DateTimeWithTimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    fn at_noon(day: NaiveDate) -> DateTimeWithTimeZone {
        day.and_hms_opt(12, 0, 0)
            .map_or_else(|| Utc::now().fixed_offset(), |dt| dt.and_utc().fixed_offset())
    }

    fn mk_player(name: &str) -> player::Model {
        player::Model {
            id: Uuid::new_v4(),
            game_id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now().fixed_offset(),
        }
    }

    fn mk_event(player: &player::Model, amount: f64, day: NaiveDate) -> event::Model {
        event::Model {
            id: Uuid::new_v4(),
            game_id: player.game_id,
            player_id: player.id,
            reason: "Late".to_string(),
            amount,
            date_iso: at_noon(day),
            created_at: at_noon(day),
        }
    }

    #[test]
    fn totals_count_events_and_sum_amounts() {
        let today = date(2026, 8, 5);
        let alice = mk_player("Alice");
        let bob = mk_player("Bob");
        let events = vec![
            mk_event(&alice, 10.0, date(2026, 8, 1)),
            mk_event(&alice, 5.0, date(2026, 8, 2)),
            mk_event(&bob, 15.0, date(2026, 8, 3)),
        ];

        let stats = compute(&[alice.clone(), bob.clone()], &events, today);

        let alice_row = stats
            .leaderboard
            .iter()
            .find(|t| t.player_id == alice.id)
            .map(|t| (t.late_count, t.amount));
        assert_eq!(alice_row, Some((2, 15.0)));

        let bob_row = stats
            .leaderboard
            .iter()
            .find(|t| t.player_id == bob.id)
            .map(|t| (t.late_count, t.amount));
        assert_eq!(bob_row, Some((1, 15.0)));
    }

    #[test]
    fn players_without_events_appear_with_zeroes() {
        let today = date(2026, 8, 5);
        let alice = mk_player("Alice");
        let stats = compute(&[alice.clone()], &[], today);

        assert_eq!(stats.leaderboard.len(), 1);
        assert_eq!(stats.leaderboard[0].late_count, 0);
        assert!(stats.leaderboard[0].amount.abs() < f64::EPSILON);
    }

    #[test]
    fn leaderboard_is_sorted_descending_by_amount() {
        let today = date(2026, 8, 5);
        let players: Vec<player::Model> =
            ["A", "B", "C", "D"].iter().map(|n| mk_player(n)).collect();
        let events = vec![
            mk_event(&players[0], 5.0, date(2026, 7, 1)),
            mk_event(&players[1], 40.0, date(2026, 7, 1)),
            mk_event(&players[2], 20.0, date(2026, 7, 1)),
        ];

        let stats = compute(&players, &events, today);

        for pair in stats.leaderboard.windows(2) {
            assert!(pair[0].amount >= pair[1].amount);
        }
    }

    #[test]
    fn tied_players_keep_creation_order() {
        let today = date(2026, 8, 5);
        let first = mk_player("First");
        let second = mk_player("Second");
        let events = vec![
            mk_event(&first, 10.0, date(2026, 7, 1)),
            mk_event(&second, 10.0, date(2026, 7, 2)),
        ];

        let stats = compute(&[first.clone(), second.clone()], &events, today);

        assert_eq!(stats.leaderboard[0].player_id, first.id);
        assert_eq!(stats.leaderboard[1].player_id, second.id);
    }

    #[test]
    fn total_pool_is_order_independent() {
        let alice = mk_player("Alice");
        let mut events = vec![
            mk_event(&alice, 10.0, date(2026, 8, 1)),
            mk_event(&alice, 15.0, date(2026, 8, 2)),
            mk_event(&alice, 2.5, date(2026, 8, 3)),
        ];
        let forward = total_pool(&events);
        events.reverse();
        let backward = total_pool(&events);

        assert!((forward - 27.5).abs() < f64::EPSILON);
        assert!((forward - backward).abs() < f64::EPSILON);
    }

    #[test]
    fn streak_saturates_with_no_events() {
        let today = date(2026, 8, 5);
        assert_eq!(streak_days(&HashSet::new(), today), STREAK_WINDOW_DAYS);
    }

    #[test]
    fn streak_is_zero_with_an_event_today() {
        let today = date(2026, 8, 5);
        let days: HashSet<NaiveDate> = [today].into_iter().collect();
        assert_eq!(streak_days(&days, today), 0);
    }

    #[test]
    fn streak_counts_days_since_most_recent_event() {
        let today = date(2026, 8, 5);
        let days: HashSet<NaiveDate> = [date(2026, 8, 2)].into_iter().collect();
        // Aug 5, 4, 3 are clean; Aug 2 ends the scan.
        assert_eq!(streak_days(&days, today), 3);
    }

    #[test]
    fn streak_ignores_events_outside_the_window() {
        let today = date(2026, 8, 5);
        let days: HashSet<NaiveDate> = [date(2024, 1, 1)].into_iter().collect();
        assert_eq!(streak_days(&days, today), STREAK_WINDOW_DAYS);
    }

    #[test]
    fn repeat_events_on_one_day_count_once_for_streaks() {
        let today = date(2026, 8, 5);
        let alice = mk_player("Alice");
        let events = vec![
            mk_event(&alice, 10.0, date(2026, 8, 4)),
            mk_event(&alice, 10.0, date(2026, 8, 4)),
        ];

        let stats = compute(&[alice.clone()], &events, today);

        assert_eq!(stats.leaderboard[0].late_count, 2);
        assert_eq!(stats.leaderboard[0].streak_days, 1);
    }
}
