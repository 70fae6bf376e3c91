//! Division standings ranking
//!
//! Orders a division's memberships for position assignment and reports.
//! Ranking is pure and deterministic: the same memberships and matches always
//! produce the same order, so a re-run after a partial season close persists
//! identical positions.

use std::collections::{HashMap, HashSet};

use crate::types::{DivisionMembership, MatchRecord, MatchStatus, PlayerId};

/// Ranks division members by points, set difference and head-to-head record
#[derive(Debug, Default)]
pub struct StandingsRanker;

impl StandingsRanker {
    pub fn new() -> Self {
        Self
    }

    /// Rank memberships in final standings order, best first.
    ///
    /// Primary order is total points descending, then set difference
    /// descending, both via stable sorts over roster order. Members still
    /// tied after that form a group whose internal order is decided by wins
    /// in matches played between group members; matches against anyone
    /// outside the group do not count. Ties surviving head-to-head keep
    /// roster order.
    pub fn rank(
        &self,
        memberships: &[DivisionMembership],
        matches: &[MatchRecord],
    ) -> Vec<DivisionMembership> {
        let mut ranked: Vec<DivisionMembership> = memberships.to_vec();
        ranked.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then(b.set_diff().cmp(&a.set_diff()))
        });

        // Tied members are adjacent after the primary sort, so tie groups
        // are consecutive runs.
        let mut start = 0;
        while start < ranked.len() {
            let mut end = start + 1;
            while end < ranked.len() && Self::tied(&ranked[start], &ranked[end]) {
                end += 1;
            }
            if end - start >= 2 {
                Self::order_by_head_to_head(&mut ranked[start..end], matches);
            }
            start = end;
        }
        ranked
    }

    fn tied(a: &DivisionMembership, b: &DivisionMembership) -> bool {
        a.total_points == b.total_points && a.set_diff() == b.set_diff()
    }

    /// Stable-sort one tie group by wins against other members of the group
    fn order_by_head_to_head(group: &mut [DivisionMembership], matches: &[MatchRecord]) {
        let members: HashSet<PlayerId> = group.iter().map(|m| m.player_id).collect();
        let mut wins: HashMap<PlayerId, u32> = HashMap::new();
        for record in matches {
            if record.status != MatchStatus::Played {
                continue;
            }
            if !members.contains(&record.player_a) || !members.contains(&record.player_b) {
                continue;
            }
            if let Some(winner) = record.winner() {
                *wins.entry(winner).or_insert(0) += 1;
            }
        }
        group.sort_by(|a, b| {
            let wins_a = wins.get(&a.player_id).copied().unwrap_or(0);
            let wins_b = wins.get(&b.player_id).copied().unwrap_or(0);
            wins_b.cmp(&wins_a)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DivisionId;
    use crate::utils::{current_timestamp, generate_id};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn membership(
        division_id: DivisionId,
        player_id: PlayerId,
        points: u32,
        sets_won: u32,
        sets_lost: u32,
    ) -> DivisionMembership {
        DivisionMembership {
            id: generate_id(),
            division_id,
            player_id,
            total_points: points,
            total_sets_won: sets_won,
            total_sets_lost: sets_lost,
            rating_delta: Decimal::ZERO,
            position: None,
            created_at: current_timestamp(),
        }
    }

    fn played_match(
        division_id: DivisionId,
        winner: PlayerId,
        loser: PlayerId,
        sets_loser: u32,
    ) -> MatchRecord {
        MatchRecord {
            id: generate_id(),
            division_id,
            player_a: winner,
            player_b: loser,
            sets_a: 3,
            sets_b: sets_loser,
            status: MatchStatus::Played,
            submitted_by: Some(winner),
            played_at: Some(current_timestamp()),
            created_at: current_timestamp(),
        }
    }

    fn player_order(ranked: &[DivisionMembership]) -> Vec<PlayerId> {
        ranked.iter().map(|m| m.player_id).collect()
    }

    #[test]
    fn test_points_decide_first() {
        let division_id = generate_id();
        let (p1, p2, p3) = (generate_id(), generate_id(), generate_id());
        let memberships = vec![
            membership(division_id, p1, 3, 4, 6),
            membership(division_id, p2, 6, 9, 2),
            membership(division_id, p3, 4, 6, 5),
        ];

        let ranked = StandingsRanker::new().rank(&memberships, &[]);
        assert_eq!(player_order(&ranked), vec![p2, p3, p1]);
    }

    #[test]
    fn test_set_difference_breaks_points_tie() {
        let division_id = generate_id();
        let (p1, p2) = (generate_id(), generate_id());
        let memberships = vec![
            membership(division_id, p1, 5, 6, 6),
            membership(division_id, p2, 5, 7, 3),
        ];

        let ranked = StandingsRanker::new().rank(&memberships, &[]);
        assert_eq!(player_order(&ranked), vec![p2, p1]);
    }

    #[test]
    fn test_head_to_head_breaks_full_tie() {
        let division_id = generate_id();
        let (p1, p2, p3) = (generate_id(), generate_id(), generate_id());
        // Identical points and set difference for all three
        let memberships = vec![
            membership(division_id, p1, 4, 6, 3),
            membership(division_id, p2, 4, 6, 3),
            membership(division_id, p3, 4, 6, 3),
        ];
        // p3 beat both group members, p2 beat one
        let matches = vec![
            played_match(division_id, p3, p1, 1),
            played_match(division_id, p3, p2, 2),
            played_match(division_id, p2, p1, 0),
        ];

        let ranked = StandingsRanker::new().rank(&memberships, &matches);
        assert_eq!(player_order(&ranked), vec![p3, p2, p1]);
    }

    #[test]
    fn test_head_to_head_ignores_matches_outside_group() {
        let division_id = generate_id();
        let (p1, p2, outsider) = (generate_id(), generate_id(), generate_id());
        let memberships = vec![
            membership(division_id, p1, 4, 6, 3),
            membership(division_id, p2, 4, 6, 3),
            membership(division_id, outsider, 2, 3, 6),
        ];
        // p2's only win is against the outsider, so it does not count inside
        // the p1/p2 tie group and roster order decides.
        let matches = vec![played_match(division_id, p2, outsider, 0)];

        let ranked = StandingsRanker::new().rank(&memberships, &matches);
        assert_eq!(player_order(&ranked), vec![p1, p2, outsider]);
    }

    #[test]
    fn test_unresolved_tie_keeps_roster_order() {
        let division_id = generate_id();
        let (p1, p2, p3) = (generate_id(), generate_id(), generate_id());
        let memberships = vec![
            membership(division_id, p1, 2, 3, 3),
            membership(division_id, p2, 2, 3, 3),
            membership(division_id, p3, 2, 3, 3),
        ];

        let ranker = StandingsRanker::new();
        let ranked = ranker.rank(&memberships, &[]);
        assert_eq!(player_order(&ranked), vec![p1, p2, p3]);

        // Re-running produces the identical order
        let again = ranker.rank(&memberships, &[]);
        assert_eq!(player_order(&again), player_order(&ranked));
    }

    #[test]
    fn test_forfeits_do_not_count_for_head_to_head() {
        let division_id = generate_id();
        let (p1, p2) = (generate_id(), generate_id());
        let memberships = vec![
            membership(division_id, p1, 4, 6, 3),
            membership(division_id, p2, 4, 6, 3),
        ];
        // A forfeited fixture between the tied pair carries no winner
        let mut forfeit = played_match(division_id, p2, p1, 0);
        forfeit.status = MatchStatus::NotPlayed;
        forfeit.sets_a = 0;
        forfeit.sets_b = 0;
        forfeit.submitted_by = None;
        forfeit.played_at = None;

        let ranked = StandingsRanker::new().rank(&memberships, &[forfeit]);
        assert_eq!(player_order(&ranked), vec![p1, p2]);
    }

    #[test]
    fn test_empty_division() {
        let ranked = StandingsRanker::new().rank(&[], &[]);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_tie_groups_are_isolated() {
        let division_id = generate_id();
        let (p1, p2, p3, p4) = (generate_id(), generate_id(), generate_id(), generate_id());
        // Two separate tie groups: {p1, p2} on 6 points, {p3, p4} on 2 points
        let memberships = vec![
            membership(division_id, p1, 6, 9, 4),
            membership(division_id, p2, 6, 9, 4),
            membership(division_id, p3, 2, 4, 8),
            membership(division_id, p4, 2, 4, 8),
        ];
        // p4 beat p2; the win crosses group lines and must not reorder either
        // group. p2 beat p1 inside the top group.
        let matches = vec![
            played_match(division_id, p4, p2, 1),
            played_match(division_id, p2, p1, 2),
        ];

        let ranked = StandingsRanker::new().rank(&memberships, &matches);
        assert_eq!(player_order(&ranked), vec![p2, p1, p3, p4]);
    }

    /// Roster and played matches from generated stats; game indices outside
    /// the roster or pairing a player with themselves are dropped.
    fn generated_division(
        stats: &[(u32, u32, u32)],
        games: &[(usize, usize, u32)],
    ) -> (Vec<DivisionMembership>, Vec<MatchRecord>) {
        let division_id = generate_id();
        let memberships: Vec<DivisionMembership> = stats
            .iter()
            .map(|&(points, won, lost)| membership(division_id, generate_id(), points, won, lost))
            .collect();
        let matches: Vec<MatchRecord> = games
            .iter()
            .filter(|&&(a, b, _)| a < memberships.len() && b < memberships.len() && a != b)
            .map(|&(winner, loser, sets_loser)| {
                played_match(
                    division_id,
                    memberships[winner].player_id,
                    memberships[loser].player_id,
                    sets_loser,
                )
            })
            .collect();
        (memberships, matches)
    }

    proptest! {
        #[test]
        fn prop_rank_is_a_permutation_of_the_roster(
            stats in proptest::collection::vec((0u32..20, 0u32..30, 0u32..30), 0..12),
            games in proptest::collection::vec((0usize..12, 0usize..12, 0u32..3), 0..20),
        ) {
            let (memberships, matches) = generated_division(&stats, &games);
            let ranked = StandingsRanker::new().rank(&memberships, &matches);

            prop_assert_eq!(ranked.len(), memberships.len());
            let mut expected: Vec<PlayerId> =
                memberships.iter().map(|m| m.player_id).collect();
            let mut actual = player_order(&ranked);
            expected.sort();
            actual.sort();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn prop_points_then_set_diff_never_increase(
            stats in proptest::collection::vec((0u32..20, 0u32..30, 0u32..30), 2..12),
            games in proptest::collection::vec((0usize..12, 0usize..12, 0u32..3), 0..20),
        ) {
            // Head-to-head only reorders inside groups sharing both keys, so
            // the primary order must survive it.
            let (memberships, matches) = generated_division(&stats, &games);
            let ranked = StandingsRanker::new().rank(&memberships, &matches);

            for pair in ranked.windows(2) {
                let earlier = (pair[0].total_points, pair[0].set_diff());
                let later = (pair[1].total_points, pair[1].set_diff());
                prop_assert!(earlier >= later);
            }
        }

        #[test]
        fn prop_ranking_is_deterministic(
            stats in proptest::collection::vec((0u32..20, 0u32..30, 0u32..30), 0..12),
            games in proptest::collection::vec((0usize..12, 0usize..12, 0u32..3), 0..20),
        ) {
            let (memberships, matches) = generated_division(&stats, &games);
            let ranker = StandingsRanker::new();
            prop_assert_eq!(
                player_order(&ranker.rank(&memberships, &matches)),
                player_order(&ranker.rank(&memberships, &matches))
            );
        }
    }
}
