//! Shared fixtures for the integration and load test suites
//!
//! Everything here goes through the public registry API, so tests start from
//! the same state an operator would build: registered players, one open
//! season and populated divisions.

use club_ladder::amqp::{MockNotifier, Notifier};
use club_ladder::league::{LeagueRegistry, MatchResultProcessor, SeasonLifecycle};
use club_ladder::store::{InMemoryLeagueStore, LeagueStore};
use club_ladder::types::{Division, Player, ResultSubmission, Season};
use club_ladder::utils::current_timestamp;
use std::sync::Arc;

/// A complete league wired against an in-memory store and a mock notifier
pub struct TestLeague {
    pub store: Arc<InMemoryLeagueStore>,
    pub processor: Arc<MatchResultProcessor>,
    pub lifecycle: Arc<SeasonLifecycle>,
    pub notifier: Arc<MockNotifier>,
    pub admin: Player,
    pub season: Season,
}

/// One division together with its members in registration order
pub struct DivisionRoster {
    pub division: Division,
    pub players: Vec<Player>,
}

/// Build a league with one admin, an open season for the given month and one
/// division per entry in `division_sizes`, each filled with that many players.
pub fn league_with_season(
    year: i32,
    month: u32,
    division_sizes: &[usize],
) -> (TestLeague, Vec<DivisionRoster>) {
    let store = Arc::new(InMemoryLeagueStore::new());
    let registry = LeagueRegistry::new(store.clone() as Arc<dyn LeagueStore>);

    let admin = registry.register_player("admin", "@admin", true).unwrap();
    let season = registry.create_season(year, month).unwrap();

    let mut rosters = Vec::new();
    for (index, &size) in division_sizes.iter().enumerate() {
        let number = index as u32 + 1;
        let division = registry.add_division(&season.id, number).unwrap();

        let mut players = Vec::new();
        for rank in 1..=size {
            let name = format!("d{}p{}", number, rank);
            let player = registry
                .register_player(&name, &format!("@{}", name), false)
                .unwrap();
            assert!(registry.assign_player(&division.id, &player.id).unwrap());
            players.push(player);
        }
        rosters.push(DivisionRoster { division, players });
    }

    let notifier = Arc::new(MockNotifier::new());
    let processor = Arc::new(MatchResultProcessor::new(
        store.clone() as Arc<dyn LeagueStore>
    ));
    let lifecycle = Arc::new(SeasonLifecycle::new(
        store.clone() as Arc<dyn LeagueStore>,
        notifier.clone() as Arc<dyn Notifier>,
    ));

    (
        TestLeague {
            store,
            processor,
            lifecycle,
            notifier,
            admin,
            season,
        },
        rosters,
    )
}

/// A submission from player `a`'s side with the given score
pub fn submission(
    roster: &DivisionRoster,
    a: &Player,
    b: &Player,
    sets_a: u32,
    sets_b: u32,
) -> ResultSubmission {
    ResultSubmission {
        division_id: roster.division.id,
        player_a: a.id,
        player_b: b.id,
        sets_a,
        sets_b,
        submitted_by: a.id,
        timestamp: current_timestamp(),
    }
}

/// Every unordered pair of the roster, first player listed first
pub fn round_robin(roster: &DivisionRoster) -> Vec<(Player, Player)> {
    let mut pairs = Vec::new();
    for (i, a) in roster.players.iter().enumerate() {
        for b in roster.players.iter().skip(i + 1) {
            pairs.push((a.clone(), b.clone()));
        }
    }
    pairs
}
