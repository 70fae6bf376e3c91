//! Administrative league operations
//!
//! The registry is the manual management surface: registering and retiring
//! players, opening seasons and divisions out of band, assigning players and
//! reading the rating table. Everything here is thin glue over the store;
//! season close and rollover own the month-boundary bookkeeping.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{LeagueError, Result};
use crate::rating::formula;
use crate::store::LeagueStore;
use crate::types::{
    Division, DivisionId, DivisionMembership, Player, PlayerId, Season, SeasonId, SeasonStatus,
};
use crate::utils::{current_timestamp, generate_id, season_display_name};

/// Administrative operations over players, seasons and divisions
pub struct LeagueRegistry {
    store: Arc<dyn LeagueStore>,
}

impl LeagueRegistry {
    pub fn new(store: Arc<dyn LeagueStore>) -> Self {
        Self { store }
    }

    /// Register a new player with the starting rating
    pub fn register_player(
        &self,
        display_name: &str,
        contact_handle: &str,
        is_admin: bool,
    ) -> Result<Player> {
        let player = Player {
            id: generate_id(),
            display_name: display_name.to_string(),
            contact_handle: contact_handle.to_string(),
            rating: formula::initial_rating(),
            is_admin,
            is_active: true,
            created_at: current_timestamp(),
        };
        self.store.create_player(player.clone())?;
        info!("Registered player {} ({})", player.display_name, player.id);
        Ok(player)
    }

    /// Take a player out of circulation. Players are never deleted; their
    /// ratings and history stay on the books.
    pub fn deactivate_player(&self, player_id: &PlayerId) -> Result<Player> {
        let mut player = self.store.get_player(player_id)?.ok_or_else(|| {
            anyhow::Error::from(LeagueError::NotFound {
                message: format!("player {}", player_id),
            })
        })?;

        if player.is_active {
            player.is_active = false;
            self.store.update_player(player.clone())?;
            info!("Deactivated player {}", player.display_name);
        }
        Ok(player)
    }

    /// Open a brand new season. One season runs at a time, so this fails
    /// while another season is not yet closed.
    pub fn create_season(&self, year: i32, month: u32) -> Result<Season> {
        if !(1..=12).contains(&month) {
            return Err(LeagueError::InvalidSubmission {
                reason: format!("month must be 1-12, got {}", month),
            }
            .into());
        }

        if let Some(open) = self.store.current_season()? {
            return Err(LeagueError::InconsistentState {
                message: format!("season {} is still open", open.display_name),
            }
            .into());
        }

        let season = Season {
            id: generate_id(),
            year,
            month,
            display_name: season_display_name(year, month),
            status: SeasonStatus::Active,
            report_sent: false,
            created_at: current_timestamp(),
        };
        self.store.create_season(season.clone())?;
        info!("Created season {}", season.display_name);
        Ok(season)
    }

    /// Add a numbered division to a season with the default coefficient for
    /// that tier. Duplicate numbers within a season are rejected.
    pub fn add_division(&self, season_id: &SeasonId, number: u32) -> Result<Division> {
        if number == 0 {
            return Err(LeagueError::InvalidSubmission {
                reason: "division numbers start at 1".to_string(),
            }
            .into());
        }

        let season = self.store.get_season(season_id)?.ok_or_else(|| {
            anyhow::Error::from(LeagueError::NotFound {
                message: format!("season {}", season_id),
            })
        })?;
        if season.status == SeasonStatus::Closed {
            return Err(LeagueError::SeasonClosed {
                message: format!("season {} is closed", season.display_name),
            }
            .into());
        }

        let existing = self.store.divisions_for_season(season_id)?;
        if existing.iter().any(|division| division.number == number) {
            return Err(LeagueError::InconsistentState {
                message: format!(
                    "division {} already exists in {}",
                    number, season.display_name
                ),
            }
            .into());
        }

        let division = Division {
            id: generate_id(),
            season_id: *season_id,
            number,
            coef: formula::default_division_coef(number),
            created_at: current_timestamp(),
        };
        self.store.create_division(division.clone())?;
        info!("Added division {} to {}", number, season.display_name);
        Ok(division)
    }

    /// Put a player into a division with zeroed aggregates. Assigning the
    /// same player twice reports `false` and changes nothing.
    pub fn assign_player(&self, division_id: &DivisionId, player_id: &PlayerId) -> Result<bool> {
        let division = self.store.get_division(division_id)?.ok_or_else(|| {
            anyhow::Error::from(LeagueError::NotFound {
                message: format!("division {}", division_id),
            })
        })?;
        let player = self.store.get_player(player_id)?.ok_or_else(|| {
            anyhow::Error::from(LeagueError::NotFound {
                message: format!("player {}", player_id),
            })
        })?;

        let created = self.store.create_membership(DivisionMembership {
            id: generate_id(),
            division_id: *division_id,
            player_id: *player_id,
            total_points: 0,
            total_sets_won: 0,
            total_sets_lost: 0,
            rating_delta: Decimal::ZERO,
            position: None,
            created_at: current_timestamp(),
        })?;

        if created {
            info!(
                "Assigned {} to division {}",
                player.display_name, division.number
            );
        } else {
            debug!(
                "{} is already assigned to division {}",
                player.display_name, division.number
            );
        }
        Ok(created)
    }

    /// Active players ordered by rating, best first
    pub fn top_players(&self, limit: usize) -> Result<Vec<Player>> {
        let mut players: Vec<Player> = self
            .store
            .list_players()?
            .into_iter()
            .filter(|player| player.is_active)
            .collect();
        players.sort_by(|a, b| {
            b.rating
                .cmp(&a.rating)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        players.truncate(limit);
        Ok(players)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLeagueStore;

    fn registry() -> (Arc<InMemoryLeagueStore>, LeagueRegistry) {
        let store = Arc::new(InMemoryLeagueStore::new());
        let registry = LeagueRegistry::new(store.clone() as Arc<dyn LeagueStore>);
        (store, registry)
    }

    #[test]
    fn test_register_player_starts_at_initial_rating() {
        let (store, registry) = registry();

        let player = registry.register_player("ann", "@ann", false).unwrap();

        assert_eq!(player.rating, formula::initial_rating());
        assert!(player.is_active);
        assert!(!player.is_admin);
        let stored = store.get_player(&player.id).unwrap().unwrap();
        assert_eq!(stored.display_name, "ann");
        assert_eq!(stored.contact_handle, "@ann");
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let (store, registry) = registry();
        let player = registry.register_player("bob", "@bob", false).unwrap();

        registry.deactivate_player(&player.id).unwrap();
        let again = registry.deactivate_player(&player.id).unwrap();
        assert!(!again.is_active);
        assert!(!store.get_player(&player.id).unwrap().unwrap().is_active);

        let err = registry.deactivate_player(&generate_id()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeagueError>(),
            Some(LeagueError::NotFound { .. })
        ));
    }

    #[test]
    fn test_one_season_at_a_time() {
        let (store, registry) = registry();

        let august = registry.create_season(2026, 8).unwrap();
        assert_eq!(august.display_name, "August 2026");
        assert_eq!(august.status, SeasonStatus::Active);

        let err = registry.create_season(2026, 9).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeagueError>(),
            Some(LeagueError::InconsistentState { .. })
        ));

        store
            .update_season_status(&august.id, SeasonStatus::Closed)
            .unwrap();
        assert!(registry.create_season(2026, 9).is_ok());

        let err = registry.create_season(2026, 13).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeagueError>(),
            Some(LeagueError::InvalidSubmission { .. })
        ));
    }

    #[test]
    fn test_add_division_defaults_and_duplicates() {
        let (store, registry) = registry();
        let season = registry.create_season(2026, 8).unwrap();

        let top = registry.add_division(&season.id, 1).unwrap();
        assert_eq!(top.coef, Decimal::new(30, 2));
        let fourth = registry.add_division(&season.id, 4).unwrap();
        assert_eq!(fourth.coef, Decimal::new(22, 2));

        assert!(registry.add_division(&season.id, 1).is_err());
        assert!(registry.add_division(&season.id, 0).is_err());
        assert!(registry.add_division(&generate_id(), 2).is_err());

        store
            .update_season_status(&season.id, SeasonStatus::Closed)
            .unwrap();
        let err = registry.add_division(&season.id, 2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeagueError>(),
            Some(LeagueError::SeasonClosed { .. })
        ));
    }

    #[test]
    fn test_assign_player_tolerates_duplicates() {
        let (store, registry) = registry();
        let season = registry.create_season(2026, 8).unwrap();
        let division = registry.add_division(&season.id, 1).unwrap();
        let player = registry.register_player("cat", "@cat", false).unwrap();

        assert!(registry.assign_player(&division.id, &player.id).unwrap());
        assert!(!registry.assign_player(&division.id, &player.id).unwrap());

        let memberships = store.memberships_for_division(&division.id).unwrap();
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].total_points, 0);
        assert_eq!(memberships[0].rating_delta, Decimal::ZERO);
        assert_eq!(memberships[0].position, None);

        assert!(registry.assign_player(&generate_id(), &player.id).is_err());
        assert!(registry.assign_player(&division.id, &generate_id()).is_err());
    }

    #[test]
    fn test_top_players_orders_by_rating() {
        let (store, registry) = registry();
        let ann = registry.register_player("ann", "@ann", false).unwrap();
        let bob = registry.register_player("bob", "@bob", false).unwrap();
        let cat = registry.register_player("cat", "@cat", false).unwrap();

        for (player, rating) in [(&ann, Decimal::new(10820, 2)), (&bob, Decimal::new(9790, 2))] {
            let mut updated = store.get_player(&player.id).unwrap().unwrap();
            updated.rating = rating;
            store.update_player(updated).unwrap();
        }
        registry.deactivate_player(&cat.id).unwrap();

        let top = registry.top_players(5).unwrap();
        let names: Vec<&str> = top.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, vec!["ann", "bob"]);

        let top_one = registry.top_players(1).unwrap();
        assert_eq!(top_one.len(), 1);
        assert_eq!(top_one[0].display_name, "ann");
    }
}
