// runner.rs
// A Session shared between request handlers and the background tasks feeding it:
// the catalog fetch and the battle pacing loop. At most one task of each kind is
// live; starting a new one aborts the previous, and a superseded task can no
// longer touch the session.

use crate::app::{Action, Session};
use crate::battle;
use crate::error::AppError;
use crate::pokemon::PokemonRecord;
use rand::Rng;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;

struct Slot<R> {
    session: Session<R>,
    catalog_generation: u64,
    battle_generation: u64,
}

pub struct SharedSession<R> {
    slot: Arc<Mutex<Slot<R>>>,
    catalog_task: Mutex<Option<AbortHandle>>,
    battle_task: Mutex<Option<AbortHandle>>,
}

fn lock_slot<R>(slot: &Mutex<Slot<R>>) -> Option<MutexGuard<'_, Slot<R>>> {
    match slot.lock() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::error!("Session lock poisoned: {}", e);
            None
        }
    }
}

fn lock_task<'a>(
    task: &'a Mutex<Option<AbortHandle>>,
    kind: &str,
) -> Option<MutexGuard<'a, Option<AbortHandle>>> {
    match task.lock() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::error!("{} task handle lock poisoned: {}", kind, e);
            None
        }
    }
}

fn abort_previous(task: &mut Option<AbortHandle>, kind: &str) {
    if let Some(previous) = task.take() {
        previous.abort();
        tracing::debug!("Stopped previous {} task", kind);
    }
}

impl<R: Rng + Send + 'static> SharedSession<R> {
    pub fn new(session: Session<R>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                session,
                catalog_generation: 0,
                battle_generation: 0,
            })),
            catalog_task: Mutex::new(None),
            battle_task: Mutex::new(None),
        }
    }

    /// Runs `f` against the session. `None` if the lock is poisoned.
    pub fn with_session<T>(&self, f: impl FnOnce(&mut Session<R>) -> T) -> Option<T> {
        lock_slot(&*self.slot).map(|mut slot| f(&mut slot.session))
    }

    /// Spawns `fetch` and applies its result as `CatalogLoaded` or
    /// `CatalogFailed`. A later call supersedes an unfinished earlier one.
    pub fn load_catalog<F>(&self, fetch: F)
    where
        F: Future<Output = Result<Vec<PokemonRecord>, AppError>> + Send + 'static,
    {
        // Held until the new handle is stored so concurrent loads cannot
        // interleave their abort and replace steps.
        let Some(mut task) = lock_task(&self.catalog_task, "catalog") else {
            return;
        };
        let Some(generation) = lock_slot(&*self.slot).map(|mut slot| {
            slot.catalog_generation += 1;
            slot.catalog_generation
        }) else {
            return;
        };
        abort_previous(&mut task, "catalog");

        let target = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            let action = match fetch.await {
                Ok(records) => Action::CatalogLoaded(records),
                Err(e) => {
                    tracing::error!("Failed to fetch catalog: {}", e);
                    Action::CatalogFailed(e.to_string())
                }
            };
            if let Some(mut slot) = lock_slot(&*target) {
                if slot.catalog_generation == generation {
                    slot.session.dispatch(action);
                } else {
                    tracing::debug!("Discarding superseded catalog fetch #{}", generation);
                }
            }
        });
        *task = Some(handle.abort_handle());
    }

    /// Starts a battle for the selected Pokémon and paces it with one
    /// `BattleTick` per `turn_delay`. Returns `false`, leaving any running
    /// battle alone, when no battle could be started.
    pub fn start_battle(&self, turn_delay: Duration) -> bool {
        let Some(mut task) = lock_task(&self.battle_task, "battle") else {
            return false;
        };
        let generation = {
            let Some(mut slot) = lock_slot(&*self.slot) else {
                return false;
            };
            if !slot.session.dispatch(Action::StartRandomBattle) {
                return false;
            }
            slot.battle_generation += 1;
            slot.battle_generation
        };
        abort_previous(&mut task, "battle");

        let target = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            battle::drive(turn_delay, move || match lock_slot(&*target) {
                Some(mut slot) if slot.battle_generation == generation => {
                    slot.session.dispatch(Action::BattleTick);
                    slot.session.state().battle_in_progress()
                }
                _ => false,
            })
            .await;
        });
        *task = Some(handle.abort_handle());
        true
    }

    /// Stops the pacing task and discards the battle. Returns whether a battle
    /// was present.
    pub fn leave_battle(&self) -> bool {
        let Some(mut task) = lock_task(&self.battle_task, "battle") else {
            return false;
        };
        abort_previous(&mut task, "battle");
        lock_slot(&*self.slot).is_some_and(|mut slot| {
            slot.battle_generation += 1;
            slot.session.dispatch(Action::LeaveBattle)
        })
    }

    pub fn battle_task_running(&self) -> bool {
        lock_task(&self.battle_task, "battle")
            .is_some_and(|task| task.as_ref().is_some_and(|h| !h.is_finished()))
    }
}

impl<R> Drop for SharedSession<R> {
    fn drop(&mut self) {
        for task in [&self.catalog_task, &self.battle_task] {
            if let Ok(mut task) = task.lock() {
                if let Some(handle) = task.take() {
                    handle.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::favorites::FavoritesStore;
    use crate::pokemon::fixtures::mon;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn records() -> Vec<PokemonRecord> {
        vec![
            mon(4, "charmander", &["fire"], &[("hp", 39), ("attack", 52), ("speed", 65)]),
            mon(7, "squirtle", &["water"], &[("hp", 44), ("defense", 65), ("speed", 43)]),
            mon(1, "bulbasaur", &["grass"], &[("hp", 45), ("attack", 49), ("speed", 45)]),
        ]
    }

    fn shared() -> SharedSession<StdRng> {
        let mut session = Session::new(FavoritesStore::in_memory(), StdRng::seed_from_u64(5));
        session.dispatch(Action::CatalogLoaded(records()));
        session.dispatch(Action::Select("charmander".to_string()));
        SharedSession::new(session)
    }

    fn turns_played(shared: &SharedSession<StdRng>) -> Option<usize> {
        shared
            .with_session(|s| s.state().battle.as_ref().map(|b| b.turns().len()))
            .flatten()
    }

    #[tokio::test]
    async fn test_battle_runs_to_completion() {
        let shared = shared();
        assert!(shared.start_battle(Duration::ZERO));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let finished = shared
            .with_session(|s| s.state().battle.as_ref().map(|b| b.is_over()))
            .flatten();
        assert_eq!(finished, Some(true));
        assert!(!shared.battle_task_running());
    }

    #[tokio::test]
    async fn test_start_battle_without_selection_keeps_nothing_running() {
        let shared = shared();
        shared.with_session(|s| s.dispatch(Action::CloseDetail));
        assert!(!shared.start_battle(Duration::from_millis(10)));
        assert!(!shared.battle_task_running());
        assert_eq!(turns_played(&shared), None);
    }

    #[tokio::test]
    async fn test_leave_battle_stops_ticks() {
        let shared = shared();
        assert!(shared.start_battle(Duration::from_millis(20)));
        assert!(shared.battle_task_running());
        assert!(shared.leave_battle());
        assert!(!shared.battle_task_running());

        // A battle started outside the runner has no pacing task; nothing may
        // advance it.
        assert_eq!(shared.with_session(|s| s.dispatch(Action::StartRandomBattle)), Some(true));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(turns_played(&shared), Some(0));
    }

    #[tokio::test]
    async fn test_new_battle_aborts_previous_task() {
        let shared = shared();
        assert!(shared.start_battle(Duration::from_millis(10)));
        assert!(shared.start_battle(Duration::from_secs(10)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(turns_played(&shared), Some(0));
        assert!(shared.battle_task_running());
    }

    #[tokio::test]
    async fn test_later_catalog_load_wins() {
        let shared = shared();
        shared.load_catalog(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err(AppError::NetworkError("offline".to_string()))
        });
        shared.load_catalog(async { Ok(records()) });

        tokio::time::sleep(Duration::from_millis(200)).await;
        let (len, error) = shared
            .with_session(|s| (s.state().catalog.len(), s.state().error.clone()))
            .unwrap();
        assert_eq!(len, 3);
        assert_eq!(error, None);
    }

    #[tokio::test]
    async fn test_catalog_failure_is_reported() {
        let shared = shared();
        shared.load_catalog(async { Err(AppError::NetworkError("offline".to_string())) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let error = shared.with_session(|s| s.state().error.clone()).flatten();
        assert_eq!(error.as_deref(), Some("Network error: offline"));
    }

    #[tokio::test]
    async fn test_drop_stops_pacing() {
        let shared = shared();
        assert!(shared.start_battle(Duration::from_millis(10)));
        let slot = Arc::clone(&shared.slot);
        drop(shared);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let turns = slot
            .lock()
            .unwrap()
            .session
            .state()
            .battle
            .as_ref()
            .map(|b| b.turns().len());
        assert_eq!(turns, Some(0));
    }
}
