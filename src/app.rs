// app.rs
// Application state and the actions that transform it. A front end applies
// actions through Session::dispatch and renders from Session::state.

use crate::battle::Battle;
use crate::catalog::{CatalogQuery, CatalogStore, SortOption};
use crate::favorites::FavoritesStore;
use crate::pokemon::PokemonRecord;
use crate::quiz::QuizState;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DetailView {
    pub record: PokemonRecord,
    pub is_favorite: bool,
}

#[derive(Debug, Default)]
pub struct AppState {
    pub catalog: CatalogStore,
    pub query: CatalogQuery,
    /// `catalog` after `query`, recomputed on every change to either.
    pub visible: Vec<PokemonRecord>,
    pub detail: Option<DetailView>,
    pub battle: Option<Battle>,
    pub quiz: Option<QuizState>,
    /// Non-fatal message for the user, e.g. a failed catalog fetch.
    pub error: Option<String>,
}

impl AppState {
    fn refresh_visible(&mut self) {
        self.visible = self.catalog.filter(&self.query);
    }

    pub fn battle_in_progress(&self) -> bool {
        self.battle.as_ref().is_some_and(|b| !b.is_over())
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    CatalogLoaded(Vec<PokemonRecord>),
    CatalogFailed(String),
    SetSearch(String),
    SetTypeFilter(String),
    SetSort(SortOption),
    SetQuery(CatalogQuery),
    Select(String),
    CloseDetail,
    ToggleFavorite,
    /// Battles the selected Pokémon against a random other catalog entry.
    StartRandomBattle,
    BattleTick,
    LeaveBattle,
    StartQuiz,
    SubmitGuess(String),
    NextQuiz,
}

/// Single-user session: state plus the collaborators actions need.
pub struct Session<R> {
    state: AppState,
    favorites: FavoritesStore,
    rng: R,
}

impl<R: Rng> Session<R> {
    pub fn new(favorites: FavoritesStore, rng: R) -> Self {
        Self {
            state: AppState::default(),
            favorites,
            rng,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }

    /// Applies `action`; returns whether the state changed.
    pub fn dispatch(&mut self, action: Action) -> bool {
        let state = &mut self.state;
        match action {
            Action::CatalogLoaded(records) => {
                state.catalog = CatalogStore::new(records);
                state.error = None;
                state.refresh_visible();
                true
            }
            Action::CatalogFailed(error) => {
                tracing::warn!("Catalog unavailable: {}", error);
                state.catalog = CatalogStore::default();
                state.error = Some(error);
                state.refresh_visible();
                true
            }
            Action::SetSearch(search) => {
                let query = CatalogQuery {
                    search,
                    ..state.query.clone()
                };
                set_query(state, query)
            }
            Action::SetTypeFilter(type_filter) => {
                let query = CatalogQuery {
                    type_filter,
                    ..state.query.clone()
                };
                set_query(state, query)
            }
            Action::SetSort(sort) => {
                let query = CatalogQuery {
                    sort,
                    ..state.query.clone()
                };
                set_query(state, query)
            }
            Action::SetQuery(query) => set_query(state, query),
            Action::Select(name) => match state.catalog.get(&name) {
                Some(record) => {
                    state.detail = Some(DetailView {
                        is_favorite: self.favorites.is_favorite(&record.name),
                        record: record.clone(),
                    });
                    true
                }
                None => {
                    tracing::debug!("Select ignored, {} is not in the catalog", name);
                    false
                }
            },
            Action::CloseDetail => state.detail.take().is_some(),
            Action::ToggleFavorite => match state.detail.as_mut() {
                Some(detail) => {
                    detail.is_favorite = self.favorites.toggle(&detail.record);
                    true
                }
                None => false,
            },
            Action::StartRandomBattle => {
                let Some(detail) = state.detail.as_ref() else {
                    return false;
                };
                let player = detail.record.clone();
                let Some(enemy) = state.catalog.random_excluding(&player.name, &mut self.rng) else {
                    return false;
                };
                state.battle = Some(Battle::new(player, enemy.clone()));
                true
            }
            Action::BattleTick => match state.battle.as_mut() {
                Some(battle) if !battle.is_over() => {
                    battle.step();
                    true
                }
                _ => false,
            },
            Action::LeaveBattle => state.battle.take().is_some(),
            Action::StartQuiz | Action::NextQuiz => {
                match QuizState::start_round(&state.catalog, &mut self.rng) {
                    Some(round) => {
                        state.quiz = Some(round);
                        true
                    }
                    None => false,
                }
            }
            Action::SubmitGuess(guess) => match state.quiz.as_mut() {
                Some(quiz) => {
                    quiz.submit_guess(&guess);
                    true
                }
                None => false,
            },
        }
    }
}

fn set_query(state: &mut AppState, query: CatalogQuery) -> bool {
    if state.query == query {
        return false;
    }
    state.query = query;
    state.refresh_visible();
    true
}
