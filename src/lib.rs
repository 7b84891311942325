pub mod app;
pub mod battle;
pub mod catalog;
pub mod config;
pub mod error;
pub mod favorites;
pub mod fetcher;
pub mod pokemon;
pub mod quiz;
pub mod runner;

pub use app::{Action, AppState, DetailView, Session};
pub use battle::{Battle, Outcome, Phase, Side, TurnEvent};
pub use catalog::{CatalogQuery, CatalogStore, SortOption};
pub use config::*;
pub use error::AppError;
pub use favorites::{
    FavoriteRecord, FavoritesBackend, FavoritesStore, InMemoryFavorites, JsonFileFavorites,
};
pub use fetcher::PokemonClient;
pub use pokemon::PokemonRecord;
pub use quiz::QuizState;
pub use runner::SharedSession;
