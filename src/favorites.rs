use crate::config::FavoritesConfig;
use crate::error::AppError;
use crate::pokemon::PokemonRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Persisted favorite flag plus enough of the record to display it offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    pub name: String,
    pub sprite_url: String,
    pub types: Vec<String>,
    pub stats: BTreeMap<String, u32>,
    pub is_favorite: bool,
}

impl FavoriteRecord {
    pub fn from_snapshot(snapshot: &PokemonRecord, is_favorite: bool) -> Self {
        Self {
            name: snapshot.name.clone(),
            sprite_url: snapshot.sprite_url.clone(),
            types: snapshot.types.clone(),
            stats: snapshot.stats.clone(),
            is_favorite,
        }
    }
}

// Key-value persistence for favorites, keyed by exact Pokémon name.
pub trait FavoritesBackend: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<FavoriteRecord>, AppError>;
    fn upsert(&self, record: FavoriteRecord) -> Result<(), AppError>;
    fn list(&self) -> Result<Vec<FavoriteRecord>, AppError>;
}

#[derive(Default)]
pub struct InMemoryFavorites {
    store: Mutex<HashMap<String, FavoriteRecord>>,
}

impl FavoritesBackend for InMemoryFavorites {
    fn get(&self, name: &str) -> Result<Option<FavoriteRecord>, AppError> {
        match self.store.lock() {
            Ok(store) => Ok(store.get(name).cloned()),
            Err(e) => {
                tracing::error!("Failed to acquire favorites read lock for {}: {}", name, e);
                Err(AppError::PersistenceError(e.to_string()))
            }
        }
    }

    fn upsert(&self, record: FavoriteRecord) -> Result<(), AppError> {
        match self.store.lock() {
            Ok(mut store) => {
                let name = record.name.clone();
                if store.insert(name.clone(), record).is_some() {
                    tracing::debug!("Updated favorite record: {}", name);
                } else {
                    tracing::debug!("Inserted favorite record: {}", name);
                }
                Ok(())
            }
            Err(e) => {
                let error_msg = format!("Failed to acquire favorites write lock: {}", e);
                tracing::error!("{}", error_msg);
                Err(AppError::PersistenceError(error_msg))
            }
        }
    }

    fn list(&self) -> Result<Vec<FavoriteRecord>, AppError> {
        match self.store.lock() {
            Ok(store) => Ok(store.values().cloned().collect()),
            Err(e) => Err(AppError::PersistenceError(e.to_string())),
        }
    }
}

/// Favorites kept in a JSON array on disk. The whole file is rewritten on
/// every upsert through a temporary sibling and a rename.
pub struct JsonFileFavorites {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileFavorites {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        tracing::info!("Favorites persisted to {}", path.display());
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Vec<FavoriteRecord>, AppError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                tracing::error!("Corrupt favorites file {}: {}", self.path.display(), e);
                AppError::from(e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => {
                tracing::error!("Failed to read favorites file {}: {}", self.path.display(), e);
                Err(AppError::from(e))
            }
        }
    }

    fn write_all(&self, records: &[FavoriteRecord]) -> Result<(), AppError> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            tracing::error!("Failed to replace favorites file {}: {}", self.path.display(), e);
            AppError::from(e)
        })
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, AppError> {
        self.lock
            .lock()
            .map_err(|e| AppError::PersistenceError(format!("favorites file lock: {}", e)))
    }
}

impl FavoritesBackend for JsonFileFavorites {
    fn get(&self, name: &str) -> Result<Option<FavoriteRecord>, AppError> {
        let _guard = self.guard()?;
        Ok(self.read_all()?.into_iter().find(|r| r.name == name))
    }

    fn upsert(&self, record: FavoriteRecord) -> Result<(), AppError> {
        let _guard = self.guard()?;
        let mut records = self.read_all()?;
        match records.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => {
                tracing::debug!("Updated favorite record: {}", record.name);
                *existing = record;
            }
            None => {
                tracing::debug!("Inserted favorite record: {}", record.name);
                records.push(record);
            }
        }
        self.write_all(&records)
    }

    fn list(&self) -> Result<Vec<FavoriteRecord>, AppError> {
        let _guard = self.guard()?;
        self.read_all()
    }
}

/// Upsert semantics over a backend. Backend failures never reach the caller:
/// they are logged and the operation degrades to a no-op (or `false`).
#[derive(Clone)]
pub struct FavoritesStore {
    backend: Arc<dyn FavoritesBackend>,
}

impl FavoritesStore {
    pub fn new(backend: Arc<dyn FavoritesBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryFavorites::default()))
    }

    pub fn from_config(config: &FavoritesConfig) -> Self {
        match config.r#type.as_str() {
            "file" => Self::new(Arc::new(JsonFileFavorites::new(config.path.clone()))),
            _ => Self::in_memory(),
        }
    }

    pub fn is_favorite(&self, name: &str) -> bool {
        match self.backend.get(name) {
            Ok(record) => record.map(|r| r.is_favorite).unwrap_or(false),
            Err(e) => {
                tracing::warn!("Could not read favorite status for {}: {}", name, e);
                false
            }
        }
    }

    pub fn set_favorite(&self, name: &str, value: bool, snapshot: &PokemonRecord) {
        let record = match self.backend.get(name) {
            Ok(Some(mut existing)) => {
                existing.is_favorite = value;
                existing
            }
            Ok(None) => {
                let mut created = FavoriteRecord::from_snapshot(snapshot, value);
                created.name = name.to_string();
                created
            }
            Err(e) => {
                tracing::warn!("Favorite for {} not saved: {}", name, e);
                return;
            }
        };

        if let Err(e) = self.backend.upsert(record) {
            tracing::warn!("Favorite for {} not saved: {}", name, e);
        }
    }

    /// Flips the flag for `snapshot` and returns the new value.
    pub fn toggle(&self, snapshot: &PokemonRecord) -> bool {
        let value = !self.is_favorite(&snapshot.name);
        self.set_favorite(&snapshot.name, value, snapshot);
        value
    }

    /// Records currently flagged as favorite, sorted by name.
    pub fn favorites(&self) -> Vec<FavoriteRecord> {
        match self.backend.list() {
            Ok(mut records) => {
                records.retain(|r| r.is_favorite);
                records.sort_by(|a, b| a.name.cmp(&b.name));
                records
            }
            Err(e) => {
                tracing::warn!("Could not list favorites: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pokemon::fixtures::mon;

    struct BrokenBackend;

    impl FavoritesBackend for BrokenBackend {
        fn get(&self, _name: &str) -> Result<Option<FavoriteRecord>, AppError> {
            Err(AppError::PersistenceError("disk on fire".to_string()))
        }
        fn upsert(&self, _record: FavoriteRecord) -> Result<(), AppError> {
            Err(AppError::PersistenceError("disk on fire".to_string()))
        }
        fn list(&self) -> Result<Vec<FavoriteRecord>, AppError> {
            Err(AppError::PersistenceError("disk on fire".to_string()))
        }
    }

    fn pikachu() -> PokemonRecord {
        mon(25, "pikachu", &["electric"], &[("hp", 35), ("attack", 55)])
    }

    #[test]
    fn test_missing_record_is_not_favorite() {
        let store = FavoritesStore::in_memory();
        assert!(!store.is_favorite("pikachu"));
    }

    #[test]
    fn test_set_favorite_is_idempotent() {
        let backend = Arc::new(InMemoryFavorites::default());
        let store = FavoritesStore::new(backend.clone());

        store.set_favorite("pikachu", true, &pikachu());
        store.set_favorite("pikachu", true, &pikachu());

        let records = backend.list().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_favorite);
        assert_eq!(records[0].sprite_url, "sprites/25.png");
        assert_eq!(records[0].stats.get("attack"), Some(&55));
    }

    #[test]
    fn test_unfavorite_keeps_record() {
        let backend = Arc::new(InMemoryFavorites::default());
        let store = FavoritesStore::new(backend.clone());

        store.set_favorite("pikachu", true, &pikachu());
        store.set_favorite("pikachu", false, &pikachu());

        assert!(!store.is_favorite("pikachu"));
        assert_eq!(backend.list().unwrap().len(), 1);
        assert!(store.favorites().is_empty());
    }

    #[test]
    fn test_update_in_place_keeps_original_snapshot() {
        let backend = Arc::new(InMemoryFavorites::default());
        let store = FavoritesStore::new(backend.clone());
        store.set_favorite("pikachu", true, &pikachu());

        let changed = mon(25, "pikachu", &["electric"], &[("attack", 99)]);
        store.set_favorite("pikachu", false, &changed);

        let record = backend.get("pikachu").unwrap().unwrap();
        assert!(!record.is_favorite);
        assert_eq!(record.stats.get("attack"), Some(&55));
    }

    #[test]
    fn test_toggle_flips() {
        let store = FavoritesStore::in_memory();
        assert!(store.toggle(&pikachu()));
        assert!(store.is_favorite("pikachu"));
        assert!(!store.toggle(&pikachu()));
        assert!(!store.is_favorite("pikachu"));
    }

    #[test]
    fn test_backend_failure_is_swallowed() {
        let store = FavoritesStore::new(Arc::new(BrokenBackend));
        store.set_favorite("pikachu", true, &pikachu());
        assert!(!store.is_favorite("pikachu"));
        assert!(store.favorites().is_empty());
    }

    #[test]
    fn test_favorites_sorted_by_name() {
        let store = FavoritesStore::in_memory();
        store.set_favorite("zubat", true, &mon(41, "zubat", &["poison"], &[]));
        store.set_favorite("abra", true, &mon(63, "abra", &["psychic"], &[]));
        store.set_favorite("pikachu", false, &pikachu());

        let names: Vec<String> = store.favorites().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["abra", "zubat"]);
    }

    #[test]
    fn test_file_backend_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");

        let store = FavoritesStore::new(Arc::new(JsonFileFavorites::new(&path)));
        store.set_favorite("pikachu", true, &pikachu());
        store.set_favorite("pikachu", true, &pikachu());

        let reopened = JsonFileFavorites::new(&path);
        let records = reopened.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], FavoriteRecord::from_snapshot(&pikachu(), true));
        assert!(FavoritesStore::new(Arc::new(reopened)).is_favorite("pikachu"));
    }

    #[test]
    fn test_file_backend_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileFavorites::new(dir.path().join("absent.json"));
        assert!(backend.list().unwrap().is_empty());
        assert!(backend.get("pikachu").unwrap().is_none());
    }

    #[test]
    fn test_file_backend_corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        std::fs::write(&path, b"{not json").unwrap();

        let backend = JsonFileFavorites::new(&path);
        assert!(matches!(backend.list(), Err(AppError::PersistenceError(_))));

        let store = FavoritesStore::new(Arc::new(backend));
        store.set_favorite("pikachu", true, &pikachu());
        // The corrupt file is left untouched.
        assert_eq!(std::fs::read(&path).unwrap(), b"{not json");
    }

    #[test]
    fn test_file_schema_field_names() {
        let json = serde_json::to_value(FavoriteRecord::from_snapshot(&pikachu(), true)).unwrap();
        for key in ["name", "sprite_url", "types", "stats", "is_favorite"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
