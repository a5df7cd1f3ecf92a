use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;

use crate::shardwire::cluster::BackendTable;
use crate::shardwire::common::{coarse_monotonic_now, Error, Result};

/// Shard-map lifecycle state (spec §3 Shard Map: "states {uninit, ready,
/// stale}"; invariant: "uninit → ready → stale → ready (rebuild); never
/// backward from ready to uninit").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardMapState {
    Uninit,
    Ready,
    Stale,
}

/// Per-user database-name → backend-index mapping (spec §3 "Shard Map").
/// Replaced atomically on refresh (copy-on-replace, spec §5), never mutated
/// in place after publication — callers that need to rebuild construct a new
/// `ShardMap`, populate it, then swap the `Arc` in [`ShardMapCache`].
#[derive(Debug)]
pub struct ShardMap {
    state: ShardMapState,
    entries: HashMap<String, usize>,
    last_updated: u32,
}

impl ShardMap {
    pub fn new() -> Self {
        ShardMap { state: ShardMapState::Uninit, entries: HashMap::new(), last_updated: 0 }
    }

    pub fn state(&self) -> ShardMapState {
        self.state
    }

    pub fn get(&self, db: &str) -> Option<usize> {
        self.entries.get(db).copied()
    }

    pub fn insert(&mut self, db: String, backend_index: usize) {
        self.entries.insert(db, backend_index);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &usize)> {
        self.entries.iter()
    }

    /// Transitions `uninit`/`stale` → `ready` and stamps the build time.
    pub fn publish(&mut self) {
        self.state = ShardMapState::Ready;
        self.last_updated = coarse_monotonic_now();
    }

    pub fn mark_stale(&mut self) {
        self.state = ShardMapState::Stale;
    }

    pub fn is_due_for_refresh(&self, refresh_interval_secs: u64) -> bool {
        match self.state {
            ShardMapState::Uninit => true,
            ShardMapState::Stale => true,
            ShardMapState::Ready => {
                coarse_monotonic_now().saturating_sub(self.last_updated) as u64 >= refresh_interval_secs
            }
        }
    }
}

impl Default for ShardMap {
    fn default() -> Self {
        ShardMap::new()
    }
}

/// Merges one discovered `(database, backend)` row into `shard_map` per the
/// conflict policy (spec §4.5 Conflict policy).
pub fn apply_discovered_database(
    shard_map: &mut ShardMap,
    cluster: &BackendTable,
    db: String,
    backend_index: usize,
    ignore_databases: &[String],
    ignore_databases_regex: Option<&Regex>,
    preferred_server: Option<&str>,
) -> Result<()> {
    let existing = match shard_map.get(&db) {
        None => {
            shard_map.insert(db, backend_index);
            return Ok(());
        }
        Some(existing) if existing == backend_index => return Ok(()),
        Some(existing) => existing,
    };

    let ignored = ignore_databases.iter().any(|d| d.eq_ignore_ascii_case(&db))
        || ignore_databases_regex.map_or(false, |re| re.is_match(&db));
    if ignored {
        return Ok(());
    }

    if let Some(preferred) = preferred_server {
        let existing_name = cluster.get(existing).map(|b| b.name.as_str());
        let new_name = cluster.get(backend_index).map(|b| b.name.as_str());
        if new_name == Some(preferred) {
            shard_map.insert(db, backend_index);
            return Ok(());
        }
        if existing_name == Some(preferred) {
            return Ok(());
        }
    }

    Err(Error::duplicate_database(db))
}

/// Per-user cache of shard maps (spec §3: "A per-user map is cached in the
/// router instance and shared across sessions of the same user after a full
/// build completes").
#[derive(Debug, Default)]
pub struct ShardMapCache {
    maps: RwLock<HashMap<String, Arc<RwLock<ShardMap>>>>,
}

impl ShardMapCache {
    pub fn new() -> Self {
        ShardMapCache { maps: RwLock::new(HashMap::new()) }
    }

    pub fn get_or_create(&self, user: &str) -> Result<Arc<RwLock<ShardMap>>> {
        if let Some(map) = self.maps.read()?.get(user) {
            return Ok(map.clone());
        }
        let mut maps = self.maps.write()?;
        Ok(maps.entry(user.to_string()).or_insert_with(|| Arc::new(RwLock::new(ShardMap::new()))).clone())
    }

    /// Copy-on-replace publish: swaps in a freshly built map for `user` (spec §5).
    pub fn replace(&self, user: &str, map: ShardMap) -> Result<()> {
        self.maps.write()?.insert(user.to_string(), Arc::new(RwLock::new(map)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shardwire::config::BackendConfig;

    fn table() -> BackendTable {
        let mut b1 = BackendConfig::default();
        b1.name = "b1".to_string();
        let mut b2 = BackendConfig::default();
        b2.name = "b2".to_string();
        BackendTable::from_configs(&[b1, b2])
    }

    #[test]
    fn first_discovery_wins_without_conflict() {
        let cluster = table();
        let mut map = ShardMap::new();
        apply_discovered_database(&mut map, &cluster, "shard_a".into(), 0, &[], None, None).unwrap();
        assert_eq!(map.get("shard_a"), Some(0));
    }

    #[test]
    fn conflict_without_tiebreaker_is_fatal() {
        let cluster = table();
        let mut map = ShardMap::new();
        apply_discovered_database(&mut map, &cluster, "shard_a".into(), 0, &[], None, None).unwrap();
        let err = apply_discovered_database(&mut map, &cluster, "shard_a".into(), 1, &[], None, None).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn ignored_database_drops_the_later_occurrence_silently() {
        let cluster = table();
        let mut map = ShardMap::new();
        apply_discovered_database(&mut map, &cluster, "information_schema".into(), 0, &["information_schema".into()], None, None).unwrap();
        apply_discovered_database(&mut map, &cluster, "information_schema".into(), 1, &["information_schema".into()], None, None).unwrap();
        assert_eq!(map.get("information_schema"), Some(0));
    }

    #[test]
    fn preferred_server_wins_the_conflict() {
        let cluster = table();
        let mut map = ShardMap::new();
        apply_discovered_database(&mut map, &cluster, "shard_a".into(), 0, &[], None, Some("b2")).unwrap();
        apply_discovered_database(&mut map, &cluster, "shard_a".into(), 1, &[], None, Some("b2")).unwrap();
        assert_eq!(map.get("shard_a"), Some(1));
    }
}
