use regex::Regex;

use crate::shardwire::cluster::BackendTable;
use crate::shardwire::common::{Error, Result};
use crate::shardwire::qc::TypeMask;
use crate::shardwire::router::shard_map::ShardMap;
use crate::shardwire::router::target::RouteHints;
use crate::shardwire::session::ClientSession;

/// What a classified statement intercepted by the schema router answers
/// directly, without touching any backend (spec §4.5 Interception).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intercepted {
    ShowShards,
    ShowDatabases,
}

/// The resolved target for one statement under the schema router (spec §4.5
/// Routing). Distinct from [`crate::shardwire::router::target::RouteTarget`]
/// because the SR always names a single backend (or `Any`/`All`), never a
/// MASTER/SLAVE role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrTarget {
    All,
    /// First healthy backend; used for statements with no shard affinity.
    Any,
    Backend(usize),
    Intercepted(Intercepted),
}

/// Intercepts `SHOW SHARDS` / `SHOW DATABASES` before any routing decision
/// is made (spec §4.5 Interception; §6 "Special SQL interception surfaces").
pub fn intercept(statement: &str) -> Option<Intercepted> {
    let trimmed = statement.trim_start();
    if trimmed.eq_ignore_ascii_case("SHOW SHARDS") || trimmed.eq_ignore_ascii_case("SHOW SHARDS;") {
        return Some(Intercepted::ShowShards);
    }
    if trimmed.eq_ignore_ascii_case("SHOW DATABASES") || trimmed.eq_ignore_ascii_case("SHOW DATABASES;") {
        return Some(Intercepted::ShowDatabases);
    }
    None
}

/// `SHOW SHARDS` reply rows: `(database, backend_name)` pairs (spec §4.5,
/// §8 scenario S6).
pub fn show_shards_rows(shard_map: &ShardMap, cluster: &BackendTable) -> Vec<(String, String)> {
    let mut rows: Vec<(String, String)> = shard_map
        .iter()
        .filter_map(|(db, &idx)| cluster.get(idx).map(|b| (db.clone(), b.name.clone())))
        .collect();
    rows.sort();
    rows
}

/// `SHOW DATABASES` reply rows: every database whose mapped backend is
/// running (spec §4.5 Interception).
pub fn show_databases_rows(shard_map: &ShardMap, cluster: &BackendTable) -> Vec<String> {
    let mut rows: Vec<String> = shard_map
        .iter()
        .filter(|(_, &idx)| cluster.get(idx).map_or(false, |b| b.is_running()))
        .map(|(db, _)| db.clone())
        .collect();
    rows.sort();
    rows
}

/// Routing rules 1-6 (spec §4.5 Routing). `referenced_dbs` and
/// `referenced_tables` come from the classifier (spec §4.1).
pub fn compute_target(
    mask: TypeMask,
    referenced_dbs: &[String],
    referenced_tables: &[String],
    session: &ClientSession,
    cluster: &BackendTable,
    shard_map: &ShardMap,
    hints: &RouteHints,
) -> Result<SrTarget> {
    // Rule 1. `USE <db>` also carries SESSION_WRITE, but unlike a generic
    // session-state mutation it names a single shard (the design notes'
    // worked example routes it to the owning backend, not to every
    // backend): only send to ALL when no database is named alongside it.
    let is_use_statement = mask.contains(TypeMask::SESSION_WRITE)
        && !mask.intersects(
            TypeMask::PREPARE_STMT | TypeMask::PREPARE_NAMED_STMT | TypeMask::ENABLE_AUTOCOMMIT | TypeMask::DISABLE_AUTOCOMMIT | TypeMask::GSYSVAR_WRITE,
        )
        && !referenced_dbs.is_empty();
    if !is_use_statement
        && mask.intersects(
            TypeMask::SESSION_WRITE
                | TypeMask::PREPARE_STMT
                | TypeMask::PREPARE_NAMED_STMT
                | TypeMask::ENABLE_AUTOCOMMIT
                | TypeMask::DISABLE_AUTOCOMMIT
                | TypeMask::GSYSVAR_WRITE,
        )
    {
        return Ok(SrTarget::All);
    }

    // Rule 2.
    if mask.intersects(TypeMask::SYSVAR_READ | TypeMask::GSYSVAR_READ) {
        return Ok(SrTarget::Any);
    }

    // Rule 3.
    if !referenced_dbs.is_empty() {
        let mut owners: Vec<usize> = referenced_dbs.iter().filter_map(|db| shard_map.get(db)).collect();
        owners.sort_unstable();
        owners.dedup();
        match owners.len() {
            1 => return Ok(SrTarget::Backend(owners[0])),
            n if n > 1 => return Err(Error::cross_shard(referenced_dbs.join(", "))),
            _ => {} // none of the referenced databases are mapped yet; fall through
        }
    }

    // Rule 4.
    if referenced_dbs.is_empty() && !referenced_tables.is_empty() {
        if let Some(current_db) = &session.current_db {
            if let Some(idx) = shard_map.get(current_db) {
                return Ok(SrTarget::Backend(idx));
            }
        }
    }

    // Rule 5.
    if let Some(name) = &hints.named_server {
        if let Some(idx) = session
            .backend_refs()
            .iter()
            .find(|r| !r.is_closed() && cluster.get(r.backend_index).map_or(false, |b| &b.name == name))
            .map(|r| r.backend_index)
        {
            return Ok(SrTarget::Backend(idx));
        }
    }

    // Rule 6.
    session
        .backend_refs()
        .iter()
        .find(|r| !r.is_closed() && cluster.get(r.backend_index).map_or(false, |b| b.is_running()))
        .map(|r| SrTarget::Backend(r.backend_index))
        .ok_or_else(Error::no_usable_backend)
}

pub fn compile_ignore_regex(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern.map(|p| Regex::new(p).map_err(|e| Error::new(e.to_string()))).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shardwire::config::BackendConfig;

    fn cluster_with(names: &[&str]) -> BackendTable {
        let configs: Vec<BackendConfig> = names
            .iter()
            .map(|n| {
                let mut c = BackendConfig::default();
                c.name = n.to_string();
                c
            })
            .collect();
        BackendTable::from_configs(&configs)
    }

    fn session_with_refs(cluster: &BackendTable) -> ClientSession {
        let mut s = ClientSession::new(0, false);
        for i in 0..cluster.len() {
            let idx = s.add_backend_ref(i).unwrap();
            s.backend_refs_mut()[idx].mark_in_use();
        }
        s
    }

    #[test]
    fn show_shards_is_intercepted() {
        assert_eq!(intercept("  show shards"), Some(Intercepted::ShowShards));
        assert_eq!(intercept("SELECT 1"), None);
    }

    #[test]
    fn single_db_reference_routes_to_its_backend() {
        let cluster = cluster_with(&["b1", "b2"]);
        let session = session_with_refs(&cluster);
        let mut map = ShardMap::new();
        map.insert("shard_b".into(), 1);
        let target = compute_target(
            TypeMask::READ,
            &["shard_b".to_string()],
            &[],
            &session,
            &cluster,
            &map,
            &RouteHints::default(),
        )
        .unwrap();
        assert_eq!(target, SrTarget::Backend(1));
    }

    #[test]
    fn two_backend_reference_is_cross_shard_error() {
        let cluster = cluster_with(&["b1", "b2"]);
        let session = session_with_refs(&cluster);
        let mut map = ShardMap::new();
        map.insert("shard_a".into(), 0);
        map.insert("shard_b".into(), 1);
        let err = compute_target(
            TypeMask::READ,
            &["shard_a".to_string(), "shard_b".to_string()],
            &[],
            &session,
            &cluster,
            &map,
            &RouteHints::default(),
        )
        .unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn unqualified_table_uses_current_db() {
        let cluster = cluster_with(&["b1", "b2"]);
        let mut session = session_with_refs(&cluster);
        session.current_db = Some("shard_b".to_string());
        let mut map = ShardMap::new();
        map.insert("shard_b".into(), 1);
        let target = compute_target(
            TypeMask::READ,
            &[],
            &["customers".to_string()],
            &session,
            &cluster,
            &map,
            &RouteHints::default(),
        )
        .unwrap();
        assert_eq!(target, SrTarget::Backend(1));
    }

    #[test]
    fn session_write_targets_all() {
        let cluster = cluster_with(&["b1"]);
        let session = session_with_refs(&cluster);
        let map = ShardMap::new();
        let target =
            compute_target(TypeMask::SESSION_WRITE, &[], &[], &session, &cluster, &map, &RouteHints::default()).unwrap();
        assert_eq!(target, SrTarget::All);
    }
}
