use crate::shardwire::cluster::BackendTable;
use crate::shardwire::config::BackendConfig;
use crate::shardwire::session::ClientSession;

pub fn cluster(names: &[&str]) -> BackendTable {
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

/// A session with one reference per backend in `cluster`, `master_backend`
/// selected as the master ref.
pub fn session_with_refs(cluster: &BackendTable, master_backend: usize) -> ClientSession {
    let mut s = ClientSession::new(0, false);
    for i in 0..cluster.len() {
        let idx = s.add_backend_ref(i).unwrap();
        s.backend_refs_mut()[idx].mark_in_use();
        if i == master_backend {
            s.set_master(idx);
        }
    }
    s
}
