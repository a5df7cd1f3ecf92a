use std::collections::VecDeque;

/// Replication tree/graph built from each server's `master_server_id` (spec
/// §4.6 step 5-6, §9 "replace deep pointer chasing with an adjacency list
/// keyed by server-id").
///
/// Every node has at most one outgoing edge (its one configured master), so
/// this is a functional graph: cycle detection reduces to walking each
/// node's parent chain once, which is Tarjan's algorithm specialized to
/// out-degree ≤ 1 rather than the general multi-edge case.
pub struct Topology {
    pub parent: Vec<Option<usize>>,
    pub children: Vec<Vec<usize>>,
    pub depth: Vec<u32>,
    /// `>= 0` for nodes that are part of a cycle (multi-primary ring); `-1` otherwise.
    pub cycle_id: Vec<i32>,
}

impl Topology {
    /// `master_ids[i] == 0` means "no configured master" (root candidate).
    pub fn build(server_ids: &[u64], master_ids: &[u64]) -> Self {
        let n = server_ids.len();
        let mut by_server_id = std::collections::HashMap::new();
        for (i, &id) in server_ids.iter().enumerate() {
            if id != 0 {
                by_server_id.insert(id, i);
            }
        }

        let parent: Vec<Option<usize>> = master_ids
            .iter()
            .map(|&mid| if mid == 0 { None } else { by_server_id.get(&mid).copied() })
            .collect();

        let mut children = vec![Vec::new(); n];
        for (i, p) in parent.iter().enumerate() {
            if let Some(p) = p {
                children[*p].push(i);
            }
        }

        let cycle_id = find_cycles(&parent);
        let depth = compute_depth(&parent, &children, &cycle_id);

        Topology { parent, children, depth, cycle_id }
    }

    pub fn has_cycles(&self) -> bool {
        self.cycle_id.iter().any(|&c| c >= 0)
    }

    pub fn is_root(&self, i: usize) -> bool {
        self.parent[i].is_none() && self.cycle_id[i] < 0
    }
}

fn find_cycles(parent: &[Option<usize>]) -> Vec<i32> {
    let n = parent.len();
    let mut cycle_id = vec![-1i32; n];
    let mut state = vec![0u8; n]; // 0 = unvisited, 1 = on current path, 2 = done
    let mut next_id = 0i32;

    for start in 0..n {
        if state[start] != 0 {
            continue;
        }
        let mut path = Vec::new();
        let mut cur = start;
        loop {
            if state[cur] == 2 {
                break;
            }
            if state[cur] == 1 {
                let cycle_start = path.iter().position(|&x| x == cur).expect("node on path");
                for &node in &path[cycle_start..] {
                    cycle_id[node] = next_id;
                }
                next_id += 1;
                break;
            }
            state[cur] = 1;
            path.push(cur);
            match parent[cur] {
                Some(p) => cur = p,
                None => break,
            }
        }
        for &node in &path {
            if state[node] == 1 {
                state[node] = 2;
            }
        }
    }
    cycle_id
}

fn compute_depth(parent: &[Option<usize>], children: &[Vec<usize>], cycle_id: &[i32]) -> Vec<u32> {
    let n = parent.len();
    let mut depth = vec![u32::MAX; n];
    let mut queue = VecDeque::new();
    for i in 0..n {
        if parent[i].is_none() && cycle_id[i] < 0 {
            depth[i] = 0;
            queue.push_back(i);
        }
    }
    while let Some(i) = queue.pop_front() {
        for &c in &children[i] {
            if cycle_id[c] >= 0 {
                continue;
            }
            if depth[c] == u32::MAX {
                depth[c] = depth[i] + 1;
                queue.push_back(c);
            }
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_master_two_replicas_depth_assigned() {
        let server_ids = vec![1, 2, 3];
        let master_ids = vec![0, 1, 1];
        let topo = Topology::build(&server_ids, &master_ids);
        assert_eq!(topo.depth, vec![0, 1, 1]);
        assert!(!topo.has_cycles());
        assert!(topo.is_root(0));
    }

    #[test]
    fn relay_master_has_depth_two() {
        let server_ids = vec![1, 2, 3];
        let master_ids = vec![0, 1, 2];
        let topo = Topology::build(&server_ids, &master_ids);
        assert_eq!(topo.depth, vec![0, 1, 2]);
        assert_eq!(topo.children[1], vec![2]);
    }

    #[test]
    fn two_node_cycle_is_detected() {
        let server_ids = vec![1, 2];
        let master_ids = vec![2, 1];
        let topo = Topology::build(&server_ids, &master_ids);
        assert!(topo.has_cycles());
        assert_eq!(topo.cycle_id[0], topo.cycle_id[1]);
        assert!(topo.cycle_id[0] >= 0);
    }

    #[test]
    fn unresolvable_master_id_is_treated_as_a_root() {
        let server_ids = vec![1];
        let master_ids = vec![999];
        let topo = Topology::build(&server_ids, &master_ids);
        assert_eq!(topo.parent, vec![None]);
        assert_eq!(topo.depth, vec![0]);
    }
}
