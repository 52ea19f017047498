//! Graph algorithms over slot-indexed edge lists.

const DAMPING: f64 = 0.85;
const MAX_ITERATIONS: usize = 100;
const TOLERANCE: f64 = 1e-9;

/// Union-find components ignoring edge direction.
///
/// Components are ordered by their earliest slot and each lists slots ascending.
pub(super) fn weakly_connected_components(
    node_count: usize,
    endpoints: &[(usize, usize)],
) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..node_count).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for &(a, b) in endpoints {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        if ra != rb {
            // Smaller root wins so the representative is the earliest slot.
            let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
            parent[merge] = keep;
        }
    }

    let mut components: Vec<Vec<usize>> = Vec::new();
    let mut component_of_root: Vec<Option<usize>> = vec![None; node_count];
    for slot in 0..node_count {
        let root = find(&mut parent, slot);
        match component_of_root[root] {
            Some(c) => components[c].push(slot),
            None => {
                component_of_root[root] = Some(components.len());
                components.push(vec![slot]);
            }
        }
    }
    components
}

/// Personalised PageRank.
///
/// `weights` is the per-node teleport preference; it is normalised and falls
/// back to uniform when every weight is zero. Dangling mass is redistributed
/// by the same preference vector.
pub(super) fn weighted_pagerank(weights: &[f64], endpoints: &[(usize, usize)]) -> Vec<f64> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }

    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    let preference: Vec<f64> = if total > 0.0 {
        weights.iter().map(|w| w.max(0.0) / total).collect()
    } else {
        vec![1.0 / n as f64; n]
    };

    let mut out_degree = vec![0usize; n];
    for &(source, _) in endpoints {
        out_degree[source] += 1;
    }

    let mut rank = preference.clone();
    for _ in 0..MAX_ITERATIONS {
        let dangling: f64 = (0..n)
            .filter(|&v| out_degree[v] == 0)
            .map(|v| rank[v])
            .sum();

        let mut next: Vec<f64> = preference
            .iter()
            .map(|p| (1.0 - DAMPING) * p + DAMPING * dangling * p)
            .collect();
        for &(source, target) in endpoints {
            next[target] += DAMPING * rank[source] / out_degree[source] as f64;
        }

        let delta: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
        rank = next;
        if delta < TOLERANCE {
            break;
        }
    }
    rank
}
