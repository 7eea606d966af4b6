//! Single-linkage agglomerative clustering of 2D votes.
//!
//! Cluster ids follow the hierarchical-clustering convention: leaves are
//! `0..n`, the cluster created by merge `k` is `n + k`.

use nalgebra::Point2;

/// One merge of the single-linkage tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    /// Smaller id of the two merged clusters.
    pub first: usize,
    /// Larger id of the two merged clusters.
    pub second: usize,
    /// Linkage distance of the merge.
    pub distance: f32,
    /// Number of leaves in the merged cluster.
    pub size: usize,
}

/// Build the single-linkage merge list of `points`, sorted by distance.
///
/// Uses the minimum spanning tree (Prim, O(n²)), whose sorted edges are
/// exactly the single-linkage merges.
pub fn single_linkage(points: &[Point2<f32>]) -> Vec<Cluster> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }

    let mut in_tree = vec![false; n];
    let mut best = vec![f32::INFINITY; n];
    let mut link = vec![0usize; n];
    let mut edges: Vec<(usize, usize, f32)> = Vec::with_capacity(n - 1);
    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        let mut next = usize::MAX;
        let mut next_d = f32::INFINITY;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let d = (points[j] - points[current]).norm();
            if d < best[j] {
                best[j] = d;
                link[j] = current;
            }
            if next == usize::MAX || best[j] < next_d {
                next = j;
                next_d = best[j];
            }
        }
        in_tree[next] = true;
        edges.push((link[next], next, next_d));
        current = next;
    }
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));

    // Union-find over leaves; `label[root]` is the current cluster id.
    let mut parent: Vec<usize> = (0..n).collect();
    let mut label: Vec<usize> = (0..n).collect();
    let mut size = vec![1usize; n];
    let mut merges = Vec::with_capacity(n - 1);
    for (k, (a, b, d)) in edges.into_iter().enumerate() {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        let (la, lb) = (label[ra], label[rb]);
        let merged = size[ra] + size[rb];
        parent[rb] = ra;
        size[ra] = merged;
        label[ra] = n + k;
        merges.push(Cluster {
            first: la.min(lb),
            second: la.max(lb),
            distance: d,
            size: merged,
        });
    }
    merges
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Flat clustering: apply every merge with `distance <= threshold`.
///
/// Returns one label per leaf; labels are numbered by first appearance in
/// leaf order, so label `0` always contains leaf `0`.
pub fn flat_cut(merges: &[Cluster], n: usize, threshold: f32) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..n + merges.len()).collect();
    for (k, m) in merges.iter().enumerate() {
        if m.distance <= threshold {
            parent[m.first] = n + k;
            parent[m.second] = n + k;
        }
    }
    let mut root_label: Vec<Option<usize>> = vec![None; parent.len()];
    let mut next_label = 0;
    (0..n)
        .map(|leaf| {
            let mut r = leaf;
            while parent[r] != r {
                r = parent[r];
            }
            *root_label[r].get_or_insert_with(|| {
                next_label += 1;
                next_label - 1
            })
        })
        .collect()
}

/// Label and size of the largest flat cluster; ties go to the lower label.
pub fn dominant_cluster(labels: &[usize]) -> Option<(usize, usize)> {
    let num = labels.iter().max()? + 1;
    let mut counts = vec![0usize; num];
    for &l in labels {
        counts[l] += 1;
    }
    let mut best = (0, counts[0]);
    for (l, &c) in counts.iter().enumerate().skip(1) {
        if c > best.1 {
            best = (l, c);
        }
    }
    Some(best)
}
