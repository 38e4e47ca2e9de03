//! Token and seed assignment for a uniform partitioner ring.
//!
//! Every node derives its own token from its position in the cluster's
//! private-name list, so the math has to be identical wherever it runs.

/// Upper end of the partitioner keyspace, `2^127 - 1`.
pub const RING_MAX: u128 = (1u128 << 127) - 1;

/// Token for the node at `index` in a ring of `count` nodes.
///
/// Exactly `floor(index * RING_MAX / count)`, computed without overflowing
/// `u128`. Returns `None` when `index` is not a valid position.
pub fn token(index: usize, count: usize) -> Option<u128> {
    if count == 0 || index >= count {
        return None;
    }
    let n = count as u128;
    let i = index as u128;
    let quotient = RING_MAX / n;
    let remainder = RING_MAX % n;
    // remainder < n and i < n, so i * remainder < n^2 fits comfortably.
    Some(i * quotient + (i * remainder) / n)
}

/// Distance between consecutive seeds: `max(count / 3, 1)`.
pub fn seed_stride(count: usize) -> usize {
    (count / 3).max(1)
}

/// Pick the seed nodes: every `seed_stride`-th entry starting at index 0.
pub fn seeds<T: Clone>(nodes: &[T]) -> Vec<T> {
    nodes
        .iter()
        .step_by(seed_stride(nodes.len()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_node_ring_tokens() {
        assert_eq!(token(0, 4), Some(0));
        assert_eq!(token(1, 4), Some(RING_MAX / 4));
        assert_eq!(token(2, 4), Some(RING_MAX / 2));
        // floor(3 * RING_MAX / 4); RING_MAX = 4q + 3.
        let q = RING_MAX / 4;
        assert_eq!(token(3, 4), Some(3 * q + 2));
    }

    #[test]
    fn single_node_gets_token_zero() {
        assert_eq!(token(0, 1), Some(0));
    }

    #[test]
    fn tokens_are_strictly_increasing() {
        let count = 7;
        let tokens: Vec<u128> = (0..count).map(|i| token(i, count).unwrap()).collect();
        assert!(tokens.windows(2).all(|w| w[0] < w[1]));
        assert!(tokens[count - 1] < RING_MAX);
    }

    #[test]
    fn out_of_range_index_has_no_token() {
        assert_eq!(token(4, 4), None);
        assert_eq!(token(0, 0), None);
    }

    #[test]
    fn nine_nodes_seed_every_third() {
        let nodes: Vec<usize> = (0..9).collect();
        assert_eq!(seed_stride(9), 3);
        assert_eq!(seeds(&nodes), vec![0, 3, 6]);
    }

    #[test]
    fn small_clusters_seed_every_node() {
        let nodes = vec!["a", "b"];
        assert_eq!(seed_stride(2), 1);
        assert_eq!(seeds(&nodes), vec!["a", "b"]);
        assert!(seeds::<&str>(&[]).is_empty());
    }

    #[test]
    fn uneven_cluster_stride_rounds_down() {
        let nodes: Vec<usize> = (0..10).collect();
        assert_eq!(seeds(&nodes), vec![0, 3, 6, 9]);
    }
}
