use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

/// Depth-first cycle detection over an adjacency list. Every back edge
/// contributes one cycle: the path from the revisited node around to the
/// node that closed it. Traversal order follows the map's key order and each
/// node's target order, so results are deterministic.
pub fn find_cycles(adjacency: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut cycles = Vec::new();

    for start in adjacency.keys() {
        if marks.contains_key(start.as_str()) {
            continue;
        }
        marks.insert(start.as_str(), Mark::OnStack);
        let mut path: Vec<&str> = vec![start.as_str()];
        let mut frames: Vec<(&str, usize)> = vec![(start.as_str(), 0)];

        while let Some(frame) = frames.last_mut() {
            let node = frame.0;
            let targets = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if frame.1 < targets.len() {
                let target = targets[frame.1].as_str();
                frame.1 += 1;
                match marks.get(target) {
                    None => {
                        marks.insert(target, Mark::OnStack);
                        path.push(target);
                        frames.push((target, 0));
                    }
                    Some(Mark::OnStack) => {
                        if let Some(pos) = path.iter().position(|n| *n == target) {
                            cycles.push(path[pos..].iter().map(|s| s.to_string()).collect());
                        }
                    }
                    Some(Mark::Done) => {}
                }
            } else {
                marks.insert(node, Mark::Done);
                path.pop();
                frames.pop();
            }
        }
    }

    cycles
}

/// Rotates a cycle to start at its smallest member so that the same loop
/// found from different entry points compares equal.
pub fn canonical_cycle(cycle: &[String]) -> Vec<String> {
    let Some(min_idx) = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(idx, _)| idx)
    else {
        return Vec::new();
    };
    cycle[min_idx..]
        .iter()
        .chain(cycle[..min_idx].iter())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)]) -> BTreeMap<String, Vec<String>> {
        let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (from, to) in edges {
            adjacency
                .entry(from.to_string())
                .or_default()
                .push(to.to_string());
            adjacency.entry(to.to_string()).or_default();
        }
        adjacency
    }

    #[test]
    fn triangle_is_one_cycle() {
        let cycles = find_cycles(&graph(&[("a", "b"), ("b", "c"), ("c", "a")]));
        assert_eq!(cycles, vec![vec!["a".to_string(), "b".into(), "c".into()]]);
    }

    #[test]
    fn chain_has_no_cycle() {
        assert!(find_cycles(&graph(&[("a", "b"), ("b", "c")])).is_empty());
    }

    #[test]
    fn self_loop_and_diamond() {
        let cycles = find_cycles(&graph(&[
            ("a", "a"),
            ("a", "b"),
            ("a", "c"),
            ("b", "d"),
            ("c", "d"),
        ]));
        assert_eq!(cycles, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn two_back_edges_two_cycles() {
        let cycles = find_cycles(&graph(&[("a", "b"), ("b", "a"), ("b", "c"), ("c", "b")]));
        assert_eq!(cycles.len(), 2);
    }

    #[test]
    fn canonical_rotation() {
        let cycle = vec!["c".to_string(), "a".into(), "b".into()];
        assert_eq!(canonical_cycle(&cycle), vec!["a", "b", "c"]);
        assert!(canonical_cycle(&[]).is_empty());
    }
}
