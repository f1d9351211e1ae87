//! Circular dependency detection.
//!
//! A cycle through `start` exists when `start` can reach itself by following
//! dependency edges (e.g., A1 references B1, B1 references C1, C1 references
//! A1). The search keeps its own stack, so arbitrarily long dependency chains
//! cannot overflow the call stack.

use std::collections::HashSet;
use std::hash::Hash;

/// Detect a circular dependency through `start`.
/// Returns Some(cycle_path) beginning at `start` if one is found, None otherwise.
pub fn detect_cycle<N, F, I>(start: N, mut successors: F) -> Option<Vec<N>>
where
    N: Copy + Eq + Hash,
    F: FnMut(N) -> I,
    I: IntoIterator<Item = N>,
{
    let mut visited = HashSet::from([start]);
    let mut path = vec![start];
    let mut stack = vec![successors(start).into_iter()];

    while let Some(frontier) = stack.last_mut() {
        match frontier.next() {
            Some(next) if next == start => return Some(path),
            Some(next) => {
                if visited.insert(next) {
                    path.push(next);
                    stack.push(successors(next).into_iter());
                }
            }
            None => {
                stack.pop();
                path.pop();
            }
        }
    }
    None
}
