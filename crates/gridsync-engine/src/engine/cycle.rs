//! Circular dependency detection for formula cells.
//!
//! A cell is on a cycle when following its dependencies leads back to it
//! (e.g., A1 references B1, B1 references C1, C1 references A1).

use std::collections::HashSet;

use super::{CellId, CellStore};

struct Frame {
    id: CellId,
    deps: Vec<CellId>,
    next: usize,
}

/// Detect a dependency cycle through `start`.
/// Returns Some(path) beginning and ending with `start` if one exists.
pub fn detect_cycle(start: CellId, store: &CellStore) -> Option<Vec<CellId>> {
    let mut visited = HashSet::new();
    let mut stack = vec![Frame {
        id: start,
        deps: store.dependencies_of(start),
        next: 0,
    }];

    loop {
        let next = {
            let frame = stack.last_mut()?;
            let dep = frame.deps.get(frame.next).copied();
            frame.next += 1;
            dep
        };

        match next {
            None => {
                stack.pop();
            }
            Some(dep) if dep == start => {
                let mut path: Vec<CellId> = stack.iter().map(|frame| frame.id).collect();
                path.push(start);
                return Some(path);
            }
            Some(dep) => {
                if visited.insert(dep) {
                    stack.push(Frame {
                        id: dep,
                        deps: store.dependencies_of(dep),
                        next: 0,
                    });
                }
            }
        }
    }
}
