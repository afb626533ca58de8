//! Edit application and dependent propagation.
//!
//! An edit rewrites one cell, then re-evaluates every cell that reads it,
//! directly or transitively. Dependents are walked depth-first with a
//! per-pass visited set and evaluated once each in reverse post-order, so a
//! cell reached through several paths sees all of its updated inputs.

use std::collections::{HashMap, HashSet};

use super::cell::{CYCLE_SENTINEL, Cell};
use super::cycle::detect_cycle;
use super::eval::evaluate;
use super::{CellId, CellStore};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Frame {
    id: CellId,
    dependents: Vec<CellId>,
    next: usize,
}

/// Apply a raw edit to `cell_id` and propagate it through the store.
///
/// Returns the edited cell followed by every re-evaluated dependent, in
/// evaluation order.
pub fn apply_edit(store: &mut CellStore, cell_id: CellId, raw_input: &str) -> Vec<CellId> {
    write_evaluated(store, cell_id, raw_input);

    let (order, has_cycle) = propagation_order(store, cell_id);
    // Cycle members are marked before anything downstream reads them.
    let cyclic: HashSet<CellId> = if has_cycle {
        order
            .iter()
            .copied()
            .filter(|id| detect_cycle(*id, store).is_some())
            .collect()
    } else {
        HashSet::new()
    };

    for (index, id) in order.iter().enumerate() {
        if cyclic.contains(id) {
            store.set_display_value(*id, CYCLE_SENTINEL.to_string());
        } else if index > 0 {
            let raw = store.raw_input(*id);
            write_evaluated(store, *id, &raw);
        }
    }

    tracing::debug!(
        cell = %cell_id,
        updated = order.len(),
        cyclic = cyclic.len(),
        "propagated edit"
    );
    order
}

/// Re-evaluate every formula in the store, e.g. after loading records
/// produced elsewhere. Returns the number of cells evaluated.
pub fn recalculate_all(store: &mut CellStore) -> usize {
    let formulas: Vec<CellId> = store
        .sorted_cells()
        .into_iter()
        .filter(|(_, cell)| cell.is_formula())
        .map(|(id, _)| id)
        .collect();
    for id in &formulas {
        let raw = store.raw_input(*id);
        apply_edit(store, *id, &raw);
    }
    formulas.len()
}

fn write_evaluated(store: &mut CellStore, id: CellId, raw_input: &str) {
    let evaluation = evaluate(raw_input, store);
    store.insert(
        id,
        Cell::new(raw_input, evaluation.display_value, evaluation.dependencies),
    );
}

/// Depth-first walk over dependents starting at `root`.
///
/// Returns the reverse post-order (root first) and whether the walk met a
/// cell it was still inside of, which means a cycle is reachable.
fn propagation_order(store: &CellStore, root: CellId) -> (Vec<CellId>, bool) {
    let mut marks: HashMap<CellId, Mark> = HashMap::new();
    let mut post_order = Vec::new();
    let mut has_cycle = false;

    marks.insert(root, Mark::Visiting);
    let mut stack = vec![Frame {
        id: root,
        dependents: store.dependents_of(root),
        next: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        let Some(next) = frame.dependents.get(frame.next).copied() else {
            let id = frame.id;
            stack.pop();
            marks.insert(id, Mark::Done);
            post_order.push(id);
            continue;
        };
        frame.next += 1;

        match marks.get(&next) {
            Some(Mark::Visiting) => has_cycle = true,
            Some(Mark::Done) => {}
            None => {
                marks.insert(next, Mark::Visiting);
                stack.push(Frame {
                    id: next,
                    dependents: store.dependents_of(next),
                    next: 0,
                });
            }
        }
    }

    post_order.reverse();
    (post_order, has_cycle)
}
