//! Forest reconstruction from flat search records
//!
//! The build runs in two passes. The index pass only reads the records and
//! resolves, for each one, the position of its parent (if that parent is in
//! the input). The construction pass then owns every node and moves each one
//! into its parent's children exactly once.

use std::collections::HashMap;

use super::entity::SearchResult;

/// Parent/child links resolved over record positions
#[derive(Debug)]
struct TreeLinks {
    /// Position of each record's parent, `None` for roots and orphans
    parents: Vec<Option<usize>>,
    /// Children of each record, in input order
    children: Vec<Vec<usize>>,
    /// Root positions, in input order
    roots: Vec<usize>,
}

impl TreeLinks {
    fn index(records: &[SearchResult]) -> Self {
        let mut by_code: HashMap<&str, usize> = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            by_code.entry(record.code.as_str()).or_insert(position);
        }

        let mut parents: Vec<Option<usize>> = records
            .iter()
            .enumerate()
            .map(|(position, record)| {
                record
                    .parent_code
                    .as_deref()
                    .and_then(|parent| by_code.get(parent).copied())
                    .filter(|parent| *parent != position)
            })
            .collect();

        break_cycles(&mut parents);

        let mut children = vec![Vec::new(); records.len()];
        let mut roots = Vec::new();
        for (position, parent) in parents.iter().enumerate() {
            match parent {
                Some(parent) => children[*parent].push(position),
                None => roots.push(position),
            }
        }

        Self {
            parents,
            children,
            roots,
        }
    }

    /// Positions ordered so that every node comes after its ancestors
    fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.parents.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(position) = stack.pop() {
            order.push(position);
            stack.extend(self.children[position].iter().rev());
        }
        order
    }

    fn assemble(self, records: Vec<SearchResult>) -> Vec<SearchResult> {
        let order = self.preorder();
        let mut slots: Vec<Option<SearchResult>> = records.into_iter().map(Some).collect();

        // reverse preorder visits descendants before their ancestors
        for &position in order.iter().rev() {
            let children: Vec<SearchResult> = self.children[position]
                .iter()
                .filter_map(|child| slots[*child].take())
                .collect();
            if let Some(node) = slots[position].as_mut() {
                node.children.extend(children);
            }
        }

        self.roots
            .iter()
            .filter_map(|root| slots[*root].take())
            .collect()
    }
}

/// Promote one record per parent cycle to a root.
///
/// The promoted record is the earliest one (by input position) on the cycle.
fn break_cycles(parents: &mut [Option<usize>]) {
    const UNVISITED: u8 = 0;
    const ON_WALK: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNVISITED; parents.len()];

    for start in 0..parents.len() {
        let mut walk = Vec::new();
        let mut current = Some(start);

        while let Some(position) = current {
            match state[position] {
                DONE => break,
                ON_WALK => {
                    let cycle_start = walk.iter().position(|p| *p == position).unwrap_or(0);
                    if let Some(&earliest) = walk[cycle_start..].iter().min() {
                        parents[earliest] = None;
                    }
                    break;
                }
                _ => {
                    state[position] = ON_WALK;
                    walk.push(position);
                    current = parents[position];
                }
            }
        }

        for position in walk {
            state[position] = DONE;
        }
    }
}

/// Build a forest from flat records, returning the roots.
///
/// Records whose parent is missing from the input become roots. Children keep
/// the relative order they had in the input. Every input record appears
/// exactly once in the output.
pub fn build_tree(records: Vec<SearchResult>) -> Vec<SearchResult> {
    let links = TreeLinks::index(&records);
    links.assemble(records)
}
