//! Splitting a system of equations into smaller blocks which can be solved
//! one after another.
//!
//! Inverting a Jacobian with cofactor expansion gets very expensive as it
//! grows, so we try to find the smallest groups of equations which need to
//! be solved together. Once a block has been solved its variables are known
//! constants as far as every later block is concerned.

use crate::{equations::Equation, error::LoadError};
use smol_str::SmolStr;
use std::collections::BTreeSet;

/// A set of equations solved together by a single Newton-Raphson run.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// The 1-based position of this block in the solve order.
    pub id: usize,
    /// The ids of the equations in this block, in row order.
    pub equations: Vec<usize>,
    /// The variables this block solves for, in column order.
    pub unknowns: Vec<SmolStr>,
    /// The auxiliary variable added by [`pad_blocks()`], if any.
    pub padding: Option<SmolStr>,
}

impl Block {
    fn new(id: usize, equations: Vec<usize>, unknowns: BTreeSet<SmolStr>) -> Self {
        Block {
            id,
            equations,
            unknowns: unknowns.into_iter().collect(),
            padding: None,
        }
    }

    pub fn dimension(&self) -> usize { self.unknowns.len() }

    /// Look up this block's equations, in row order.
    pub fn rows<'e>(
        &'e self,
        equations: &'e [Equation],
    ) -> impl Iterator<Item = &'e Equation> + 'e {
        self.equations
            .iter()
            .filter_map(move |id| equations.iter().find(|eq| eq.id == *id))
    }

    /// The unknowns which came from the user's equations.
    pub fn variables(&self) -> impl Iterator<Item = &SmolStr> + '_ {
        self.unknowns
            .iter()
            .filter(move |name| Some(*name) != self.padding.as_ref())
    }
}

/// An equation which hasn't been assigned to a block yet, along with the
/// variables it references which haven't been resolved.
#[derive(Debug, Clone, PartialEq)]
struct Pending {
    id: usize,
    signature: BTreeSet<SmolStr>,
}

/// Group equations into blocks, ordered so that every block only depends on
/// its own unknowns and the unknowns of earlier blocks.
pub fn partition(
    equations: &[Equation],
    max_variables_per_block: usize,
) -> Result<Vec<Block>, LoadError> {
    let mut pending: Vec<Pending> = equations
        .iter()
        .map(|eq| Pending {
            id: eq.id,
            signature: eq.variables.clone(),
        })
        .collect();
    let mut blocks = Vec::new();

    while !pending.is_empty() {
        let progress = take_singletons(&mut pending, &mut blocks)
            || take_square_group(&mut pending, &mut blocks);

        if !progress {
            break;
        }
    }

    if !pending.is_empty() {
        // whatever couldn't be reduced any further gets solved in one go
        let unknowns = pending
            .iter()
            .flat_map(|p| p.signature.iter().cloned())
            .collect();
        let ids = pending.iter().map(|p| p.id).collect();
        blocks.push(Block::new(blocks.len() + 1, ids, unknowns));
    }

    for block in &blocks {
        if block.unknowns.len() != block.equations.len() {
            return Err(LoadError::InconsistentBlock {
                block: block.id,
                equations: block.equations.len(),
                unknowns: block.unknowns.len(),
            });
        }

        if block.dimension() > max_variables_per_block {
            return Err(LoadError::BlockTooLarge {
                block: block.id,
                variables: block.dimension(),
                max: max_variables_per_block,
            });
        }
    }

    tracing::debug!(
        blocks = blocks.len(),
        largest = blocks.iter().map(Block::dimension).max().unwrap_or(0),
        "Partitioned the system"
    );

    Ok(blocks)
}

/// Every equation with exactly one unresolved variable becomes its own
/// block.
fn take_singletons(pending: &mut Vec<Pending>, blocks: &mut Vec<Block>) -> bool {
    let candidates: Vec<usize> = pending
        .iter()
        .filter(|p| p.signature.len() == 1)
        .map(|p| p.id)
        .collect();
    let mut progress = false;

    for id in candidates {
        let ix = match pending.iter().position(|p| p.id == id) {
            Some(ix) => ix,
            None => continue,
        };

        // an earlier singleton may have already resolved this variable
        if pending[ix].signature.len() != 1 {
            continue;
        }

        let taken = pending.remove(ix);
        resolve(pending, &taken.signature);
        blocks.push(Block::new(blocks.len() + 1, vec![taken.id], taken.signature));
        progress = true;
    }

    progress
}

/// Look for `n` equations which all reference the same `n` unresolved
/// variables, where `n` is the smallest signature we've got.
fn take_square_group(
    pending: &mut Vec<Pending>,
    blocks: &mut Vec<Block>,
) -> bool {
    let min = match pending
        .iter()
        .map(|p| p.signature.len())
        .filter(|&len| len > 0)
        .min()
    {
        Some(min) => min,
        None => return false,
    };

    let group = pending
        .iter()
        .filter(|p| p.signature.len() == min)
        .map(|candidate| {
            pending
                .iter()
                .filter(|p| p.signature == candidate.signature)
                .map(|p| p.id)
                .collect::<Vec<_>>()
        })
        .find(|group| group.len() == min);

    let group = match group {
        Some(group) => group,
        None => return false,
    };

    let signature = pending
        .iter()
        .find(|p| p.id == group[0])
        .map(|p| p.signature.clone())
        .unwrap_or_default();

    pending.retain(|p| !group.contains(&p.id));
    resolve(pending, &signature);
    blocks.push(Block::new(blocks.len() + 1, group, signature));

    true
}

fn resolve(pending: &mut [Pending], variables: &BTreeSet<SmolStr>) {
    for p in pending {
        p.signature.retain(|name| !variables.contains(name));
    }
}

/// Make sure every block has at least two unknowns by adding a padding
/// variable and a trivial `padding = 0` equation to the small ones.
///
/// The new equations are appended to `equations`, continuing on from the
/// largest id.
pub fn pad_blocks(blocks: &mut [Block], equations: &mut Vec<Equation>) {
    for block in blocks {
        if block.dimension() > 1 {
            continue;
        }

        let id = equations.iter().map(|eq| eq.id).max().unwrap_or(0) + 1;
        let name = SmolStr::from(format!("#pad{}", block.id));

        equations.push(Equation::padding(id, &name));
        block.equations.push(id);
        block.unknowns.push(name.clone());
        block.padding = Some(name);
    }
}
