//! Static checks run before a pipeline executes.
//!
//! A task may only require keys that exist in the initial state or are written
//! by a unit ordered before it. Parallel siblings never see each other's
//! outputs. A loop runs all its children in its first iteration unless it
//! checks the termination signal after each child; then only what its first
//! child writes is guaranteed afterwards.

use crate::{FlowError, Node, NodeKind, Result};
use std::collections::{BTreeSet, HashSet};

/// Checks `root` against the keys present in the initial state.
///
/// # Errors
///
/// Returns [`FlowError::Config`] naming the offending node if a required
/// input can be read before anything writes it, or if two siblings share a name.
pub fn validate_pipeline<I, S>(root: &dyn Node, initial_keys: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut available: BTreeSet<String> = initial_keys.into_iter().map(Into::into).collect();
    check(root, &mut available)
}

fn check(node: &dyn Node, available: &mut BTreeSet<String>) -> Result<()> {
    check_sibling_names(node)?;

    match node.kind() {
        NodeKind::Task => {
            if let Some(missing) = node.input_keys().iter().find(|key| !available.contains(*key)) {
                return Err(FlowError::Config(format!(
                    "Task '{}' reads '{missing}' before any earlier node writes it",
                    node.name()
                )));
            }
            available.extend(node.output_keys());
        }
        NodeKind::Sequential => {
            for child in node.children() {
                check(child.as_ref(), available)?;
            }
        }
        NodeKind::Parallel => {
            let before = available.clone();
            for child in node.children() {
                let mut branch = before.clone();
                check(child.as_ref(), &mut branch)?;
                available.extend(branch);
            }
        }
        NodeKind::Loop => {
            let mut iteration = available.clone();
            let mut after_first = None;
            for child in node.children() {
                check(child.as_ref(), &mut iteration)?;
                if after_first.is_none() {
                    after_first = Some(iteration.clone());
                }
            }
            if node.guarantees_all_children() {
                *available = iteration;
            } else if let Some(after_first) = after_first {
                *available = after_first;
            }
        }
    }
    Ok(())
}

fn check_sibling_names(node: &dyn Node) -> Result<()> {
    let mut seen = HashSet::new();
    for child in node.children() {
        if !seen.insert(child.name()) {
            return Err(FlowError::Config(format!(
                "Duplicate node name '{}' under '{}'",
                child.name(),
                node.name()
            )));
        }
    }
    Ok(())
}
