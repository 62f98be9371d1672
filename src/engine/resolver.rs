use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::core::Stage;
use crate::error::PipelineError;

/// Computes an execution order for `stages` given the initially available names.
///
/// Returns indices into `stages`. Each pass walks the pending queue in
/// insertion order and places every stage whose requirements are already
/// available, so ties always resolve the same way. A pass that places
/// nothing fails with every name still missing, sorted and deduplicated.
pub fn resolve_order<S, I>(stages: &[S], available: I) -> Result<Vec<usize>, PipelineError>
where
    S: AsRef<dyn Stage>,
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut available: HashSet<String> = available.into_iter().map(Into::into).collect();
    let mut pending: VecDeque<usize> = (0..stages.len()).collect();
    let mut order = Vec::with_capacity(stages.len());

    while !pending.is_empty() {
        let mut progressed = false;

        for _ in 0..pending.len() {
            let Some(idx) = pending.pop_front() else {
                break;
            };
            let stage = stages[idx].as_ref();
            if stage.requires().iter().all(|key| available.contains(key)) {
                available.extend(stage.produces().iter().cloned());
                order.push(idx);
                progressed = true;
            } else {
                pending.push_back(idx);
            }
        }

        if !progressed {
            let missing: BTreeSet<String> = pending
                .iter()
                .flat_map(|&idx| stages[idx].as_ref().requires().iter())
                .filter(|key| !available.contains(*key))
                .cloned()
                .collect();
            return Err(PipelineError::UnresolvedDependencies {
                missing: missing.into_iter().collect(),
            });
        }
    }

    Ok(order)
}

/// Reorders owned stages into execution order.
pub fn resolve<I>(
    stages: Vec<Box<dyn Stage>>,
    available: I,
) -> Result<Vec<Box<dyn Stage>>, PipelineError>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let order = resolve_order(&stages, available)?;
    let mut slots: Vec<Option<Box<dyn Stage>>> = stages.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect())
}

/// Rejects two stages declaring the same output name.
pub fn check_unique_outputs<S: AsRef<dyn Stage>>(stages: &[S]) -> Result<(), PipelineError> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for stage in stages {
        let stage = stage.as_ref();
        for name in stage.produces() {
            if let Some(first) = owners.insert(name.as_str(), stage.name()) {
                return Err(PipelineError::DuplicateOutput {
                    name: name.clone(),
                    first: first.to_string(),
                    second: stage.name().to_string(),
                });
            }
        }
    }
    Ok(())
}
