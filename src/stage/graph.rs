// ABOUTME: Validated, topologically ordered set of stages.
// ABOUTME: Construction rejects duplicates, unknown dependencies, and cycles before anything runs.

use super::{ResourceGroup, StageName};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("stage {0} is declared more than once")]
    DuplicateStage(StageName),

    #[error("stage {stage} depends on undeclared stage {dependency}")]
    UnknownDependency {
        stage: StageName,
        dependency: StageName,
    },

    #[error("dependency cycle among stages: {}", format_stages(.0))]
    Cycle(Vec<StageName>),
}

fn format_stages(stages: &[StageName]) -> String {
    stages
        .iter()
        .map(StageName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stages in an order where every stage follows all of its dependencies.
#[derive(Debug, Clone)]
pub struct StageGraph {
    ordered: Vec<ResourceGroup>,
}

impl StageGraph {
    /// Order `groups` with Kahn's algorithm. Among stages that are ready at
    /// the same time, the one declared first goes first.
    pub fn new(groups: Vec<ResourceGroup>) -> Result<Self, GraphError> {
        let mut declared = BTreeSet::new();
        for group in &groups {
            if !declared.insert(group.name) {
                return Err(GraphError::DuplicateStage(group.name));
            }
        }
        for group in &groups {
            if let Some(missing) = group.depends_on.iter().find(|d| !declared.contains(*d)) {
                return Err(GraphError::UnknownDependency {
                    stage: group.name,
                    dependency: *missing,
                });
            }
        }

        let mut remaining: BTreeMap<StageName, BTreeSet<StageName>> = groups
            .iter()
            .map(|g| (g.name, g.depends_on.iter().copied().collect()))
            .collect();
        let mut slots: Vec<Option<ResourceGroup>> = groups.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(slots.len());

        while !remaining.is_empty() {
            let next = slots.iter().position(|slot| {
                slot.as_ref()
                    .and_then(|g| remaining.get(&g.name))
                    .is_some_and(BTreeSet::is_empty)
            });
            let Some(group) = next.and_then(|i| slots[i].take()) else {
                let mut cycle: Vec<StageName> = remaining.keys().copied().collect();
                cycle.sort();
                return Err(GraphError::Cycle(cycle));
            };

            remaining.remove(&group.name);
            for deps in remaining.values_mut() {
                deps.remove(&group.name);
            }
            ordered.push(group);
        }

        Ok(Self { ordered })
    }

    pub fn stages(&self) -> &[ResourceGroup] {
        &self.ordered
    }

    pub fn order(&self) -> Vec<StageName> {
        self.ordered.iter().map(|g| g.name).collect()
    }

    pub fn get(&self, name: StageName) -> Option<&ResourceGroup> {
        self.ordered.iter().find(|g| g.name == name)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
