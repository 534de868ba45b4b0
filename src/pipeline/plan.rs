//! The wave plan: which tasks run together, and how checkpoints are numbered.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{Error, Result};
use crate::tasks::TaskKind;

/// Checkpoints in a full run: one per task plus the consolidation.
pub const TOTAL_CHECKPOINTS: u32 = TaskKind::ALL.len() as u32 + 1;

/// Agent name recorded on the consolidation checkpoint.
pub const FINAL_AGENT: &str = "final_consolidation";

/// Ordered groups of tasks. Tasks within a wave run concurrently; waves
/// run strictly in sequence.
///
/// Checkpoint numbers follow plan order (wave by wave, table order within
/// a wave), never completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavePlan {
    waves: Vec<Vec<TaskKind>>,
}

impl WavePlan {
    /// Validate and build a plan.
    ///
    /// # Errors
    /// Returns `Validation` if a task is listed twice, a wave is empty, the
    /// dependency graph has a cycle, or a task depends on a field that is
    /// not produced by an earlier wave.
    pub fn new(waves: Vec<Vec<TaskKind>>) -> Result<Self> {
        let mut graph: DiGraph<TaskKind, ()> = DiGraph::new();
        let mut index: HashMap<TaskKind, NodeIndex> = HashMap::new();
        let mut wave_of: HashMap<TaskKind, usize> = HashMap::new();

        for (w, tasks) in waves.iter().enumerate() {
            if tasks.is_empty() {
                return Err(Error::Validation(format!("wave {} is empty", w + 1)));
            }
            for kind in tasks {
                if index.insert(*kind, graph.add_node(*kind)).is_some() {
                    return Err(Error::Validation(format!("{} is planned twice", kind)));
                }
                wave_of.insert(*kind, w);
            }
        }

        for (kind, node) in &index {
            for dep in kind.dependencies() {
                let dep_node = index.get(dep).ok_or_else(|| {
                    Error::Validation(format!("{} depends on unplanned {}", kind, dep))
                })?;
                graph.add_edge(*dep_node, *node, ());
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            let at = graph
                .node_weight(cycle.node_id())
                .map(|k| k.name())
                .unwrap_or("unknown");
            Error::Validation(format!("dependency cycle at {}", at))
        })?;

        for edge in graph.raw_edges() {
            let (dep, kind) = (graph[edge.source()], graph[edge.target()]);
            if wave_of[&dep] >= wave_of[&kind] {
                return Err(Error::Validation(format!(
                    "{} (wave {}) depends on {} which is not in an earlier wave",
                    kind,
                    wave_of[&kind] + 1,
                    dep
                )));
            }
        }

        Ok(Self { waves })
    }

    /// The three-wave character development plan.
    pub fn standard() -> Result<Self> {
        let mut waves: Vec<Vec<TaskKind>> = Vec::new();
        for kind in TaskKind::ALL {
            let w = kind.wave() as usize;
            if waves.len() < w {
                waves.resize_with(w, Vec::new);
            }
            waves[w - 1].push(kind);
        }
        Self::new(waves)
    }

    pub fn waves(&self) -> &[Vec<TaskKind>] {
        &self.waves
    }

    pub fn wave_count(&self) -> u32 {
        self.waves.len() as u32
    }

    /// Tasks of 1-based wave `wave`.
    pub fn tasks_in(&self, wave: u32) -> Option<&[TaskKind]> {
        let i = (wave as usize).checked_sub(1)?;
        self.waves.get(i).map(Vec::as_slice)
    }

    pub fn wave_of(&self, kind: TaskKind) -> Option<u32> {
        self.waves
            .iter()
            .position(|tasks| tasks.contains(&kind))
            .map(|i| i as u32 + 1)
    }

    pub fn checkpoint_number(&self, kind: TaskKind) -> Option<u32> {
        self.waves
            .iter()
            .flatten()
            .position(|k| *k == kind)
            .map(|i| i as u32 + 1)
    }

    /// Highest checkpoint number produced by waves `1..=wave`.
    pub fn last_checkpoint_of_wave(&self, wave: u32) -> u32 {
        self.waves
            .iter()
            .take(wave as usize)
            .map(|tasks| tasks.len() as u32)
            .sum()
    }

    pub fn total_checkpoints(&self) -> u32 {
        self.last_checkpoint_of_wave(self.wave_count()) + 1
    }

    /// Wave number recorded on the consolidation checkpoint.
    pub fn final_wave(&self) -> u32 {
        self.wave_count() + 1
    }
}
