use crate::edit::Edit;
use crate::patch::Patch;
use crate::search::SearchHooks;
use rand::rngs::StdRng;
use std::collections::HashSet;
use tracing::debug;

/// Regeneration attempts before a repeated candidate is accepted.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;

/// Wraps a neighbourhood so that no candidate is proposed twice.
///
/// Visited edit lists are remembered for the current epoch; the memory is
/// emptied when an epoch starts and once the stopping criterion holds. When
/// every attempt in a row hits the memory, the last candidate is returned
/// anyway so the search cannot stall.
#[derive(Debug, Clone)]
pub struct Tabu<H> {
    inner: H,
    memory: HashSet<Vec<Edit>>,
    max_attempts: usize,
}

impl<H> Tabu<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            memory: HashSet::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }
}

impl<H: SearchHooks> SearchHooks for Tabu<H> {
    fn neighbour<'p>(&mut self, patch: Patch<'p>, rng: &mut StdRng) -> Patch<'p> {
        let mut candidate = self.inner.neighbour(patch.clone(), rng);
        for _ in 1..self.max_attempts {
            if !self.memory.contains(candidate.edits()) {
                break;
            }
            candidate = self.inner.neighbour(patch.clone(), rng);
        }
        if !self.memory.insert(candidate.edits().to_vec()) {
            debug!(patch = %candidate, "tabu attempts exhausted, revisiting");
        }
        candidate
    }

    fn is_better(&self, fitness: f64, best: f64) -> bool {
        self.inner.is_better(fitness, best)
    }

    fn stopping_criterion(&mut self, iter: usize, fitness: f64) -> bool {
        let stop = self.inner.stopping_criterion(iter, fitness);
        if stop {
            self.memory.clear();
        }
        stop
    }

    fn reset(&mut self) {
        self.memory.clear();
        self.inner.reset();
    }
}
