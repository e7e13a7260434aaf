use crate::edit::{Edit, EditKind};
use crate::patch::Patch;
use crate::program::Selection;
use crate::search::SearchHooks;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Default neighbourhood: drop a random edit, or append a random one.
#[derive(Debug, Clone)]
pub struct RandomEdits {
    operators: Vec<EditKind>,
    removal_probability: f64,
    selection: Selection,
    stop_at: Option<f64>,
}

impl Default for RandomEdits {
    fn default() -> Self {
        Self {
            operators: vec![EditKind::Replacement, EditKind::Insertion, EditKind::Deletion],
            removal_probability: 0.5,
            selection: Selection::Random,
            stop_at: None,
        }
    }
}

impl RandomEdits {
    pub fn new(operators: Vec<EditKind>) -> Self {
        Self {
            operators,
            ..Self::default()
        }
    }

    /// Chance of removing an edit from a non-empty patch, in `[0, 1]`.
    pub fn removal_probability(mut self, probability: f64) -> Self {
        self.removal_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// End an epoch as soon as a candidate reaches `fitness` or lower.
    pub fn stop_at(mut self, fitness: f64) -> Self {
        self.stop_at = Some(fitness);
        self
    }
}

impl SearchHooks for RandomEdits {
    fn neighbour<'p>(&mut self, mut patch: Patch<'p>, rng: &mut StdRng) -> Patch<'p> {
        if !patch.is_empty() && rng.gen_bool(self.removal_probability) {
            let index = rng.gen_range(0..patch.len());
            patch.remove(index);
            return patch;
        }

        let Some(kind) = self.operators.choose(rng).copied() else {
            return patch;
        };
        match Edit::random(kind, patch.program(), self.selection, rng) {
            Some(edit) => {
                if let Err(error) = patch.add(edit) {
                    debug!(%error, "discarded random edit");
                }
            }
            None => debug!(%kind, "program offers no modification point"),
        }
        patch
    }

    fn stopping_criterion(&mut self, _iter: usize, fitness: f64) -> bool {
        self.stop_at.is_some_and(|target| fitness <= target)
    }
}
