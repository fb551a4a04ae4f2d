//! Trial bookkeeping for the tuner

use serde::{Deserialize, Serialize};

use super::search_space::TrialParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeDirection {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrialState {
    Complete { value: f64 },
    Failed { error: String },
}

/// Result of a single trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    pub params: TrialParams,
    #[serde(flatten)]
    pub state: TrialState,
    pub duration_secs: f64,
}

impl TrialResult {
    pub fn value(&self) -> Option<f64> {
        match self.state {
            TrialState::Complete { value } => Some(value),
            TrialState::Failed { .. } => None,
        }
    }
}

/// All trials of one search and the index of the best completed one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub trials: Vec<TrialResult>,
    pub best_trial_idx: Option<usize>,
    pub total_duration_secs: f64,
    pub direction: OptimizeDirection,
}

impl Study {
    pub fn new(direction: OptimizeDirection) -> Self {
        Self {
            trials: Vec::new(),
            best_trial_idx: None,
            total_duration_secs: 0.0,
            direction,
        }
    }

    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.map(|idx| &self.trials[idx])
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().and_then(TrialResult::value)
    }

    pub fn best_params(&self) -> Option<&TrialParams> {
        self.best_trial().map(|t| &t.params)
    }

    pub fn finished_trials(&self) -> usize {
        self.trials.iter().filter(|t| t.value().is_some()).count()
    }

    pub fn failed_trials(&self) -> usize {
        self.trials.len() - self.finished_trials()
    }

    /// Record a trial; failed and non-finite trials never become best
    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();

        if let Some(value) = result.value().filter(|v| v.is_finite()) {
            let is_better = match self.best_value() {
                None => true,
                Some(best) => match self.direction {
                    OptimizeDirection::Minimize => value < best,
                    OptimizeDirection::Maximize => value > best,
                },
            };
            if is_better {
                self.best_trial_idx = Some(idx);
            }
        }

        self.trials.push(result);
    }
}
