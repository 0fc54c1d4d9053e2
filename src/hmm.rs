//! Hidden Markov Model with Viterbi Decoding
//!
//! A discrete-state sequence model: a fixed set of state labels (for example
//! part-of-speech tags), a start distribution, state → state transitions and
//! state → symbol emissions. The tables are supplied pre-computed; there is no
//! training step here.
//!
//! ## Smoothing
//!
//! Every probability lookup is floored at [`SMOOTHING_FLOOR`], so a missing or
//! zero entry becomes a small positive number and `ln` stays finite.
//!
//! ## Viterbi
//!
//! ```text
//! score[0][s]  = ln start(s) + ln emit(s, o₀)
//! score[t][s]  = max_r ( score[t-1][r] + ln trans(r, s) ) + ln emit(s, oₜ)
//! back[t][s]   = argmax_r of the same
//! path         = backtrace from argmax_s score[T-1][s]
//! ```
//!
//! Ties go to the state declared first.

use std::collections::HashMap;

use crate::error::{NetError, NetResult};

/// Probability substituted for missing or zero entries
pub const SMOOTHING_FLOOR: f64 = 1e-10;

/// A decoded state sequence with its joint log-probability
#[derive(Clone, Debug, PartialEq)]
pub struct ViterbiPath {
    pub states: Vec<String>,
    pub log_prob: f64,
}

/// Hidden Markov Model over string states and string observations
#[derive(Clone, Debug)]
pub struct Hmm {
    states: Vec<String>,
    start: HashMap<String, f64>,
    transitions: HashMap<String, HashMap<String, f64>>,
    emissions: HashMap<String, HashMap<String, f64>>,
    floor: f64,
}

impl Hmm {
    /// Build a model from its three probability tables
    ///
    /// # Arguments
    ///
    /// * `states` - State labels in declaration order
    /// * `start` - P(state at t = 0)
    /// * `transitions` - P(next | current), keyed `current → next`
    /// * `emissions` - P(observation | state), keyed `state → observation`
    ///
    /// # Errors
    ///
    /// Fails with no states or a repeated state label.
    pub fn new(
        states: Vec<String>,
        start: HashMap<String, f64>,
        transitions: HashMap<String, HashMap<String, f64>>,
        emissions: HashMap<String, HashMap<String, f64>>,
    ) -> NetResult<Self> {
        if states.is_empty() {
            return Err(NetError::NoStates);
        }
        for (i, state) in states.iter().enumerate() {
            if states[..i].contains(state) {
                return Err(NetError::DuplicateSymbol(state.clone()));
            }
        }
        Ok(Self {
            states,
            start,
            transitions,
            emissions,
            floor: SMOOTHING_FLOOR,
        })
    }

    /// Replace the smoothing floor; non-positive values keep the default
    pub fn with_floor(mut self, floor: f64) -> Self {
        if floor > 0.0 && floor.is_finite() {
            self.floor = floor;
        }
        self
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    fn ln_floored(&self, p: Option<&f64>) -> f64 {
        p.copied().unwrap_or(0.0).max(self.floor).ln()
    }

    fn ln_start(&self, state: &str) -> f64 {
        self.ln_floored(self.start.get(state))
    }

    fn ln_trans(&self, from: &str, to: &str) -> f64 {
        self.ln_floored(self.transitions.get(from).and_then(|row| row.get(to)))
    }

    fn ln_emit(&self, state: &str, observation: &str) -> f64 {
        self.ln_floored(self.emissions.get(state).and_then(|row| row.get(observation)))
    }

    /// Most probable state sequence for `observations`
    pub fn viterbi<S: AsRef<str>>(&self, observations: &[S]) -> Vec<String> {
        self.viterbi_scored(observations).states
    }

    /// Most probable state sequence plus its joint log-probability
    ///
    /// An empty observation sequence yields an empty path with log-prob 0.
    pub fn viterbi_scored<S: AsRef<str>>(&self, observations: &[S]) -> ViterbiPath {
        let Some(first) = observations.first() else {
            return ViterbiPath {
                states: Vec::new(),
                log_prob: 0.0,
            };
        };
        let n = self.states.len();

        // Transition logs are reused at every step
        let ln_trans: Vec<Vec<f64>> = self
            .states
            .iter()
            .map(|from| self.states.iter().map(|to| self.ln_trans(from, to)).collect())
            .collect();

        let mut score: Vec<f64> = self
            .states
            .iter()
            .map(|s| self.ln_start(s) + self.ln_emit(s, first.as_ref()))
            .collect();
        let mut back: Vec<Vec<usize>> = Vec::with_capacity(observations.len());

        for observation in &observations[1..] {
            let mut next = vec![f64::NEG_INFINITY; n];
            let mut pointers = vec![0usize; n];
            for (to, state) in self.states.iter().enumerate() {
                let mut best = (0usize, f64::NEG_INFINITY);
                for (from, &prev) in score.iter().enumerate() {
                    let candidate = prev + ln_trans[from][to];
                    if candidate > best.1 {
                        best = (from, candidate);
                    }
                }
                next[to] = best.1 + self.ln_emit(state, observation.as_ref());
                pointers[to] = best.0;
            }
            back.push(pointers);
            score = next;
        }

        let mut best_final = 0usize;
        for (i, &s) in score.iter().enumerate() {
            if s > score[best_final] {
                best_final = i;
            }
        }

        let mut path = Vec::with_capacity(observations.len());
        path.push(best_final);
        let mut current = best_final;
        for pointers in back.iter().rev() {
            current = pointers[current];
            path.push(current);
        }
        path.reverse();

        ViterbiPath {
            states: path.into_iter().map(|i| self.states[i].clone()).collect(),
            log_prob: score[best_final],
        }
    }

    /// Joint log-probability of a given state path and observations
    ///
    /// Returns `None` when the lengths differ.
    pub fn path_log_prob<S: AsRef<str>, O: AsRef<str>>(&self, states: &[S], observations: &[O]) -> Option<f64> {
        if states.len() != observations.len() {
            return None;
        }
        let mut total = 0.0;
        let mut previous: Option<&str> = None;
        for (state, observation) in states.iter().zip(observations) {
            let state = state.as_ref();
            total += match previous {
                None => self.ln_start(state),
                Some(prev) => self.ln_trans(prev, state),
            };
            total += self.ln_emit(state, observation.as_ref());
            previous = Some(state);
        }
        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn weather() -> Hmm {
        let states = vec!["Rainy".to_string(), "Sunny".to_string()];
        let start = table(&[("Rainy", 0.6), ("Sunny", 0.4)]);
        let transitions = HashMap::from([
            ("Rainy".to_string(), table(&[("Rainy", 0.7), ("Sunny", 0.3)])),
            ("Sunny".to_string(), table(&[("Rainy", 0.4), ("Sunny", 0.6)])),
        ]);
        let emissions = HashMap::from([
            ("Rainy".to_string(), table(&[("walk", 0.1), ("shop", 0.4), ("clean", 0.5)])),
            ("Sunny".to_string(), table(&[("walk", 0.6), ("shop", 0.3), ("clean", 0.1)])),
        ]);
        Hmm::new(states, start, transitions, emissions).unwrap()
    }

    #[test]
    fn test_classic_weather_example() {
        let hmm = weather();
        let path = hmm.viterbi(&["walk", "shop", "clean"]);
        assert_eq!(path, vec!["Sunny", "Rainy", "Rainy"]);
    }

    #[test]
    fn test_scored_path_agrees_with_path_log_prob() {
        let hmm = weather();
        let obs = ["walk", "shop", "clean", "walk"];
        let scored = hmm.viterbi_scored(&obs);
        let direct = hmm.path_log_prob(&scored.states, &obs).unwrap();
        assert_relative_eq!(scored.log_prob, direct, epsilon = 1e-12);
    }

    #[test]
    fn test_unseen_observation_stays_finite() {
        let hmm = weather();
        let scored = hmm.viterbi_scored(&["umbrella", "walk"]);
        assert_eq!(scored.states.len(), 2);
        assert!(scored.log_prob.is_finite());
    }

    #[test]
    fn test_empty_observations() {
        let hmm = weather();
        let empty: [&str; 0] = [];
        assert!(hmm.viterbi(&empty).is_empty());
    }

    #[test]
    fn test_ties_resolve_to_first_state() {
        let states = vec!["A".to_string(), "B".to_string()];
        let hmm = Hmm::new(states, HashMap::new(), HashMap::new(), HashMap::new()).unwrap();
        assert_eq!(hmm.viterbi(&["x", "y"]), vec!["A", "A"]);
    }

    #[test]
    fn test_construction_errors() {
        let err = Hmm::new(vec![], HashMap::new(), HashMap::new(), HashMap::new()).unwrap_err();
        assert!(matches!(err, NetError::NoStates));
        let err = Hmm::new(
            vec!["A".into(), "A".into()],
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, NetError::DuplicateSymbol(_)));
    }

    #[test]
    fn test_path_log_prob_length_mismatch() {
        let hmm = weather();
        assert!(hmm.path_log_prob(&["Rainy"], &["walk", "shop"]).is_none());
    }
}
