//! Property-based tests for the numeric runtime.
//!
//! Run with: cargo test --test proptest_runtime

use std::collections::HashMap;

use proptest::prelude::*;
use scrivener::codec::{decode_network, encode_network};
use scrivener::config::MlpTrainerConfig;
use scrivener::{Activation, DenseLayer, FeedForwardNet, Hmm, MlpTrainer};

// =============================================================================
// Strategies
// =============================================================================

fn arb_activation() -> impl Strategy<Value = Activation> {
    prop_oneof![
        Just(Activation::Sigmoid),
        Just(Activation::Tanh),
        Just(Activation::Relu),
        Just(Activation::Gelu),
        Just(Activation::Linear),
    ]
}

/// Layer widths from input to output, 2-4 entries of 1-6 units.
fn arb_sizes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..=6, 2..=4)
}

/// A network with random shape, activations, layer norm flags and seed.
fn arb_network() -> impl Strategy<Value = FeedForwardNet> {
    arb_sizes().prop_flat_map(|sizes| {
        let layers = sizes.len() - 1;
        (
            Just(sizes),
            prop::collection::vec(arb_activation(), layers),
            prop::collection::vec(any::<bool>(), layers),
            any::<u64>(),
        )
            .prop_map(|(sizes, acts, norms, seed)| {
                let layers = sizes
                    .windows(2)
                    .zip(acts.iter().zip(&norms))
                    .enumerate()
                    .map(|(i, (pair, (&act, &norm)))| {
                        DenseLayer::seeded(pair[0], pair[1], act, seed.wrapping_add(i as u64))
                            .with_layer_norm(norm)
                    })
                    .collect();
                FeedForwardNet::new("prop", layers).unwrap()
            })
    })
}

fn arb_probability() -> impl Strategy<Value = f64> {
    0.01f64..1.0
}

/// A 2-state HMM over observations "a" and "b".
fn arb_hmm() -> impl Strategy<Value = Hmm> {
    prop::collection::vec(arb_probability(), 2 + 4 + 4).prop_map(|p| {
        let states = vec!["S0".to_string(), "S1".to_string()];
        let start = HashMap::from([("S0".to_string(), p[0]), ("S1".to_string(), p[1])]);
        let transitions = HashMap::from([
            (
                "S0".to_string(),
                HashMap::from([("S0".to_string(), p[2]), ("S1".to_string(), p[3])]),
            ),
            (
                "S1".to_string(),
                HashMap::from([("S0".to_string(), p[4]), ("S1".to_string(), p[5])]),
            ),
        ]);
        let emissions = HashMap::from([
            (
                "S0".to_string(),
                HashMap::from([("a".to_string(), p[6]), ("b".to_string(), p[7])]),
            ),
            (
                "S1".to_string(),
                HashMap::from([("a".to_string(), p[8]), ("b".to_string(), p[9])]),
            ),
        ]);
        Hmm::new(states, start, transitions, emissions).unwrap()
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn codec_round_trip_preserves_forward(
        net in arb_network(),
        x in prop::collection::vec(-3.0f64..3.0, 6),
    ) {
        let decoded = decode_network(&encode_network(&net).unwrap()).unwrap();
        let x = &x[..net.input_size()];
        prop_assert_eq!(decoded.forward(x), net.forward(x));
        prop_assert_eq!(decoded.param_count(), net.param_count());
    }

    #[test]
    fn gradients_never_exceed_clip(
        net in arb_network(),
        x in prop::collection::vec(-50.0f64..50.0, 6),
        target in prop_oneof![Just(0.0), Just(1.0)],
        clip in 0.001f64..5.0,
    ) {
        let trainer = MlpTrainer::new(MlpTrainerConfig { grad_clip: clip, ..MlpTrainerConfig::default() });
        let x = &x[..net.input_size()];
        let (loss, grads) = trainer.compute_gradients(&net, x, target);
        prop_assert!(loss.is_finite());
        prop_assert!(grads.max_abs() <= clip);
    }

    #[test]
    fn viterbi_matches_brute_force(
        hmm in arb_hmm(),
        obs in prop::collection::vec(prop_oneof![Just("a"), Just("b")], 1..=6),
    ) {
        let decoded = hmm.viterbi_scored(&obs);

        let mut best = f64::NEG_INFINITY;
        for mask in 0u32..(1 << obs.len()) {
            let path: Vec<&str> = (0..obs.len())
                .map(|i| if mask & (1 << i) == 0 { "S0" } else { "S1" })
                .collect();
            best = best.max(hmm.path_log_prob(&path, &obs).unwrap());
        }

        prop_assert!((decoded.log_prob - best).abs() < 1e-9);
        let rescored = hmm.path_log_prob(&decoded.states, &obs).unwrap();
        prop_assert!((rescored - best).abs() < 1e-9);
    }

    #[test]
    fn predict_proba_is_a_probability(
        net in arb_network(),
        x in prop::collection::vec(-10.0f64..10.0, 6),
    ) {
        let p = net.predict_proba(&x[..net.input_size()]);
        prop_assert!((0.0..=1.0).contains(&p));
    }
}
