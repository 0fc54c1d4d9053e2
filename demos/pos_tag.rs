//! Part-of-speech tagging with a hand-built HMM
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example pos_tag -- the dog sees a cat
//! ```

use clap::Parser;
use scrivener::Hmm;
use std::collections::HashMap;

#[derive(Parser)]
#[command(name = "pos_tag", about = "Tag words with a toy hidden Markov model")]
struct Args {
    /// Words to tag
    #[arg(default_values = ["the", "dog", "sees", "a", "cat"])]
    words: Vec<String>,
}

fn table(entries: &[(&str, f64)]) -> HashMap<String, f64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn tagger() -> Result<Hmm, scrivener::NetError> {
    let states = ["DET", "NOUN", "VERB"].map(String::from).to_vec();
    let start = table(&[("DET", 0.6), ("NOUN", 0.3), ("VERB", 0.1)]);
    let transitions = HashMap::from([
        ("DET".to_string(), table(&[("NOUN", 0.9), ("VERB", 0.05), ("DET", 0.05)])),
        ("NOUN".to_string(), table(&[("VERB", 0.6), ("NOUN", 0.2), ("DET", 0.2)])),
        ("VERB".to_string(), table(&[("DET", 0.6), ("NOUN", 0.3), ("VERB", 0.1)])),
    ]);
    let emissions = HashMap::from([
        ("DET".to_string(), table(&[("the", 0.6), ("a", 0.4)])),
        ("NOUN".to_string(), table(&[("dog", 0.4), ("cat", 0.4), ("walk", 0.2)])),
        ("VERB".to_string(), table(&[("sees", 0.5), ("walk", 0.3), ("chases", 0.2)])),
    ]);
    Hmm::new(states, start, transitions, emissions)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;
    let args = Args::parse();

    let hmm = tagger()?;
    let words: Vec<String> = args.words.iter().map(|w| w.to_lowercase()).collect();
    let path = hmm.viterbi_scored(&words);

    for (word, tag) in words.iter().zip(&path.states) {
        println!("{word:>12}  {tag}");
    }
    println!("log P = {:.4}", path.log_prob);
    Ok(())
}
