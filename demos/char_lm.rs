//! Character-level LSTM language model
//!
//! Trains an LSTM on a text file (or a built-in passage) and reports
//! perplexity. Input is truncated to `--max-chars` before any work is done,
//! which is how callers bound the cost of a forward pass.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --example char_lm
//! cargo run --release --example char_lm -- --input shakespeare.txt --epochs 5 --max-chars 20000
//! ```

use clap::Parser;
use scrivener::codec::{encode_lstm, save_blob};
use scrivener::config::LstmTrainerConfig;
use scrivener::kernel::argmax;
use scrivener::{LstmModel, LstmTrainer};
use std::fs;

/// Upper bound on characters fed to the model
const MAX_CHARS: usize = 5000;

const SAMPLE_TEXT: &str = "It was the best of times, it was the worst of times, \
it was the age of wisdom, it was the age of foolishness, it was the epoch of belief, \
it was the epoch of incredulity, it was the season of Light, it was the season of Darkness.";

#[derive(Parser)]
#[command(name = "char_lm", about = "Train a character LSTM and report perplexity")]
struct Args {
    /// Text file to train on (built-in passage when absent)
    #[arg(long)]
    input: Option<String>,

    /// Truncate the input to this many characters
    #[arg(long, default_value_t = MAX_CHARS)]
    max_chars: usize,

    /// Characters per training sequence
    #[arg(long, default_value_t = 200)]
    chunk: usize,

    #[arg(long, default_value_t = 16)]
    embed: usize,

    #[arg(long, default_value_t = 48)]
    hidden: usize,

    #[arg(long, default_value_t = 10)]
    epochs: usize,

    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Where to write the model blob
    #[arg(long)]
    out: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;
    let args = Args::parse();

    let text = match &args.input {
        Some(path) => fs::read_to_string(path)?,
        None => SAMPLE_TEXT.to_string(),
    };
    let text: String = text.chars().take(args.max_chars).collect();

    let mut model = LstmModel::for_characters(&text, args.embed, args.hidden, args.seed)?;
    let encoded = model.encode_chars(&text);
    let sequences: Vec<Vec<usize>> = encoded
        .chunks(args.chunk.max(2))
        .map(<[usize]>::to_vec)
        .collect();
    println!(
        "Vocabulary {} | {} characters | {} sequences | {} parameters",
        model.vocab_size(),
        encoded.len(),
        sequences.len(),
        model.param_count()
    );

    let before = model.perplexity(&encoded).unwrap_or(f64::NAN);
    let mut trainer = LstmTrainer::new(LstmTrainerConfig::default());
    trainer.train_corpus(&mut model, &sequences, args.epochs, args.seed);
    let after = model.perplexity(&encoded).unwrap_or(f64::NAN);
    println!("Perplexity: {before:.2} -> {after:.2}");

    // Greedy continuation of the first few characters
    let mut prefix: Vec<usize> = encoded.iter().take(10).copied().collect();
    for _ in 0..60 {
        let Some(next) = model
            .next_symbol_distribution(&prefix)
            .and_then(|dist| argmax(&dist))
        else {
            break;
        };
        prefix.push(next);
    }
    let sample: String = prefix
        .iter()
        .filter_map(|&i| model.embedding().symbol(i))
        .collect();
    println!("Sample: {sample:?}");

    if let Some(out) = &args.out {
        save_blob(out, &encode_lstm(&model)?)?;
        println!("Wrote {out}");
    }
    Ok(())
}
