use crate::reports;
use beamforge::config::Config;
use beamforge::{DecResult, Decoder, Translation};
use clap::Args;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    #[command(flatten)]
    pub config: Config,

    /// One sentence per line; stdin when omitted.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Emit one JSON object per sentence instead of plain text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Print search counters after each sentence.
    #[arg(long, default_value_t = false)]
    pub stats: bool,
}

pub fn run(args: &DecodeArgs, decoder: &Decoder) -> DecResult<()> {
    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin().lock())),
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let start = Instant::now();
    let mut sentences = 0;
    let mut not_found = 0;

    for line in reader.lines() {
        let line = line?;
        let translation = decoder.translate(line.trim())?;
        sentences += 1;
        if !translation.is_found() {
            not_found += 1;
        }
        emit(&mut out, args, &translation)?;
    }

    info!(
        "Translated {} sentence(s) in {:.2}s ({} without a translation)",
        sentences,
        start.elapsed().as_secs_f64(),
        not_found
    );
    Ok(())
}

fn emit<W: Write>(out: &mut W, args: &DecodeArgs, translation: &Translation) -> DecResult<()> {
    if args.json {
        serde_json::to_writer(&mut *out, translation)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "{}", translation.output_or_input())?;
    if !translation.n_best.is_empty() {
        writeln!(out, "{}", reports::n_best_table(&translation.n_best))?;
    }
    if args.stats {
        writeln!(out, "{}", reports::stats_table(&translation.stats))?;
    }
    Ok(())
}
