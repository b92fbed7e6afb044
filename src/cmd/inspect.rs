use crate::reports;
use beamforge::config::Config;
use beamforge::core_types::Sentence;
use beamforge::{DecResult, Decoder};
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub config: Config,

    #[arg(short, long)]
    pub sentence: String,
}

/// Prints the option table and future-cost matrix the search would start from.
pub fn run(args: &InspectArgs, decoder: &Decoder) -> DecResult<()> {
    let sentence = Sentence::parse(&args.sentence, decoder.vocab());
    let manager = decoder.manager(&sentence)?;

    println!("{}", reports::options_table(manager.table(), decoder.vocab()));
    println!(
        "{}",
        reports::future_cost_table(manager.future_costs(), &sentence, decoder.vocab())
    );
    Ok(())
}
