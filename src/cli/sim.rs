use std::path::PathBuf;
use std::process;

use clap::Args;

use ecgra::sim::DEFAULT_MAX_TOKENS;
use ecgra::{PowerModel, Simulator};

#[derive(Args)]
pub struct SimArgs {
    /// Input tile-config JSON
    pub input: PathBuf,
    /// Token budget for the measurement
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u64,
    /// Allow a second same-step token into half-full queues
    #[arg(long)]
    pub pipelining: bool,
}

pub fn cmd_sim(args: SimArgs) {
    let dfg = super::load_dfg(&args.input);
    let mut model = PowerModel::new(Simulator::new(args.pipelining));
    if let Err(diag) = model.calc_performance(&dfg, args.max_tokens) {
        diag.emit();
        process::exit(1);
    }
    print!("{}", model.format_report(&dfg));
}
