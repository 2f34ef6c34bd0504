use std::path::PathBuf;
use std::process;

use clap::Args;

use ecgra::params::DvfsMode;
use ecgra::search::ed_product;
use ecgra::sim::DEFAULT_MAX_TOKENS;
use ecgra::{Autosearch, PowerModel, SearchConfig, Simulator};

#[derive(Args)]
pub struct MapArgs {
    /// Input tile-config JSON
    pub input: PathBuf,
    /// Steer for energy instead of performance
    #[arg(long)]
    pub energy_first: bool,
    /// Skip the group search and reload its artifacts
    #[arg(long)]
    pub skip_search: bool,
    /// Output filename suffix for the DVFS-annotated config
    #[arg(long, default_value = "_dvfs")]
    pub suffix: String,
    /// Token budget per trial run
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u64,
}

pub fn cmd_map(args: MapArgs) {
    let mut dfg = super::load_dfg(&args.input);

    let config = SearchConfig {
        energy_first: args.energy_first,
        skip_search: args.skip_search,
        max_tokens: args.max_tokens,
        input: Some(args.input.clone()),
        suffix: args.suffix.clone(),
        artifacts: Some(args.input.with_extension("")),
    };
    let mut search = Autosearch::new(PowerModel::new(Simulator::new(false)), config);

    let outcome = match search.run(&mut dfg) {
        Ok(outcome) => outcome,
        Err(diag) => {
            diag.emit();
            process::exit(1);
        }
    };

    println!(
        "baseline: throughput {:.4}  power {:.3}  energy {:.3}",
        outcome.baseline.throughput, outcome.baseline.power, outcome.baseline.energy
    );
    println!(
        "mapped:   throughput {:.4}  power {:.3}  energy {:.3}",
        outcome.accepted.throughput, outcome.accepted.power, outcome.accepted.energy
    );
    println!(
        "ED product vs baseline: {:.4}",
        ed_product(&outcome.accepted, &outcome.baseline)
    );
    for (name, v) in &outcome.nodes {
        println!(
            "  {:<20} {:>5.2}  {}",
            name,
            v,
            DvfsMode::label_for_voltage(*v)
        );
    }
}
