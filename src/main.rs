mod cli;

use clap::{Parser, Subcommand};

use cli::map::MapArgs;
use cli::render::RenderArgs;
use cli::sim::SimArgs;

#[derive(Parser)]
#[command(
    name = "ecgra",
    version,
    about = "Elastic-CGRA analytical modeling and DVFS mapping toolkit"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate a DFG and print the performance and power report
    Sim(SimArgs),
    /// Search for a per-tile DVFS assignment and write it back out
    Map(MapArgs),
    /// Emit a Graphviz dot rendering of a DFG
    Render(RenderArgs),
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Sim(args) => cli::sim::cmd_sim(args),
        Command::Map(args) => cli::map::cmd_map(args),
        Command::Render(args) => cli::render::cmd_render(args),
    }
}
