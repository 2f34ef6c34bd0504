use std::path::PathBuf;
use std::process;

use clap::Args;

#[derive(Args)]
pub struct RenderArgs {
    /// Input tile-config JSON
    pub input: PathBuf,
    /// Output dot file (default: <input>.dot)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn cmd_render(args: RenderArgs) {
    let dfg = super::load_dfg(&args.input);
    let dot = ecgra::render::write_dot(&dfg);
    let out = args
        .output
        .unwrap_or_else(|| args.input.with_extension("dot"));
    if let Err(e) = std::fs::write(&out, dot) {
        eprintln!("error: cannot write '{}': {}", out.display(), e);
        process::exit(1);
    }
    println!("wrote {}", out.display());
}
