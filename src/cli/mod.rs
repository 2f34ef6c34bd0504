pub mod map;
pub mod render;
pub mod sim;

use std::path::Path;
use std::process;

use ecgra::reader;
use ecgra::Dfg;

/// Load a DFG from a tile-config file, rendering any configuration error
/// against its source before exiting.
pub fn load_dfg(input: &Path) -> Dfg {
    match reader::read_dfg(input) {
        Ok(dfg) => dfg,
        Err(diag) => {
            let filename = input.display().to_string();
            match std::fs::read_to_string(input) {
                Ok(source) if !diag.span.is_dummy() => diag.render(&filename, &source),
                _ => diag.emit(),
            }
            process::exit(1);
        }
    }
}
