pub mod dfg;
pub mod diagnostic;
pub mod params;
pub mod power;
pub mod render;
pub mod search;
pub mod sim;

// Re-exports — the toolkit surface used by the CLI and tests
pub use dfg::reader;
pub use dfg::toys;
pub use dfg::{Dfg, Node};
pub use diagnostic::{Diagnostic, Severity};
pub use params::{DvfsMode, OpClass};
pub use power::{Measurement, PowerModel};
pub use search::{Autosearch, SearchConfig, SearchOutcome};
pub use sim::{Perf, Simulator};
