//! First-order analytical power and energy model.
//!
//! Closed-form static and dynamic power per tile and per SRAM as
//! functions of voltage, op class, and the measured throughput. The
//! model proxies performance measurement to a single simulator instance
//! and caches throughput and latency between reads.

use crate::dfg::Dfg;
use crate::diagnostic::Diagnostic;
use crate::params::OpClass;
use crate::sim::{Perf, Simulator};

pub const V_NOMINAL: f64 = 0.9;
pub const V_MIN: f64 = 0.65;
pub const V_MAX: f64 = 1.25;

/// Leakage fraction of a nominal mul tile.
const GAMMA: f64 = 0.10;
/// SRAM to tile leakage ratio.
const BETA: f64 = 2.0;
/// Dynamic-power voltage exponent.
const S_EXP: f64 = 2.0;

pub const TILE_COUNT: usize = 64;
pub const SRAM_COUNT: usize = 16;

/// Fitted clock frequency at a given voltage.
pub fn freq(v: f64) -> f64 {
    -1161.6 * v * v + 4056.9 * v - 1689.1
}

/// One evaluated operating configuration: the simulator readout plus the
/// aggregate power and energy it implies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub throughput: f64,
    pub latency: f64,
    pub power: f64,
    pub energy: f64,
}

pub struct PowerModel {
    sim: Simulator,
    pub throughput: f64,
    pub latency: f64,
}

impl PowerModel {
    pub fn new(sim: Simulator) -> Self {
        Self {
            sim,
            throughput: 0.0,
            latency: 0.0,
        }
    }

    /// Re-run the simulator and refresh the cached throughput and
    /// latency. Power and energy reads are only meaningful afterwards.
    pub fn calc_performance(&mut self, dfg: &Dfg, max_tokens: u64) -> Result<Perf, Diagnostic> {
        let perf = self.sim.run(dfg, max_tokens)?;
        self.throughput = perf.throughput;
        self.latency = perf.latency;
        Ok(perf)
    }

    /// Leakage current, anchored so that leakage is the γ fraction of a
    /// nominal mul tile's power.
    fn leakage_current(&self) -> f64 {
        GAMMA * self.p_tile_dyn(V_NOMINAL, OpClass::Mul) / (V_NOMINAL * (1.0 - GAMMA))
    }

    pub fn p_tile_static(&self, v: f64) -> f64 {
        v * self.leakage_current()
    }

    pub fn p_tile_dyn(&self, v: f64, op: OpClass) -> f64 {
        op.alpha() * self.throughput * freq(v) * v.powf(S_EXP)
    }

    pub fn p_tile_total(&self, v: f64, op: OpClass) -> f64 {
        self.p_tile_static(v) + self.p_tile_dyn(v, op)
    }

    pub fn p_sram_static(&self, v: f64) -> f64 {
        v * self.leakage_current() * BETA
    }

    pub fn p_sram_dyn(&self, v: f64) -> f64 {
        OpClass::Sram.alpha() * self.throughput * freq(v) * v.powf(S_EXP)
    }

    pub fn p_sram_total(&self, v: f64) -> f64 {
        self.p_sram_static(v) + self.p_sram_dyn(v)
    }

    /// The nodes that draw tile power: everything but constants.
    fn power_nodes(&self, dfg: &Dfg) -> Vec<petgraph::stable_graph::NodeIndex> {
        dfg.all_nodes()
            .filter(|&i| dfg.node(i).op != OpClass::Const)
            .collect()
    }

    /// One implicit SRAM per live-in and one per live-out. A node that is
    /// both a live-in and a live-out contributes two SRAMs, one per side.
    fn sram_nodes(&self, dfg: &Dfg) -> Vec<petgraph::stable_graph::NodeIndex> {
        dfg.get_liveins()
            .into_iter()
            .chain(dfg.get_liveouts())
            .filter(|&i| dfg.node(i).op != OpClass::Const)
            .collect()
    }

    /// Total CGRA power at the current operating points.
    pub fn p_cgra_total(&self, dfg: &Dfg) -> f64 {
        let tiles: f64 = self
            .power_nodes(dfg)
            .iter()
            .map(|&i| {
                let n = dfg.node(i);
                self.p_tile_total(n.voltage, n.op)
            })
            .sum();
        let srams: f64 = self
            .sram_nodes(dfg)
            .iter()
            .map(|&i| self.p_sram_total(dfg.node(i).voltage))
            .sum();
        tiles + srams
    }

    pub fn e_cgra_total(&self, dfg: &Dfg) -> f64 {
        self.p_cgra_total(dfg) * self.latency
    }

    /// Fixed power envelope: every tile and SRAM at nominal. Reporting
    /// only; the search steers by the ED product instead.
    pub fn p_alloc(&self) -> f64 {
        TILE_COUNT as f64 * self.p_tile_total(V_NOMINAL, OpClass::Mul)
            + SRAM_COUNT as f64 * self.p_sram_total(V_NOMINAL)
    }

    /// Run the simulator and fold the readout into one measurement.
    pub fn measure(&mut self, dfg: &Dfg, max_tokens: u64) -> Result<Measurement, Diagnostic> {
        let perf = self.calc_performance(dfg, max_tokens)?;
        let power = self.p_cgra_total(dfg);
        Ok(Measurement {
            throughput: perf.throughput,
            latency: perf.latency,
            power,
            energy: power * perf.latency,
        })
    }

    /// Table-style power report at the current operating points.
    pub fn format_report(&self, dfg: &Dfg) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<16} {:>6} {:>6} {:>6} {:>12} {:>12} {:>12}\n",
            "Node", "op", "V", "T", "static", "dynamic", "total"
        ));
        out.push_str(&"-".repeat(76));
        out.push('\n');

        for i in self.power_nodes(dfg) {
            let n = dfg.node(i);
            out.push_str(&format!(
                "{:<16} {:>6} {:>6.2} {:>6.2} {:>12.3} {:>12.3} {:>12.3}\n",
                n.name,
                n.op.name(),
                n.voltage,
                n.period,
                self.p_tile_static(n.voltage),
                self.p_tile_dyn(n.voltage, n.op),
                self.p_tile_total(n.voltage, n.op),
            ));
        }
        for i in self.sram_nodes(dfg) {
            let n = dfg.node(i);
            out.push_str(&format!(
                "{:<16} {:>6} {:>6.2} {:>6.2} {:>12.3} {:>12.3} {:>12.3}\n",
                format!("{}*", n.name),
                "sram",
                n.voltage,
                n.period,
                self.p_sram_static(n.voltage),
                self.p_sram_dyn(n.voltage),
                self.p_sram_total(n.voltage),
            ));
        }

        out.push_str(&"-".repeat(76));
        out.push('\n');
        out.push_str(&format!(
            "throughput: {:.4} tokens/cycle    latency: {:.2}\n",
            self.throughput, self.latency
        ));
        out.push_str(&format!(
            "P_cgra: {:.3}    E_cgra: {:.3}    P_alloc: {:.3}\n",
            self.p_cgra_total(dfg),
            self.e_cgra_total(dfg),
            self.p_alloc(),
        ));
        out
    }
}
