//! Three-phase DVFS mapping search.
//!
//! Phase 1 collapses singly-chained runs of nodes into groups, shrinking
//! the space from 3^N to 3^G. Phase 2 greedily walks the groups once,
//! steering by the ED product (performance ratio × energy-efficiency
//! ratio) against the previously accepted state. Phase 3 re-imposes the
//! physical constraint that every node sharing a tile shares a voltage.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::dfg::{reader, Dfg};
use crate::diagnostic::{Diagnostic, Span};
use crate::params::DvfsMode;
use crate::power::{Measurement, PowerModel};
use crate::sim::DEFAULT_MAX_TOKENS;

/// Secondary acceptance threshold in performance-first mode: a trial
/// whose ED product lands below this still gets a nominal fallback try.
pub const PHASE2_SLACK: f64 = 1.07;

/// Phase-3 candidates within this fraction of the best ED product are
/// interchangeable; the highest voltage among them wins.
const COLOCATION_TOLERANCE: f64 = 0.01;

#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Steer for energy instead of performance.
    pub energy_first: bool,
    /// Skip Phase 2 and reload its artifacts instead.
    pub skip_search: bool,
    /// Token budget per trial run.
    pub max_tokens: u64,
    /// Tile config the graph came from; enables the final DVFS dump.
    pub input: Option<PathBuf>,
    /// Output filename suffix for the DVFS dump.
    pub suffix: String,
    /// Stem for intermediate artifact files; None disables them.
    pub artifacts: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            energy_first: false,
            skip_search: false,
            max_tokens: DEFAULT_MAX_TOKENS,
            input: None,
            suffix: "_dvfs".to_string(),
            artifacts: None,
        }
    }
}

/// The result of a completed search.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// Final per-node voltage assignment.
    pub nodes: BTreeMap<String, f64>,
    /// Per-group mode decisions out of Phase 2.
    pub groups: BTreeMap<usize, DvfsMode>,
    /// All-nominal reference measurement.
    pub baseline: Measurement,
    /// Measurement of the final accepted assignment.
    pub accepted: Measurement,
}

/// Figure of merit: performance ratio times energy-efficiency ratio
/// against a reference measurement.
pub fn ed_product(trial: &Measurement, reference: &Measurement) -> f64 {
    (trial.throughput / reference.throughput) * (reference.energy / trial.energy)
}

/// The physical tile a node occupies: synthesized bypass and SRAM nodes
/// co-locate with their origin tile.
pub fn tile_of(name: &str) -> &str {
    for suffix in ["_bypalt", "_byp", "_ld_sram", "_st_sram"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            return stem;
        }
    }
    name
}

/// Capture the per-node voltage assignment.
pub fn snapshot(dfg: &Dfg) -> BTreeMap<String, f64> {
    dfg.node_names()
        .into_iter()
        .map(|name| {
            let v = dfg.get_node(&name).expect("name from the graph").voltage;
            (name, v)
        })
        .collect()
}

/// Reapply a captured voltage assignment.
pub fn restore(dfg: &mut Dfg, snap: &BTreeMap<String, f64>) -> Result<(), Diagnostic> {
    for (name, &v) in snap {
        dfg.get_node_mut(name)
            .ok_or_else(|| {
                Diagnostic::error(format!("unknown node '{}' in snapshot", name), Span::dummy())
            })?
            .set_voltage(v)?;
    }
    Ok(())
}

/// Set every node of a group to one mode.
pub fn set_group(dfg: &mut Dfg, names: &[String], mode: DvfsMode) -> Result<(), Diagnostic> {
    for name in names {
        dfg.get_node_mut(name)
            .ok_or_else(|| {
                Diagnostic::error(format!("unknown node '{}' in group", name), Span::dummy())
            })?
            .set_mode(mode);
    }
    Ok(())
}

/// Phase 1: partition the nodes into singly-chained runs and singletons.
///
/// A node is singly-chained when it has exactly one predecessor and one
/// successor; maximal runs of such nodes form one group and everything
/// else is a singleton. The result partitions the node set.
pub fn group_nodes(dfg: &Dfg) -> BTreeMap<usize, Vec<String>> {
    let singly =
        |name: &str| dfg.get_srcs(name).len() == 1 && dfg.get_dsts(name).len() == 1;

    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut key = 0usize;

    for name in dfg.node_names() {
        if seen.contains(&name) {
            continue;
        }
        let mut members = vec![name.clone()];
        if singly(&name) {
            let mut cur = name.clone();
            loop {
                let next = dfg.get_dsts(&cur).remove(0);
                if seen.contains(&next) || members.contains(&next) || !singly(&next) {
                    break;
                }
                members.push(next.clone());
                cur = next;
            }
            let mut back = Vec::new();
            let mut cur = name.clone();
            loop {
                let prev = dfg.get_srcs(&cur).remove(0);
                if seen.contains(&prev)
                    || members.contains(&prev)
                    || back.contains(&prev)
                    || !singly(&prev)
                {
                    break;
                }
                back.push(prev.clone());
                cur = prev;
            }
            back.reverse();
            back.append(&mut members);
            members = back;
        }
        for m in &members {
            seen.insert(m.clone());
        }
        groups.insert(key, members);
        key += 1;
    }

    let total: usize = groups.values().map(|g| g.len()).sum();
    assert_eq!(total, dfg.len(), "groups must partition the node set");
    groups
}

pub struct Autosearch {
    power: PowerModel,
    config: SearchConfig,
}

impl Autosearch {
    pub fn new(power: PowerModel, config: SearchConfig) -> Self {
        Self { power, config }
    }

    /// Evaluate the current assignment with the configured token budget.
    pub fn measure(&mut self, dfg: &Dfg) -> Result<Measurement, Diagnostic> {
        self.power.measure(dfg, self.config.max_tokens)
    }

    /// Run the full search and return the final assignment. The graph's
    /// structure is never touched; only node operating points move.
    pub fn run(&mut self, dfg: &mut Dfg) -> Result<SearchOutcome, Diagnostic> {
        let groups = group_nodes(dfg);

        for names in groups.values() {
            set_group(dfg, names, DvfsMode::Nominal)?;
        }
        let baseline = self.measure(dfg)?;

        let (modes, accepted) = if self.config.skip_search {
            let modes = self.load_phase2(dfg)?;
            let accepted = self.measure(dfg)?;
            (modes, accepted)
        } else {
            let (modes, accepted) = self.phase2(dfg, &groups, baseline)?;
            self.write_artifact("pre", "nodes", nodes_value(dfg))?;
            self.write_artifact("pre", "groups", groups_value(&modes))?;
            (modes, accepted)
        };

        let accepted = self.phase3(dfg, accepted)?;
        self.write_artifact("final", "nodes", nodes_value(dfg))?;

        if let Some(input) = self.config.input.clone() {
            reader::dump_dvfs(dfg, &input, &self.config.suffix)?;
        }

        Ok(SearchOutcome {
            nodes: snapshot(dfg),
            groups: modes,
            baseline,
            accepted,
        })
    }

    /// Phase 2: one greedy pass over the groups in ascending key order.
    /// Every trial is judged against the previously accepted state.
    fn phase2(
        &mut self,
        dfg: &mut Dfg,
        groups: &BTreeMap<usize, Vec<String>>,
        baseline: Measurement,
    ) -> Result<(BTreeMap<usize, DvfsMode>, Measurement), Diagnostic> {
        let mut modes: BTreeMap<usize, DvfsMode> = BTreeMap::new();

        if self.config.energy_first {
            for &k in groups.keys() {
                modes.insert(k, DvfsMode::Nominal);
            }
            let mut accepted = baseline;
            for (&k, names) in groups {
                set_group(dfg, names, DvfsMode::Rest)?;
                let trial = self.measure(dfg)?;
                if ed_product(&trial, &accepted) > 1.0 {
                    modes.insert(k, DvfsMode::Rest);
                    accepted = trial;
                } else {
                    set_group(dfg, names, DvfsMode::Nominal)?;
                }
            }
            return Ok((modes, accepted));
        }

        for (&k, names) in groups {
            set_group(dfg, names, DvfsMode::Sprint)?;
            modes.insert(k, DvfsMode::Sprint);
        }
        let mut accepted = self.measure(dfg)?;

        for (&k, names) in groups {
            set_group(dfg, names, DvfsMode::Rest)?;
            let trial = self.measure(dfg)?;
            let product = ed_product(&trial, &accepted);
            if product > 1.0 {
                modes.insert(k, DvfsMode::Rest);
                accepted = trial;
                continue;
            }
            if product < PHASE2_SLACK {
                set_group(dfg, names, DvfsMode::Nominal)?;
                let trial = self.measure(dfg)?;
                if ed_product(&trial, &accepted) > 1.0 {
                    modes.insert(k, DvfsMode::Nominal);
                    accepted = trial;
                    continue;
                }
            }
            set_group(dfg, names, DvfsMode::Sprint)?;
        }
        Ok((modes, accepted))
    }

    /// Phase 3: force every tile's nodes onto one voltage. Candidates are
    /// measured against the accepted state; among candidates within 1% of
    /// the best ED product the highest voltage wins.
    pub fn phase3(
        &mut self,
        dfg: &mut Dfg,
        mut accepted: Measurement,
    ) -> Result<Measurement, Diagnostic> {
        let mut tiles: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in dfg.node_names() {
            tiles
                .entry(tile_of(&name).to_string())
                .or_default()
                .push(name);
        }

        for names in tiles.values() {
            let voltages: Vec<f64> = names
                .iter()
                .map(|n| dfg.get_node(n).expect("name from the graph").voltage)
                .collect();
            if voltages
                .windows(2)
                .all(|w| (w[0] - w[1]).abs() < 1e-9)
            {
                continue;
            }

            let mut candidates: Vec<DvfsMode> = Vec::new();
            if self.config.energy_first {
                candidates.push(DvfsMode::Rest);
                candidates.push(DvfsMode::Nominal);
            } else {
                if voltages.iter().any(|&v| v < 0.65) {
                    candidates.push(DvfsMode::Rest);
                }
                if voltages.iter().all(|&v| v < 0.95) {
                    candidates.push(DvfsMode::Nominal);
                } else {
                    candidates.push(DvfsMode::Nominal);
                    candidates.push(DvfsMode::Sprint);
                }
            }

            let saved = snapshot(dfg);
            let mut trials: Vec<(DvfsMode, Measurement, f64)> = Vec::new();
            for &mode in &candidates {
                set_group(dfg, names, mode)?;
                let m = self.measure(dfg)?;
                let product = ed_product(&m, &accepted);
                trials.push((mode, m, product));
            }
            restore(dfg, &saved)?;

            let best = trials
                .iter()
                .map(|(_, _, p)| *p)
                .fold(f64::NEG_INFINITY, f64::max);
            let (mode, measurement, _) = trials
                .iter()
                .filter(|(_, _, p)| *p >= best * (1.0 - COLOCATION_TOLERANCE))
                .max_by(|a, b| a.0.voltage().total_cmp(&b.0.voltage()))
                .expect("at least one co-location candidate");

            set_group(dfg, names, *mode)?;
            accepted = *measurement;
        }

        Ok(accepted)
    }

    fn artifact(&self, phase: &str, kind: &str) -> Option<PathBuf> {
        self.config.artifacts.as_ref().map(|stem| {
            let eeff = if self.config.energy_first { ".eeff" } else { "" };
            PathBuf::from(format!("{}.{}{}.{}", stem.display(), phase, eeff, kind))
        })
    }

    fn write_artifact(
        &self,
        phase: &str,
        kind: &str,
        value: serde_json::Value,
    ) -> Result<(), Diagnostic> {
        if let Some(path) = self.artifact(phase, kind) {
            reader::write_sorted_json(&path, &value)?;
        }
        Ok(())
    }

    /// Reload the Phase-2 artifacts written by a previous run.
    fn load_phase2(&self, dfg: &mut Dfg) -> Result<BTreeMap<usize, DvfsMode>, Diagnostic> {
        let nodes_path = self.artifact("pre", "nodes").ok_or_else(|| {
            Diagnostic::error(
                "skip_search requires an artifact stem".to_string(),
                Span::dummy(),
            )
        })?;
        let groups_path = self
            .artifact("pre", "groups")
            .expect("stem present, checked above");

        let nodes = reader::read_json_file(&nodes_path)?;
        let map = nodes.as_object().ok_or_else(|| {
            Diagnostic::error(
                format!("'{}' is not a voltage map", nodes_path.display()),
                Span::dummy(),
            )
        })?;
        for (name, v) in map {
            let v = v.as_f64().ok_or_else(|| {
                Diagnostic::error(
                    format!("non-numeric voltage for '{}'", name),
                    Span::dummy(),
                )
            })?;
            dfg.get_node_mut(name)
                .ok_or_else(|| {
                    Diagnostic::error(
                        format!("artifact names unknown node '{}'", name),
                        Span::dummy(),
                    )
                })?
                .set_voltage(v)?;
        }

        let groups = reader::read_json_file(&groups_path)?;
        let map = groups.as_object().ok_or_else(|| {
            Diagnostic::error(
                format!("'{}' is not a group map", groups_path.display()),
                Span::dummy(),
            )
        })?;
        let mut modes = BTreeMap::new();
        for (k, label) in map {
            let key: usize = k.parse().map_err(|_| {
                Diagnostic::error(format!("bad group key '{}'", k), Span::dummy())
            })?;
            let mode = label
                .as_str()
                .and_then(DvfsMode::from_label)
                .ok_or_else(|| {
                    Diagnostic::error(format!("bad group mode for '{}'", k), Span::dummy())
                })?;
            modes.insert(key, mode);
        }
        Ok(modes)
    }
}

fn nodes_value(dfg: &Dfg) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, v) in snapshot(dfg) {
        map.insert(name, serde_json::Value::from(v));
    }
    serde_json::Value::Object(map)
}

fn groups_value(modes: &BTreeMap<usize, DvfsMode>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (k, mode) in modes {
        map.insert(
            k.to_string(),
            serde_json::Value::String(mode.label().to_string()),
        );
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfg::toys;
    use crate::sim::Simulator;

    fn searcher(config: SearchConfig) -> Autosearch {
        Autosearch::new(PowerModel::new(Simulator::new(false)), config)
    }

    #[test]
    fn test_grouping_chain() {
        let dfg = toys::chain();
        let groups = group_nodes(&dfg);
        let members: Vec<Vec<String>> = groups.values().cloned().collect();
        assert_eq!(
            members,
            [
                vec!["s".to_string()],
                vec!["a".to_string(), "b".to_string()],
                vec!["t".to_string()],
            ]
        );
    }

    #[test]
    fn test_grouping_ring_is_one_group() {
        let dfg = toys::ring();
        let groups = group_nodes(&dfg);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&0].len(), 7);
    }

    #[test]
    fn test_grouping_diamond_is_singletons() {
        let dfg = toys::branch_diamond();
        let groups = group_nodes(&dfg);
        assert_eq!(groups.len(), 7);
        assert!(groups.values().all(|g| g.len() == 1));
    }

    #[test]
    fn test_tile_of_strips_synthesized_suffixes() {
        assert_eq!(tile_of("t3_2"), "t3_2");
        assert_eq!(tile_of("t3_2_byp"), "t3_2");
        assert_eq!(tile_of("t3_2_bypalt"), "t3_2");
        assert_eq!(tile_of("t3_2_ld_sram"), "t3_2");
        assert_eq!(tile_of("t3_2_st_sram"), "t3_2");
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut dfg = toys::chain();
        let before = snapshot(&dfg);
        dfg.get_node_mut("a").unwrap().set_mode(DvfsMode::Sprint);
        dfg.get_node_mut("b").unwrap().set_mode(DvfsMode::Rest);
        restore(&mut dfg, &before).unwrap();
        assert_eq!(snapshot(&dfg), before);
        assert_eq!(dfg.get_node("a").unwrap().period, 1.0);
    }

    #[test]
    fn test_ed_product_identity() {
        let m = Measurement {
            throughput: 1.0,
            latency: 50.0,
            power: 10.0,
            energy: 500.0,
        };
        assert_eq!(ed_product(&m, &m), 1.0);
    }

    #[test]
    fn test_performance_first_beats_baseline() {
        let mut dfg = toys::chain_n(10);
        let mut search = searcher(SearchConfig::default());
        let outcome = search.run(&mut dfg).unwrap();
        let product = ed_product(&outcome.accepted, &outcome.baseline);
        assert!(
            product >= 1.0 - 1e-9,
            "final assignment must not lose to all-nominal, got {}",
            product
        );
    }

    #[test]
    fn test_energy_first_beats_baseline() {
        let mut dfg = toys::chain_n(6);
        let mut search = searcher(SearchConfig {
            energy_first: true,
            ..SearchConfig::default()
        });
        let outcome = search.run(&mut dfg).unwrap();
        let product = ed_product(&outcome.accepted, &outcome.baseline);
        assert!(product >= 1.0 - 1e-9);
        for v in outcome.nodes.values() {
            assert!(
                (*v - 0.61).abs() < 1e-9 || (*v - 0.90).abs() < 1e-9,
                "energy-first never sprints, got {}",
                v
            );
        }
    }

    #[test]
    fn test_search_is_reproducible() {
        let mut a = toys::chain_n(6);
        let mut b = toys::chain_n(6);
        let out_a = searcher(SearchConfig::default()).run(&mut a).unwrap();
        let out_b = searcher(SearchConfig::default()).run(&mut b).unwrap();
        assert_eq!(out_a.nodes, out_b.nodes);
    }

    #[test]
    fn test_phase3_colocates_bypass_with_tile() {
        let mut dfg = Dfg::new();
        for (name, op) in [
            ("t0_0", crate::params::OpClass::Mul),
            ("t1_0", crate::params::OpClass::Mul),
            ("t1_0_byp", crate::params::OpClass::Byp),
        ] {
            dfg.add_node(crate::dfg::Node::new(name, op, DvfsMode::Nominal))
                .unwrap();
        }
        dfg.connect("t0_0", "t1_0", false).unwrap();
        dfg.connect("t1_0", "t1_0_byp", false).unwrap();
        dfg.get_node_mut("t1_0").unwrap().set_mode(DvfsMode::Sprint);
        dfg.get_node_mut("t1_0_byp").unwrap().set_mode(DvfsMode::Rest);

        let mut search = searcher(SearchConfig::default());
        let accepted = search.measure(&dfg).unwrap();
        search.phase3(&mut dfg, accepted).unwrap();

        let v_tile = dfg.get_node("t1_0").unwrap().voltage;
        let v_byp = dfg.get_node("t1_0_byp").unwrap().voltage;
        assert_eq!(v_tile, v_byp, "tile and bypass must share a voltage");
        assert!(DvfsMode::from_voltage(v_tile).is_some());
        assert_eq!(dfg.get_node("t0_0").unwrap().voltage, 0.90);
    }

    #[test]
    fn test_group_modes_recorded() {
        let mut dfg = toys::chain();
        let mut search = searcher(SearchConfig::default());
        let outcome = search.run(&mut dfg).unwrap();
        let groups = group_nodes(&dfg);
        assert_eq!(outcome.groups.len(), groups.len());
    }
}
