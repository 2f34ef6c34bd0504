//! Discrete-event elastic token-flow engine.
//!
//! Each node fires when every input holds a token, propagates one token
//! per outgoing wire with a delay equal to its own period, and applies
//! backpressure through bounded two-slot input queues. Wires are double
//! buffered: nodes read real tokens and write shadow tokens, and the
//! shadow generation becomes visible only when global time advances, so
//! a token crosses at most one hop per time step regardless of graph
//! diameter.

pub mod node;
pub mod token;

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};

use petgraph::stable_graph::{EdgeIndex, NodeIndex};

use crate::dfg::{Dfg, EdgeKind};
use crate::diagnostic::{Diagnostic, Span};
use crate::params::OpClass;
use node::SimNode;
use token::{EdgeState, Token};

/// Token budget for a steady-state measurement.
pub const DEFAULT_MAX_TOKENS: u64 = 50;

/// Wall-clock guard: a run past this global time reports a timeout.
pub const DEFAULT_MAX_TIME: f64 = 10_000.0;

/// Steady-state measurement of one run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Perf {
    /// Tokens per normalized cycle, read from the first live-in.
    pub throughput: f64,
    /// Global time when the token budget was reached.
    pub latency: f64,
}

/// Heap entry: earliest time first, then reverse-topological rank so
/// sinks process their tokens before sources refill.
#[derive(Clone, Copy, Debug)]
struct Event {
    time: f64,
    rank: usize,
    node: NodeIndex,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.rank.cmp(&other.rank))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sprint ticks come in threes: 0.66 + 0.66 + 0.66 lands on x.98, the
/// synchronous boundary with the nominal clock. Snap it onto the integer
/// so the two clock domains stay rationally aligned.
fn snap_time(time: f64, period: f64) -> f64 {
    if (period - 0.66).abs() < 1e-9 {
        let fract = time - time.floor();
        if (fract - 0.98).abs() < 0.005 {
            return time.round();
        }
    }
    time
}

pub struct Simulator {
    /// Allow a second in-flight token into a length-1 queue in the same
    /// step. Off by default.
    pub pipelining: bool,
    pub max_time: f64,
    global_time: f64,
    nodes: BTreeMap<NodeIndex, SimNode>,
    edges: BTreeMap<EdgeIndex, EdgeState>,
    rank: BTreeMap<NodeIndex, usize>,
    heap: BinaryHeap<Reverse<Event>>,
    timed_out: bool,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Simulator {
    pub fn new(pipelining: bool) -> Self {
        Self {
            pipelining,
            max_time: DEFAULT_MAX_TIME,
            global_time: 0.0,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            rank: BTreeMap::new(),
            heap: BinaryHeap::new(),
            timed_out: false,
        }
    }

    pub fn global_time(&self) -> f64 {
        self.global_time
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Build the per-node and per-edge state from the graph structure.
    fn build(&mut self, dfg: &Dfg) -> Result<(), Diagnostic> {
        let order = dfg.topological_sort()?;
        self.rank.clear();
        for (i, &idx) in order.iter().rev().enumerate() {
            self.rank.insert(idx, i);
        }

        let liveins: BTreeSet<NodeIndex> = dfg.get_liveins().into_iter().collect();
        let liveouts: BTreeSet<NodeIndex> = dfg.get_liveouts().into_iter().collect();

        self.nodes.clear();
        self.edges.clear();
        for idx in dfg.all_nodes() {
            let fanin = dfg.fanin(idx);
            let slots = fanin.len();
            self.nodes.insert(
                idx,
                SimNode {
                    idx,
                    period: dfg.node(idx).period,
                    fanin,
                    fanout: dfg.fanout(idx),
                    queues: vec![VecDeque::new(); slots],
                    shadow_queues: vec![VecDeque::new(); slots],
                    token_counter: 1,
                    pipewait: false,
                    time: 0.0,
                    live_in: liveins.contains(&idx),
                    live_out: liveouts.contains(&idx),
                    live_out_token: Token::default(),
                },
            );
        }
        for e in dfg.all_edges() {
            self.edges.insert(e, EdgeState::default());
        }
        Ok(())
    }

    /// Zero time, clear all per-run state, seed recurrence edges and phi
    /// fanout, and schedule every node at time 0.
    pub fn reset(&mut self, dfg: &Dfg) -> Result<(), Diagnostic> {
        let structure_current = self.nodes.len() == dfg.len()
            && self.edges.len() == dfg.all_edges().count()
            && dfg.all_nodes().all(|i| self.nodes.contains_key(&i));
        if !structure_current {
            self.build(dfg)?;
        }

        self.global_time = 0.0;
        self.timed_out = false;
        for idx in dfg.all_nodes() {
            let sn = self.nodes.get_mut(&idx).expect("structure built above");
            sn.reset();
            sn.period = dfg.node(idx).period;
        }
        for st in self.edges.values_mut() {
            st.clear();
        }

        self.heap.clear();
        for (&idx, _) in &self.nodes {
            self.heap.push(Reverse(Event {
                time: 0.0,
                rank: self.rank[&idx],
                node: idx,
            }));
        }

        // Seed declared back-edges so cycles start live.
        for e in dfg.all_edges() {
            if dfg.edge_kind(e) == EdgeKind::Recurrence {
                let st = self.edges.get_mut(&e).expect("structure built above");
                st.real.guarded_set(1, 0.0, 0.0);
                st.shadow.guarded_set(1, 0.0, 0.0);
            }
        }

        // Phi headers inject one initial iteration on their fanout.
        for idx in dfg.all_nodes() {
            if dfg.node(idx).op != OpClass::Phi {
                continue;
            }
            let (period, fanout) = {
                let sn = &self.nodes[&idx];
                (sn.period, sn.fanout.clone())
            };
            for (_, e) in fanout {
                let st = self.edges.get_mut(&e).expect("structure built above");
                st.real.guarded_set(1, 0.0, period);
                st.shadow.guarded_set(1, 0.0, period);
            }
        }

        Ok(())
    }

    /// Run until any live-in's token counter exceeds the budget, or the
    /// time guard trips. Returns the steady-state measurement.
    pub fn run(&mut self, dfg: &Dfg, max_tokens: u64) -> Result<Perf, Diagnostic> {
        self.reset(dfg)?;

        let liveins = dfg.get_liveins();
        if liveins.is_empty() {
            return Err(Diagnostic::error(
                "graph has no live-in to measure".to_string(),
                Span::dummy(),
            ));
        }

        loop {
            if liveins
                .iter()
                .any(|i| self.nodes[i].token_counter > max_tokens)
            {
                break;
            }
            let Some(Reverse(ev)) = self.heap.pop() else {
                break;
            };
            if ev.time > self.global_time {
                self.advance_to(ev.time);
                if self.global_time > self.max_time {
                    self.timed_out = true;
                    Diagnostic::warning(
                        format!("simulation exceeded max time {}", self.max_time),
                        Span::dummy(),
                    )
                    .with_note(format!("global time {}", self.global_time))
                    .emit();
                    break;
                }
            }
            self.tick(ev.node);
            let sn = self.nodes.get_mut(&ev.node).expect("scheduled node exists");
            sn.time = snap_time(sn.time + sn.period, sn.period);
            let time = sn.time;
            self.heap.push(Reverse(Event {
                time,
                rank: self.rank[&ev.node],
                node: ev.node,
            }));
        }

        let counter = self.nodes[&liveins[0]].token_counter;
        let throughput = if self.global_time > 0.0 {
            counter as f64 / self.global_time
        } else {
            0.0
        };
        Ok(Perf {
            throughput,
            latency: self.global_time,
        })
    }

    /// Commit the shadow generation: wires, input queues, pipewait.
    fn advance_to(&mut self, time: f64) {
        for st in self.edges.values_mut() {
            st.commit();
        }
        for sn in self.nodes.values_mut() {
            sn.commit_queues();
            sn.pipewait = false;
        }
        self.global_time = time;
    }

    /// One tick of a node: drain elapsed outputs downstream, retire
    /// consumed inputs (refiring on a still-live tail), and produce a
    /// fresh token if this is a live-in.
    fn tick(&mut self, n: NodeIndex) {
        let now = self.global_time;
        let fanout = self.nodes[&n].fanout.clone();

        // 1. Output drain.
        for &(dst, e) in &fanout {
            let Some(value) = self.edges[&e].real.read(now) else {
                continue;
            };
            if !self.nodes[&dst].ready(n, self.pipelining) {
                continue;
            }
            self.push(dst, n, value);
            let st = self.edges.get_mut(&e).expect("edge state exists");
            st.clear();
            self.nodes.get_mut(&n).expect("ticked node exists").pipewait = true;
        }
        if self.nodes[&n].live_out && self.nodes[&n].live_out_token.readable_at(now) {
            // the implicit store SRAM drains the terminal token
            self.nodes
                .get_mut(&n)
                .expect("ticked node exists")
                .live_out_token
                .clear();
        }

        // 2. Input dequeue, with an immediate refire on a live tail.
        if !self.nodes[&n].fanin.is_empty() {
            let outputs_clear = fanout.iter().all(|(_, e)| !self.edges[e].real.is_set())
                && !(self.nodes[&n].live_out && self.nodes[&n].live_out_token.is_set());
            if outputs_clear && self.nodes[&n].inputs_live() {
                let refire = {
                    let sn = self.nodes.get_mut(&n).expect("ticked node exists");
                    for q in &mut sn.queues {
                        q.pop_front();
                    }
                    for q in &mut sn.shadow_queues {
                        q.pop_front();
                    }
                    sn.inputs_live().then(|| {
                        sn.queues
                            .iter()
                            .filter_map(|q| q.front())
                            .copied()
                            .max()
                            .expect("all queues live")
                    })
                };
                if let Some(value) = refire {
                    self.fire(n, value);
                }
            }
        }

        // 3. Live-in production.
        if self.nodes[&n].live_in {
            let sn = &self.nodes[&n];
            let sink_only = sn.fanout.is_empty() && sn.live_out;
            let outputs_unset = if sink_only {
                !sn.live_out_token.is_set()
            } else {
                sn.fanout.iter().all(|(_, e)| !self.edges[e].shadow.is_set())
            };
            if outputs_unset && (sink_only || !sn.fanout.is_empty()) {
                let value = sn.token_counter;
                let period = sn.period;
                for (_, e) in fanout {
                    self.edges
                        .get_mut(&e)
                        .expect("edge state exists")
                        .shadow
                        .guarded_set(value, now, period);
                }
                let sn = self.nodes.get_mut(&n).expect("ticked node exists");
                if sink_only {
                    sn.live_out_token.guarded_set(value, now, period);
                }
                sn.token_counter += 1;
            }
        }
    }

    /// Enqueue a delivered token at a downstream node. If the target
    /// queue was empty and every shadow queue now holds a token, the node
    /// fires with the highest iteration index at the tails.
    fn push(&mut self, dst: NodeIndex, src: NodeIndex, value: u64) {
        let fire_value = {
            let sn = self.nodes.get_mut(&dst).expect("push targets a wired node");
            let slot = sn.queue_slot(src).expect("push from a wired predecessor");
            sn.shadow_queues[slot].push_back(value);
            let newly_live = sn.shadow_queues[slot].len() == 1;
            (newly_live && sn.shadow_inputs_live()).then(|| {
                sn.shadow_queues
                    .iter()
                    .filter_map(|q| q.front())
                    .copied()
                    .max()
                    .expect("all shadow queues live")
            })
        };
        if let Some(value) = fire_value {
            self.fire(dst, value);
        }
    }

    /// Emit one iteration: guard every outgoing shadow token (and the
    /// terminal token of a live-out) with this node's period.
    fn fire(&mut self, n: NodeIndex, value: u64) {
        let now = self.global_time;
        let (period, fanout, live_out) = {
            let sn = &self.nodes[&n];
            (sn.period, sn.fanout.clone(), sn.live_out)
        };
        for (_, e) in fanout {
            self.edges
                .get_mut(&e)
                .expect("edge state exists")
                .shadow
                .guarded_set(value, now, period);
        }
        if live_out {
            self.nodes
                .get_mut(&n)
                .expect("fired node exists")
                .live_out_token
                .guarded_set(value, now, period);
        }
    }
}
