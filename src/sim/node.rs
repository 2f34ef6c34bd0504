//! Per-node simulation state.

use std::collections::VecDeque;

use petgraph::stable_graph::{EdgeIndex, NodeIndex};

use crate::sim::token::Token;

/// Input queue capacity per predecessor.
pub const QUEUE_DEPTH: usize = 2;

/// Simulation wrapper around one graph node: bounded input queues (real
/// and shadow, like the wires), the live-in token counter, the pipewait
/// flag, and the node's next scheduled tick time.
#[derive(Clone, Debug)]
pub struct SimNode {
    pub idx: NodeIndex,
    pub period: f64,
    /// (source, edge) per predecessor, sorted by source index. Queue slot
    /// i belongs to fanin[i].
    pub fanin: Vec<(NodeIndex, EdgeIndex)>,
    pub fanout: Vec<(NodeIndex, EdgeIndex)>,
    pub queues: Vec<VecDeque<u64>>,
    pub shadow_queues: Vec<VecDeque<u64>>,
    pub token_counter: u64,
    pub pipewait: bool,
    pub time: f64,
    pub live_in: bool,
    pub live_out: bool,
    /// Output stand-in for terminal nodes: a live-out has no downstream
    /// wire, so its firings park here until the implicit SRAM drains them.
    pub live_out_token: Token,
}

impl SimNode {
    pub fn reset(&mut self) {
        for q in &mut self.queues {
            q.clear();
        }
        for q in &mut self.shadow_queues {
            q.clear();
        }
        self.token_counter = 1;
        self.pipewait = false;
        self.time = 0.0;
        self.live_out_token.clear();
    }

    pub fn queue_slot(&self, src: NodeIndex) -> Option<usize> {
        self.fanin.iter().position(|(s, _)| *s == src)
    }

    /// Backpressure check for an upstream push. Refuses a full queue, and
    /// refuses a second in-flight token in the same step unless
    /// pipelining is enabled.
    pub fn ready(&self, src: NodeIndex, pipelining: bool) -> bool {
        match self.queue_slot(src) {
            Some(i) => {
                let len = self.queues[i].len();
                if len >= QUEUE_DEPTH {
                    return false;
                }
                if len == 1 && self.pipewait && !pipelining {
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// Make this step's shadow queues visible.
    pub fn commit_queues(&mut self) {
        for (q, sq) in self.queues.iter_mut().zip(&self.shadow_queues) {
            q.clear();
            q.extend(sq.iter().copied());
        }
    }

    /// Every visible input queue holds a token.
    pub fn inputs_live(&self) -> bool {
        !self.queues.is_empty() && self.queues.iter().all(|q| !q.is_empty())
    }

    /// Every shadow input queue holds a token.
    pub fn shadow_inputs_live(&self) -> bool {
        !self.shadow_queues.is_empty() && self.shadow_queues.iter().all(|q| !q.is_empty())
    }
}
