//! Hand-built demonstration graphs.
//!
//! Small DFGs with known steady-state behavior, used by unit tests, the
//! end-to-end scenarios, and the benchmark target.

use crate::dfg::{Dfg, Node};
use crate::params::{DvfsMode, OpClass};

/// Four-node linear chain `s -> a -> b -> t`, all mul at nominal.
/// Steady-state throughput is one token per nominal cycle.
pub fn chain() -> Dfg {
    let mut g = Dfg::new();
    for name in ["s", "a", "b", "t"] {
        g.add_node(Node::new(name, OpClass::Mul, DvfsMode::Nominal))
            .expect("toy names are unique");
    }
    g.connect("s", "a", false).expect("toy nodes exist");
    g.connect("a", "b", false).expect("toy nodes exist");
    g.connect("b", "t", false).expect("toy nodes exist");
    g
}

/// Linear chain with `n` interior mul nodes `a1 .. an` between `s` and
/// `t`. The interior nodes are created first, so the mapping search
/// visits their group before the endpoints.
pub fn chain_n(n: usize) -> Dfg {
    let mut g = Dfg::new();
    for i in 1..=n {
        g.add_node(Node::new(format!("a{}", i), OpClass::Mul, DvfsMode::Nominal))
            .expect("toy names are unique");
    }
    g.add_node(Node::new("s", OpClass::Mul, DvfsMode::Nominal))
        .expect("toy names are unique");
    g.add_node(Node::new("t", OpClass::Mul, DvfsMode::Nominal))
        .expect("toy names are unique");
    g.connect("s", "a1", false).expect("toy nodes exist");
    for i in 1..n {
        g.connect(&format!("a{}", i), &format!("a{}", i + 1), false)
            .expect("toy nodes exist");
    }
    g.connect(&format!("a{}", n), "t", false)
        .expect("toy nodes exist");
    g
}

/// Seven-node loop `0 -> 1 -> ... -> 6` with the back-edge `6 -> 0`
/// declared as a recurrence. Node 0 is the phi loop header; the seed
/// token placed on the back-edge at reset keeps the cycle live.
pub fn ring() -> Dfg {
    let ops = [
        OpClass::Phi,
        OpClass::Mul,
        OpClass::Alu,
        OpClass::Alu,
        OpClass::Mul,
        OpClass::Alu,
        OpClass::Cp,
    ];
    let mut g = Dfg::new();
    for (i, op) in ops.into_iter().enumerate() {
        g.add_node(Node::new(i.to_string(), op, DvfsMode::Nominal))
            .expect("toy names are unique");
    }
    for i in 0..6 {
        g.connect(&i.to_string(), &(i + 1).to_string(), false)
            .expect("toy nodes exist");
    }
    g.connect("6", "0", true).expect("toy nodes exist");
    g
}

/// Diamond with a branch: `s` fans out to a compare and a compute, the
/// branch steers to two arms, both arms rejoin at `t`.
pub fn branch_diamond() -> Dfg {
    let nodes = [
        ("s", OpClass::Cp),
        ("a", OpClass::Alu),
        ("c", OpClass::Cmp),
        ("br", OpClass::Br),
        ("x", OpClass::Alu),
        ("y", OpClass::Cp),
        ("t", OpClass::Alu),
    ];
    let mut g = Dfg::new();
    for (name, op) in nodes {
        g.add_node(Node::new(name, op, DvfsMode::Nominal))
            .expect("toy names are unique");
    }
    for (u, v) in [
        ("s", "a"),
        ("s", "c"),
        ("a", "br"),
        ("c", "br"),
        ("br", "x"),
        ("br", "y"),
        ("x", "t"),
        ("y", "t"),
    ] {
        g.connect(u, v, false).expect("toy nodes exist");
    }
    g
}
