//! Graphviz dot emission for a DFG.
//!
//! Deterministic output: nodes in creation order, edges ordered by their
//! endpoints. Recurrence edges render dashed. PDF conversion is left to
//! external tooling.

use crate::dfg::{Dfg, EdgeKind};

pub fn write_dot(dfg: &Dfg) -> String {
    let mut out = String::new();
    out.push_str("digraph dfg {\n");
    out.push_str("    rankdir=LR;\n");
    out.push_str("    node [shape=box];\n");

    for idx in dfg.all_nodes() {
        let n = dfg.node(idx);
        out.push_str(&format!(
            "    \"{}\" [label=\"{}\\n{} V={:.2} T={:.2}\"];\n",
            n.name,
            n.name,
            n.op.name(),
            n.voltage,
            n.period
        ));
    }

    for idx in dfg.all_nodes() {
        let src = &dfg.node(idx).name;
        for (dst, e) in dfg.fanout(idx) {
            let attrs = match dfg.edge_kind(e) {
                EdgeKind::Data => "",
                EdgeKind::Recurrence => " [style=dashed]",
            };
            out.push_str(&format!(
                "    \"{}\" -> \"{}\"{};\n",
                src,
                dfg.node(dst).name,
                attrs
            ));
        }
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfg::{toys, Node};
    use crate::params::{DvfsMode, OpClass};

    #[test]
    fn test_two_node_dot() {
        let mut g = Dfg::new();
        g.add_node(Node::new("u", OpClass::Mul, DvfsMode::Nominal))
            .unwrap();
        g.add_node(Node::new("v", OpClass::Alu, DvfsMode::Rest))
            .unwrap();
        g.connect("u", "v", false).unwrap();
        insta::assert_snapshot!(write_dot(&g), @r###"
        digraph dfg {
            rankdir=LR;
            node [shape=box];
            "u" [label="u\nmul V=0.90 T=1.00"];
            "v" [label="v\nalu V=0.61 T=3.00"];
            "u" -> "v";
        }
        "###);
    }

    #[test]
    fn test_recurrence_renders_dashed() {
        let dot = write_dot(&toys::ring());
        assert!(dot.contains("\"6\" -> \"0\" [style=dashed];"));
        assert!(dot.contains("\"0\" -> \"1\";"));
    }

    #[test]
    fn test_dot_is_deterministic() {
        let g = toys::branch_diamond();
        assert_eq!(write_dot(&g), write_dot(&g));
    }
}
