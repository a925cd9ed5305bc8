use std::fmt::{self, Write};
use std::path::Path;

use petgraph::visit::EdgeRef;

use super::*;

impl<F: Flavor> MoleculeGraph<F> {
    /// Graphviz DOT rendering, one node per atom and one line per unit of
    /// bond order.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        // writing into a String can not fail
        let _ = self.write_dot(&mut out);
        out
    }

    /// Writes [`to_dot`](Self::to_dot) to a file.
    pub fn save_dot(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.to_dot())
    }

    fn write_dot(&self, out: &mut impl Write) -> fmt::Result {
        writeln!(out, "graph Molecule {{")?;
        writeln!(out, "    layout=neato;")?;

        for (index, atom) in self.atoms() {
            let mut label = atom.kind.label();
            match atom.charge {
                0 => {}
                1 => label.push('+'),
                -1 => label.push('-'),
                c => write!(label, "{c:+}")?,
            }
            writeln!(
                out,
                "    {} [label=\"{}\", fontcolor=white, shape=circle, style=filled, fillcolor={}];",
                index.index(),
                label.replace('"', "\\\""),
                atom_color(&atom.kind)
            )?;
        }

        for edge in self.graph.edge_references() {
            let bond = edge.weight();
            let (style, extra) = bond_style(bond.order);
            let count = match bond.order {
                BondOrder::Double => 2,
                BondOrder::Triple => 3,
                _ => 1,
            };
            for _ in 0..count {
                writeln!(
                    out,
                    "    {} -- {} [style={style}, penwidth=2{extra}];",
                    edge.source().index(),
                    edge.target().index(),
                )?;
            }
        }

        writeln!(out, "}}")
    }
}

fn atom_color(kind: &AtomKind) -> &'static str {
    use crate::element::*;
    match kind.table_number() {
        Some(H) => "gray",
        Some(C) => "black",
        Some(N) => "blue",
        Some(O) => "red",
        Some(F) => "pink",
        Some(CL) => "darkgreen",
        Some(BR) => "brown",
        Some(S) => "gold",
        Some(P) => "orange",
        Some(PSEUDO) | Some(RSITE) | Some(TEMPLATE) => "purple",
        _ => "slategray",
    }
}

fn bond_style(order: BondOrder) -> (&'static str, &'static str) {
    match order {
        BondOrder::Aromatic => ("dashed", ", color=purple"),
        BondOrder::Query => ("dotted", ""),
        BondOrder::Zero | BondOrder::Coordination | BondOrder::Hydrogen => ("dotted", ", color=gray"),
        _ => ("solid", ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{C, O};

    #[test]
    fn test_dot_output() {
        let mut mol = Molecule::new();
        let c = mol.add_atom(Atom::element(C));
        let mut oxygen = Atom::element(O);
        oxygen.charge = -1;
        let o = mol.add_atom(oxygen);
        mol.add_bond(c, o, Bond::new(BondOrder::Double)).unwrap();

        let dot = mol.to_dot();
        assert!(dot.starts_with("graph Molecule {"));
        assert!(dot.contains("1 [label=\"O-\""));
        assert_eq!(dot.matches("0 -- 1").count(), 2);
    }
}
