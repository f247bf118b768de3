// ABOUTME: Read-only summary tables of an installation: nodes and components.
// ABOUTME: Rendered as aligned text columns or serialized as JSON.

use crate::cluster::NodeInfo;
use crate::components::ComponentStatus;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub nodes: Vec<NodeInfo>,
    pub components: Vec<ComponentStatus>,
}

impl Summary {
    fn node_rows(&self) -> Vec<[String; 3]> {
        self.nodes
            .iter()
            .map(|n| {
                [
                    n.ip.clone(),
                    n.state.clone(),
                    if n.manager { "yes" } else { "no" }.to_string(),
                ]
            })
            .collect()
    }

    fn component_rows(&self) -> Vec<[String; 3]> {
        self.components
            .iter()
            .map(|c| {
                let ports: Vec<_> = c.published_ports.iter().map(|p| p.to_string()).collect();
                [
                    c.name.clone(),
                    if ports.is_empty() {
                        "-".to_string()
                    } else {
                        ports.join(",")
                    },
                    c.replicas.to_string(),
                ]
            })
            .collect()
    }
}

fn write_table(f: &mut fmt::Formatter<'_>, header: [&str; 3], rows: &[[String; 3]]) -> fmt::Result {
    let mut widths = header.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    writeln!(
        f,
        "{:<w0$}  {:<w1$}  {}",
        header[0],
        header[1],
        header[2],
        w0 = widths[0],
        w1 = widths[1]
    )?;
    for row in rows {
        writeln!(
            f,
            "{:<w0$}  {:<w1$}  {}",
            row[0],
            row[1],
            row[2],
            w0 = widths[0],
            w1 = widths[1]
        )?;
    }
    Ok(())
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_table(f, ["IP", "STATE", "MANAGER"], &self.node_rows())?;
        writeln!(f)?;
        write_table(f, ["COMPONENT", "PORTS", "REPLICAS"], &self.component_rows())
    }
}
