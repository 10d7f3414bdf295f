//! Connect command implementation.
//!
//! A netlist lists the components with their channel counts and the
//! connections between their ports:
//!
//! ```yaml
//! components:
//!   - { name: A, cdim: 1 }
//!   - { name: C, cdim: 2 }
//! connections:
//!   - { from: [A, 0], to: [C, 0] }
//! ```
//!
//! Components can be referenced by name or by position.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use serde::Deserialize;
use tracing::info;

use qnet_algebra::{Circuit, Connection};

/// A component of a netlist.
#[derive(Debug, Clone, Deserialize)]
pub struct Component {
    /// Component name.
    pub name: String,
    /// Number of channels.
    pub cdim: usize,
}

/// Reference to a component by name or position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ComponentRef {
    /// Position in the component list.
    Index(usize),
    /// Component name.
    Name(String),
}

/// A connection from an output port to an input port.
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    /// Source component and output port.
    pub from: (ComponentRef, usize),
    /// Target component and input port.
    pub to: (ComponentRef, usize),
}

/// A network of components.
#[derive(Debug, Clone, Deserialize)]
pub struct Netlist {
    /// Components in channel order.
    pub components: Vec<Component>,
    /// Connections between component ports.
    #[serde(default)]
    pub connections: Vec<Link>,
}

impl Netlist {
    /// Parse a netlist from JSON (`json = true`) or YAML source.
    ///
    /// Component names must be unique.
    pub fn parse(source: &str, json: bool) -> Result<Self> {
        let netlist: Self = if json {
            serde_json::from_str(source).context("Invalid JSON netlist")?
        } else {
            serde_yaml_ng::from_str(source).context("Invalid YAML netlist")?
        };
        netlist.check_names()?;
        Ok(netlist)
    }

    fn check_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for component in &self.components {
            if !seen.insert(component.name.as_str()) {
                anyhow::bail!("Duplicate component name '{}'", component.name);
            }
        }
        Ok(())
    }

    fn resolve(&self, reference: &ComponentRef) -> Result<usize> {
        match reference {
            ComponentRef::Index(i) => Ok(*i),
            ComponentRef::Name(name) => self
                .components
                .iter()
                .position(|c| c.name == *name)
                .with_context(|| format!("Unknown component: '{name}'")),
        }
    }

    /// The component circuits and connections by position.
    pub fn resolve_connections(&self) -> Result<(Vec<Circuit>, Vec<Connection>)> {
        let circuits = self
            .components
            .iter()
            .map(|c| Circuit::symbol(c.name.as_str(), c.cdim))
            .collect();
        let connections = self
            .connections
            .iter()
            .map(|link| {
                Ok(Connection::new(
                    (self.resolve(&link.from.0)?, link.from.1),
                    (self.resolve(&link.to.0)?, link.to.1),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((circuits, connections))
    }

    /// Reduce the network to a single circuit expression.
    pub fn reduce(&self) -> Result<Circuit> {
        let (circuits, connections) = self.resolve_connections()?;
        Ok(qnet_algebra::connect(&circuits, &connections)?)
    }
}

/// Load a netlist from a JSON or YAML file.
fn load_netlist(path: &str) -> Result<Netlist> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        anyhow::bail!("File not found: {path}");
    }

    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?;

    let ext = path_obj.extension().and_then(|e| e.to_str()).unwrap_or("");
    Netlist::parse(&source, ext.eq_ignore_ascii_case("json"))
}

/// Execute the connect command.
pub fn execute(input: &str, blocks: bool) -> Result<()> {
    println!(
        "{} Connecting {}",
        style("→").cyan().bold(),
        style(input).green()
    );

    let netlist = load_netlist(input)?;
    println!(
        "  Loaded: {} components, {} connections",
        netlist.components.len(),
        netlist.connections.len()
    );

    let circuit = netlist.reduce()?;
    info!(cdim = circuit.cdim(), "network reduced");

    println!("{} Reduction complete", style("✓").green().bold());
    println!("  Channels: {}", circuit.cdim());
    if blocks {
        println!("  Blocks:   {:?}", circuit.block_structure());
    }
    println!();
    println!("{circuit}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_netlist_by_name() {
        let source = r"
components:
  - { name: A, cdim: 1 }
  - { name: B, cdim: 1 }
connections:
  - { from: [A, 0], to: [B, 0] }
";
        let netlist = Netlist::parse(source, false).unwrap();
        let expected = Circuit::symbol("B", 1)
            .series(&Circuit::symbol("A", 1))
            .unwrap();
        assert_eq!(netlist.reduce().unwrap(), expected);
    }

    #[test]
    fn test_json_netlist_by_index() {
        let source = r#"{
            "components": [{"name": "A", "cdim": 1}, {"name": "C", "cdim": 2}],
            "connections": [{"from": [0, 0], "to": [1, 0]}]
        }"#;
        let netlist = Netlist::parse(source, true).unwrap();
        let (_, connections) = netlist.resolve_connections().unwrap();
        assert_eq!(connections, vec![Connection::new((0, 0), (1, 0))]);
        assert_eq!(netlist.reduce().unwrap().cdim(), 2);
    }

    #[test]
    fn test_unconnected_netlist_is_concatenation() {
        let source = "components:\n  - { name: A, cdim: 2 }\n  - { name: B, cdim: 1 }\n";
        let netlist = Netlist::parse(source, false).unwrap();
        assert_eq!(netlist.reduce().unwrap().block_structure(), vec![2, 1]);
    }

    #[test]
    fn test_duplicate_component_names() {
        let source = r"
components:
  - { name: A, cdim: 1 }
  - { name: A, cdim: 2 }
connections:
  - { from: [A, 0], to: [1, 1] }
";
        let err = Netlist::parse(source, false).unwrap_err();
        assert!(err.to_string().contains("Duplicate component name 'A'"));
    }

    #[test]
    fn test_unknown_component() {
        let source = r"
components:
  - { name: A, cdim: 1 }
connections:
  - { from: [A, 0], to: [Z, 0] }
";
        let netlist = Netlist::parse(source, false).unwrap();
        let err = netlist.reduce().unwrap_err();
        assert!(err.to_string().contains("Unknown component"));
    }
}
