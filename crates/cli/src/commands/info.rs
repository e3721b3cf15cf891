//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::ErrorPolicy;
use engine::{ChainSnapshot, NodeInfo, PointGroupInfo};

use super::{build_text_pipeline, discard, load_blueprint};
use crate::cli::InfoArgs;

/// Pipeline info for JSON output
#[derive(Serialize)]
struct PipelineInfo {
    data_type: String,
    error_policy: ErrorPolicy,
    trace_tap: bool,
    chain: ChainSnapshot,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    factories: Vec<FactoryInfo>,
}

#[derive(Serialize)]
struct FactoryInfo {
    name: String,
    description: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading pipeline info");

    let blueprint = load_blueprint(&args.config)?;
    let registry = stages::text_registry()?;
    let built = build_text_pipeline(&registry, &blueprint, discard())?;
    let chain = built.pipeline().describe();

    let factories = if args.factories {
        registry
            .describe()
            .into_iter()
            .map(|(name, description)| FactoryInfo {
                name: name.to_string(),
                description: description.to_string(),
            })
            .collect()
    } else {
        Vec::new()
    };

    if args.json {
        let info = PipelineInfo {
            data_type: blueprint.data_type.clone(),
            error_policy: blueprint.errors.policy,
            trace_tap: blueprint.diagnostics.trace_tap,
            chain,
            factories,
        };
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize pipeline info")?;
        println!("{}", json);
    } else {
        println!("Pipeline: {} ({})", chain.pipeline, blueprint.data_type);
        println!("   └─ Error policy: {}", blueprint.errors.policy.as_str());
        print_chain(&chain);

        if !factories.is_empty() {
            println!("Factories ({})", factories.len());
            for (i, factory) in factories.iter().enumerate() {
                println!(
                    "   {} {:<14} {}",
                    branch(i, factories.len()),
                    factory.name,
                    factory.description
                );
            }
            println!();
        }
    }

    Ok(())
}

/// Render a topology snapshot as a tree
pub(super) fn print_chain(chain: &ChainSnapshot) {
    println!("\nActive chain");
    println!("   {}", chain_line(&chain.active));

    println!("\nProcessors ({})", chain.registered.len());
    for (i, node) in chain.registered.iter().enumerate() {
        println!(
            "   {} {} (priority {}) {}{}",
            branch(i, chain.registered.len()),
            node.name,
            node.priority,
            node_state(node),
            taps_suffix(node)
        );
    }

    print_groups("Inputs", &chain.inputs);
    print_groups("Outputs", &chain.outputs);
    println!();
}

fn chain_line(active: &[NodeInfo]) -> String {
    active
        .iter()
        .map(|node| {
            if node.bypassed {
                format!("({})", node.name)
            } else {
                node.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn node_state(node: &NodeInfo) -> &'static str {
    match (node.enabled, node.bypassed) {
        (false, _) => "disabled",
        (true, true) => "bypassed",
        (true, false) => "enabled",
    }
}

fn taps_suffix(node: &NodeInfo) -> String {
    if node.taps.is_empty() {
        String::new()
    } else {
        format!(" taps: {}", node.taps.join(", "))
    }
}

fn print_groups(title: &str, groups: &[PointGroupInfo]) {
    println!("\n{} ({})", title, groups.len());
    for (i, group) in groups.iter().enumerate() {
        let points: Vec<String> = group
            .points
            .iter()
            .map(|(id, enabled)| {
                if *enabled {
                    id.clone()
                } else {
                    format!("{id} (disabled)")
                }
            })
            .collect();
        println!(
            "   {} {}{} [{}]",
            branch(i, groups.len()),
            group.name,
            if group.enabled { "" } else { " (disabled)" },
            points.join(", ")
        );
    }
}

fn branch(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "└─"
    } else {
        "├─"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::NodeRole;

    fn node(name: &str, role: NodeRole, bypassed: bool) -> NodeInfo {
        NodeInfo {
            name: name.into(),
            role,
            priority: 0,
            enabled: true,
            bypassed,
            taps: Vec::new(),
        }
    }

    #[test]
    fn test_chain_line_marks_bypassed() {
        let active = [
            node("head", NodeRole::Head, false),
            node("upper", NodeRole::Processor, true),
            node("lower", NodeRole::Processor, false),
            node("tail", NodeRole::Tail, false),
        ];
        assert_eq!(chain_line(&active), "head -> (upper) -> lower -> tail");
    }

    #[test]
    fn test_node_state() {
        let mut n = node("upper", NodeRole::Processor, true);
        assert_eq!(node_state(&n), "bypassed");
        n.enabled = false;
        assert_eq!(node_state(&n), "disabled");
    }
}
