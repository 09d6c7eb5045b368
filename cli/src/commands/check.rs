//! Check command - validate the config and print the session plan.

use anyhow::Result;
use k10ls_core::{Config, SessionSpec};
use serde::Serialize;

#[derive(Serialize)]
struct PlanEntry {
    context: String,
    target: String,
    namespace: String,
    address: String,
    ports: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kubectl: Option<String>,
}

impl From<&SessionSpec> for PlanEntry {
    fn from(spec: &SessionSpec) -> Self {
        Self {
            context: spec.context.clone(),
            target: spec.target.kind.to_string(),
            namespace: spec.namespace.clone(),
            address: spec.address.clone(),
            ports: spec.ports().iter().map(|p| p.to_string()).collect(),
            kubectl: spec.kubectl_command(),
        }
    }
}

pub fn run(config: &Config, json: bool) -> Result<()> {
    let plan: Vec<PlanEntry> = config.plan().iter().map(PlanEntry::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if plan.is_empty() {
        println!("No targets configured.");
        return Ok(());
    }

    println!(
        "{:<16} {:<28} {:<16} {:<15} PORTS",
        "CONTEXT", "TARGET", "NAMESPACE", "ADDRESS"
    );
    println!("{}", "-".repeat(90));

    for entry in &plan {
        println!(
            "{:<16} {:<28} {:<16} {:<15} {}",
            truncate(&entry.context, 16),
            truncate(&entry.target, 28),
            truncate(&entry.namespace, 16),
            entry.address,
            entry.ports.join(" ")
        );
        if let Some(cmd) = &entry.kubectl {
            println!("  {}", cmd);
        }
    }

    println!(
        "\nTotal: {} sessions across {} contexts, retry delay {}s",
        plan.len(),
        config.contexts.len(),
        config.retry_delay.as_secs()
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max - 1).collect();
        format!("{}…", kept)
    }
}
