// ABOUTME: Command implementations for the conductor CLI
// ABOUTME: Handles the run, validate and tasks subcommands

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::config::Config;
use crate::engine::{DependencyGraph, ExecutionError, ExecutionPlan, RunResults, RunSummary};
use crate::parser::Plan;
use crate::tasks::{TaskRegistry, Workspace};

/// JSON document written by `run --output`
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub plan: String,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    /// Set when a critical task ended the run early
    pub aborted_by: Option<String>,
    pub results: RunResults,
}

/// Execute a plan. Returns whether every task succeeded.
pub async fn run_plan(
    plan_path: PathBuf,
    variables: HashMap<String, String>,
    dry_run: bool,
    output: Option<PathBuf>,
    config: &Config,
) -> Result<bool> {
    info!("Loading plan: {}", plan_path.display());
    let plan = Plan::from_file(&plan_path)
        .await
        .with_context(|| format!("failed to load plan {}", plan_path.display()))?;

    let registry = TaskRegistry::with_builtins();
    let mut orchestrator = plan.build_with_config(&registry, config.engine.clone())?;

    if dry_run {
        let execution_plan = orchestrator.execution_plan()?;
        println!("Execution order for {}:", plan.name);
        for (position, task_id) in execution_plan.order.iter().enumerate() {
            println!("  {}. {}", position + 1, task_id);
        }
        info!("Dry run - plan validation successful");
        return Ok(true);
    }

    let run_config = merge_variables(config, &plan, variables);
    let workspace = Arc::new(workspace_for(&plan_path)?);

    let (aborted_by, results) = match orchestrator.run_all(workspace, run_config).await {
        Ok(results) => (None, results),
        Err(ExecutionError::CriticalTaskFailed { task_id, message }) => {
            error!("Run aborted by critical task {}: {}", task_id, message);
            (Some(task_id), orchestrator.get_all_results())
        }
        Err(e) => return Err(e).context("run could not start"),
    };

    println!("{}", orchestrator.render_summary().trim_end());

    let summary = results.summary();
    let succeeded = aborted_by.is_none() && !results.has_failures();

    if let Some(output_path) = output {
        let report = RunReport {
            plan: plan.name.clone(),
            finished_at: Utc::now(),
            summary,
            aborted_by,
            results,
        };
        write_report(&output_path, &report).await?;
        info!("Results written to {}", output_path.display());
    }

    if !succeeded {
        warn!("Plan {} finished with failures", plan.name);
    }
    Ok(succeeded)
}

/// Parse and build a plan, then print its execution order
pub async fn validate_plan(plan_path: PathBuf) -> Result<bool> {
    let plan = Plan::from_file(&plan_path)
        .await
        .with_context(|| format!("failed to load plan {}", plan_path.display()))?;
    let orchestrator = plan.build(&TaskRegistry::<Workspace>::with_builtins())?;
    let graph = orchestrator.dependency_graph();

    match graph.create_execution_plan() {
        Ok(execution_plan) => {
            print!("{}", describe_plan(&plan.name, &graph, &execution_plan));
            Ok(true)
        }
        Err(e) => {
            println!("Plan '{}' is invalid: {}", plan.name, e);
            Ok(false)
        }
    }
}

/// Order, entry and final tasks, and each task's direct neighbours
fn describe_plan(name: &str, graph: &DependencyGraph, execution_plan: &ExecutionPlan) -> String {
    let mut out = format!(
        "Plan '{}' is valid ({} tasks)\nExecution order: {}\nEntry tasks: {}\nFinal tasks: {}\n",
        name,
        execution_plan.total_tasks,
        execution_plan.order.join(" -> "),
        graph.get_root_tasks().join(", "),
        graph.get_leaf_tasks().join(", "),
    );

    for task_id in &execution_plan.order {
        let needs = graph.get_dependencies(task_id);
        let unblocks = graph.get_dependents(task_id);
        if needs.is_empty() && unblocks.is_empty() {
            continue;
        }

        let mut line = format!("  {}:", task_id);
        if !needs.is_empty() {
            line.push_str(&format!(" needs {}", needs.join(", ")));
        }
        if !unblocks.is_empty() {
            if !needs.is_empty() {
                line.push(';');
            }
            line.push_str(&format!(" unblocks {}", unblocks.join(", ")));
        }
        out.push_str(&line);
        out.push('\n');
    }

    out
}

pub fn list_tasks() -> Result<bool> {
    let registry = TaskRegistry::<Workspace>::with_builtins();
    println!("Available task types:");
    for task_type in registry.list_supported_tasks() {
        println!("  {}", task_type);
    }
    Ok(true)
}

/// Config variables, then plan variables, then command line overrides
fn merge_variables(config: &Config, plan: &Plan, overrides: HashMap<String, String>) -> Value {
    let mut merged = config.variables.clone();
    merged.extend(plan.variables.clone());
    merged.extend(overrides);

    Value::Object(
        merged
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    )
}

/// Tasks run relative to the directory holding the plan file
fn workspace_for(plan_path: &Path) -> Result<Workspace> {
    match plan_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(Workspace::new(dir)),
        _ => Workspace::current_dir().context("cannot determine current directory"),
    }
}

async fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize results")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write results to {}", path.display()))
}
