//! Pod commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::output::{print_json, print_output, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PodsCommand {
    #[command(subcommand)]
    command: PodsSubcommand,
}

#[derive(Debug, Subcommand)]
enum PodsSubcommand {
    /// List launched pod instances.
    List,

    /// Show the tasks of a pod instance.
    Status(PodArgs),

    /// Kill a pod instance and relaunch it on its current resources.
    Restart(PodArgs),

    /// Kill a pod instance and relaunch it on new resources.
    Replace(PodArgs),
}

#[derive(Debug, Args)]
struct PodArgs {
    /// Pod instance name, e.g. node-0.
    pod: String,
}

impl PodsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            PodsSubcommand::List => list_pods(ctx).await,
            PodsSubcommand::Status(args) => pod_status(ctx, args).await,
            PodsSubcommand::Restart(args) => restart(ctx, args, "restart").await,
            PodsSubcommand::Replace(args) => restart(ctx, args, "replace").await,
        }
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GoalOverrideStatus {
    target: String,
    progress: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PodTask {
    name: String,
    id: String,
    #[serde(default)]
    state: Option<String>,
    goal_override: GoalOverrideStatus,
    #[serde(default)]
    permanently_failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PodStatus {
    name: String,
    tasks: Vec<PodTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PodRestart {
    pod: String,
    tasks: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct PodNameRow {
    #[tabled(rename = "Pod")]
    name: String,
}

/// One task row of `pods status`.
#[derive(Debug, Serialize, Tabled)]
struct TaskRow {
    #[tabled(rename = "Task")]
    name: String,

    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "State")]
    state: String,

    #[tabled(rename = "Override")]
    goal_override: String,

    #[tabled(rename = "Replace")]
    replace: String,
}

impl From<&PodTask> for TaskRow {
    fn from(task: &PodTask) -> Self {
        let goal_override = if task.goal_override.target == "NONE" {
            "-".to_string()
        } else {
            format!("{} ({})", task.goal_override.target, task.goal_override.progress)
        };
        Self {
            name: task.name.clone(),
            id: task.id.clone(),
            state: task.state.clone().unwrap_or_else(|| "-".to_string()),
            goal_override,
            replace: if task.permanently_failed { "yes" } else { "no" }.to_string(),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_pods(ctx: CommandContext) -> Result<()> {
    let names: Vec<String> = ctx.client.get("/v1/pods").await?;
    match ctx.format {
        OutputFormat::Json => print_json(&names),
        OutputFormat::Table => {
            let rows: Vec<PodNameRow> = names.into_iter().map(|name| PodNameRow { name }).collect();
            print_output(&rows, ctx.format);
        }
    }
    Ok(())
}

async fn pod_status(ctx: CommandContext, args: PodArgs) -> Result<()> {
    let status: PodStatus = ctx
        .client
        .get(&format!("/v1/pods/{}/status", args.pod))
        .await?;
    if let OutputFormat::Json = ctx.format {
        print_json(&status);
        return Ok(());
    }

    println!("{}", status.name.bold());
    let rows: Vec<TaskRow> = status.tasks.iter().map(TaskRow::from).collect();
    print_output(&rows, ctx.format);
    Ok(())
}

async fn restart(ctx: CommandContext, args: PodArgs, command: &str) -> Result<()> {
    let result: PodRestart = ctx
        .client
        .post(&format!("/v1/pods/{}/{command}", args.pod))
        .await?;
    match ctx.format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Table => {
            print_success(&format!("{command} {}: killed {}", result.pod, result.tasks.join(", ")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> PodStatus {
        serde_json::from_value(serde_json::json!({
            "name": "node-0",
            "tasks": [
                {
                    "name": "node-0-server",
                    "id": "node-0-server__01HV",
                    "state": "RUNNING",
                    "goal_override": {"target": "NONE", "progress": "COMPLETE"},
                    "permanently_failed": false
                },
                {
                    "name": "node-0-sidecar",
                    "id": "node-0-sidecar__01HV",
                    "goal_override": {"target": "DECOMMISSIONED", "progress": "IN_PROGRESS"},
                    "permanently_failed": true
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_task_rows() {
        let status = status();
        let rows: Vec<TaskRow> = status.tasks.iter().map(TaskRow::from).collect();

        assert_eq!(rows[0].state, "RUNNING");
        assert_eq!(rows[0].goal_override, "-");
        assert_eq!(rows[0].replace, "no");

        assert_eq!(rows[1].state, "-");
        assert_eq!(rows[1].goal_override, "DECOMMISSIONED (IN_PROGRESS)");
        assert_eq!(rows[1].replace, "yes");
    }
}
