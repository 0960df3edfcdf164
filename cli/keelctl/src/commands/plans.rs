//! Plan commands.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::CommandOutcome;
use crate::output::{colorize_status, print_info, print_json, print_output, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PlansCommand {
    #[command(subcommand)]
    command: PlansSubcommand,
}

#[derive(Debug, Subcommand)]
enum PlansSubcommand {
    /// List plan names.
    List,

    /// Show a plan with all of its phases and steps.
    Show(PlanArgs),

    /// Show the summary status of a plan.
    Status(PlanArgs),

    /// Start a plan, restarting it first if it is complete.
    Start(StartArgs),

    /// Interrupt a plan and reset it to pending.
    Stop(PlanArgs),

    /// Let an interrupted plan or phase proceed.
    Continue(PhaseArgs),

    /// Interrupt a plan or phase without resetting it.
    Interrupt(PhaseArgs),

    /// Mark a step complete without running it.
    ForceComplete(StepArgs),

    /// Reset a plan, phase or step to pending.
    Restart(RestartArgs),
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Plan name.
    plan: String,
}

#[derive(Debug, Args)]
struct StartArgs {
    /// Plan name.
    plan: String,

    /// Parameters handed to launched tasks, as KEY=VALUE.
    #[arg(short, long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,
}

#[derive(Debug, Args)]
struct PhaseArgs {
    /// Plan name.
    plan: String,

    /// Phase ID or name.
    #[arg(long)]
    phase: Option<String>,
}

#[derive(Debug, Args)]
struct StepArgs {
    /// Plan name.
    plan: String,

    /// Phase ID or name.
    #[arg(long)]
    phase: String,

    /// Step ID or name.
    #[arg(long)]
    step: String,
}

#[derive(Debug, Args)]
struct RestartArgs {
    /// Plan name.
    plan: String,

    /// Phase ID or name.
    #[arg(long)]
    phase: Option<String>,

    /// Step ID or name; requires --phase.
    #[arg(long, requires = "phase")]
    step: Option<String>,
}

impl PlansCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            PlansSubcommand::List => list_plans(ctx).await,
            PlansSubcommand::Show(args) => show_plan(ctx, args).await,
            PlansSubcommand::Status(args) => plan_status(ctx, args).await,
            PlansSubcommand::Start(args) => start_plan(ctx, args).await,
            PlansSubcommand::Stop(args) => {
                send(&ctx, &args.plan, "stop", &[], None).await
            }
            PlansSubcommand::Continue(args) => {
                let query = optional_query(&[("phase", &args.phase)]);
                send(&ctx, &args.plan, "continue", &query, None).await
            }
            PlansSubcommand::Interrupt(args) => {
                let query = optional_query(&[("phase", &args.phase)]);
                send(&ctx, &args.plan, "interrupt", &query, None).await
            }
            PlansSubcommand::ForceComplete(args) => {
                let query = [("phase", args.phase.as_str()), ("step", args.step.as_str())];
                send(&ctx, &args.plan, "forceComplete", &query, None).await
            }
            PlansSubcommand::Restart(args) => {
                let query = optional_query(&[("phase", &args.phase), ("step", &args.step)]);
                send(&ctx, &args.plan, "restart", &query, None).await
            }
        }
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StepInfo {
    id: String,
    name: String,
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhaseInfo {
    id: String,
    name: String,
    status: String,
    strategy: String,
    #[serde(default)]
    errors: Vec<String>,
    steps: Vec<StepInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlanInfo {
    id: String,
    name: String,
    status: String,
    strategy: String,
    #[serde(default)]
    errors: Vec<String>,
    phases: Vec<PhaseInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlanStatus {
    name: String,
    status: String,
    strategy: String,
    #[serde(default)]
    errors: Vec<String>,
}

/// One step row of `plans show`.
#[derive(Debug, Serialize, Tabled)]
struct StepRow {
    #[tabled(rename = "Phase")]
    phase: String,

    #[tabled(rename = "Step")]
    step: String,

    #[tabled(rename = "Status")]
    status: String,

    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Debug, Serialize, Tabled)]
struct PlanNameRow {
    #[tabled(rename = "Plan")]
    name: String,
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_plans(ctx: CommandContext) -> Result<()> {
    let names: Vec<String> = ctx.client.get("/v1/plans").await?;
    match ctx.format {
        OutputFormat::Json => print_json(&names),
        OutputFormat::Table => {
            let rows: Vec<PlanNameRow> = names.into_iter().map(|name| PlanNameRow { name }).collect();
            print_output(&rows, ctx.format);
        }
    }
    Ok(())
}

async fn show_plan(ctx: CommandContext, args: PlanArgs) -> Result<()> {
    let (plan, _complete): (PlanInfo, bool) =
        ctx.client.get_plan(&format!("/v1/plans/{}", args.plan)).await?;
    if let OutputFormat::Json = ctx.format {
        print_json(&plan);
        return Ok(());
    }

    println!(
        "{} ({} strategy) {}",
        plan.name.bold(),
        plan.strategy,
        colorize_status(&plan.status)
    );
    print_errors(&plan.errors);
    for phase in &plan.phases {
        println!(
            "  {} ({} strategy) {}",
            phase.name,
            phase.strategy,
            colorize_status(&phase.status)
        );
    }
    println!();
    print_output(&step_rows(&plan), ctx.format);
    Ok(())
}

async fn plan_status(ctx: CommandContext, args: PlanArgs) -> Result<()> {
    let (status, complete): (PlanStatus, bool) = ctx
        .client
        .get_plan(&format!("/v1/plans/{}/status", args.plan))
        .await?;
    if let OutputFormat::Json = ctx.format {
        print_json(&status);
        return Ok(());
    }

    println!("{}: {}", status.name.bold(), colorize_status(&status.status));
    print_errors(&status.errors);
    if !complete {
        print_info("plan has work remaining");
    }
    Ok(())
}

async fn start_plan(ctx: CommandContext, args: StartArgs) -> Result<()> {
    let params: BTreeMap<String, String> = args.params.into_iter().collect();
    send(&ctx, &args.plan, "start", &[], Some(&params)).await
}

async fn send(
    ctx: &CommandContext,
    plan: &str,
    command: &str,
    query: &[(&str, &str)],
    body: Option<&BTreeMap<String, String>>,
) -> Result<()> {
    let path = format!("/v1/plans/{plan}/{command}");
    match ctx.client.command(&path, query, body).await? {
        CommandOutcome::Accepted(message) => match ctx.format {
            OutputFormat::Json => print_json(&serde_json::json!({ "message": message })),
            OutputFormat::Table => print_success(&message),
        },
        CommandOutcome::AlreadyReported => match ctx.format {
            OutputFormat::Json => print_json(&serde_json::json!({ "already_reported": true })),
            OutputFormat::Table => print_info(&format!("{plan} is already in the requested state")),
        },
    }
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn step_rows(plan: &PlanInfo) -> Vec<StepRow> {
    plan.phases
        .iter()
        .flat_map(|phase| {
            phase.steps.iter().map(|step| StepRow {
                phase: phase.name.clone(),
                step: step.name.clone(),
                status: colorize_status(&step.status).to_string(),
                message: step.message.clone(),
            })
        })
        .collect()
}

fn print_errors(errors: &[String]) {
    for error in errors {
        eprintln!("  {} {}", "error:".red(), error);
    }
}

fn optional_query<'a>(pairs: &[(&'a str, &'a Option<String>)]) -> Vec<(&'a str, &'a str)> {
    pairs
        .iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (*key, v)))
        .collect()
}

fn parse_key_value(raw: &str) -> Result<(String, String)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected KEY=VALUE, got `{raw}`");
    };
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("SLEEP=10").unwrap(),
            ("SLEEP".to_string(), "10".to_string())
        );
        assert_eq!(
            parse_key_value("URL=http://x?a=b").unwrap(),
            ("URL".to_string(), "http://x?a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_optional_query_skips_missing() {
        let phase = Some("node".to_string());
        let step = None;
        let query = optional_query(&[("phase", &phase), ("step", &step)]);
        assert_eq!(query, vec![("phase", "node")]);
    }

    #[test]
    fn test_step_rows_flatten_phases() {
        let plan: PlanInfo = serde_json::from_value(serde_json::json!({
            "id": "plan_1",
            "name": "deploy",
            "status": "IN_PROGRESS",
            "strategy": "serial",
            "phases": [{
                "id": "phase_1",
                "name": "node",
                "status": "IN_PROGRESS",
                "strategy": "serial",
                "steps": [
                    {"id": "step_1", "name": "node-0", "status": "COMPLETE", "message": ""},
                    {"id": "step_2", "name": "node-1", "status": "PENDING", "message": ""}
                ]
            }]
        }))
        .unwrap();

        let rows = step_rows(&plan);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].phase, "node");
        assert_eq!(rows[1].step, "node-1");
    }
}
