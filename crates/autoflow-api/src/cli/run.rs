//! `aflow run`: execute a workflow file and render its report.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use autoflow_core::event::EventBus;
use autoflow_core::pipeline::PipelineEngine;
use autoflow_infra::workflow::{WorkflowCompiler, load_workflow_file};
use autoflow_types::event::PipelineEvent;
use autoflow_types::pipeline::ExecutionReport;
use autoflow_types::resilience::{CircuitState, DependencyStatus};
use serde_json::Value;

use crate::state::AppState;

/// Load, compile and execute the workflow at `path`.
///
/// Returns whether every step succeeded.
pub async fn run_workflow(state: &AppState, path: &Path, json: bool, progress: bool) -> Result<bool> {
    let workflow = load_workflow_file(path)
        .with_context(|| format!("Failed to load workflow {}", path.display()))?;

    let compiler = WorkflowCompiler::new(Arc::clone(&state.registry), state.config.pipeline.clone());
    let steps = compiler.compile(&workflow);

    let bus = EventBus::default();
    let printer = (progress && !json).then(|| tokio::spawn(print_progress(bus.subscribe())));

    let engine = PipelineEngine::new().with_event_bus(bus);
    let report = engine.execute(workflow.context.clone(), &steps).await;
    drop(engine);

    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let dependencies = state.registry.snapshot();

    if json {
        let output = serde_json::json!({
            "workflow": workflow.name,
            "report": report,
            "dependencies": dependencies,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        render_report(&workflow.name, &report);
        if !dependencies.is_empty() {
            render_dependencies(&dependencies);
        }
    }

    Ok(report.success)
}

/// Print one line per step as the run progresses, until the bus closes.
async fn print_progress(mut rx: tokio::sync::broadcast::Receiver<PipelineEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match rx.recv().await {
            Ok(PipelineEvent::StepStarted { index, step_name, .. }) => {
                println!("  {} {}", style(format!("[{}]", index + 1)).dim(), step_name);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn render_report(name: &str, report: &ExecutionReport<Value>) {
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Duration").fg(Color::White),
        Cell::new("Error").fg(Color::White),
    ]);

    for (index, result) in report.results.iter().enumerate() {
        let status_cell = if result.success {
            Cell::new("ok").fg(Color::Green)
        } else {
            let kind = result
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "failed".to_string());
            Cell::new(kind.to_uppercase()).fg(Color::Red)
        };

        table.add_row(vec![
            Cell::new(index + 1).fg(Color::Cyan),
            Cell::new(&result.name).fg(Color::White),
            status_cell,
            Cell::new(format!("{}ms", result.duration_ms)).fg(Color::DarkGrey),
            Cell::new(result.error.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!();

    match report.failed_step() {
        None => {
            println!(
                "  {} Workflow '{}' completed: {} step{} in {}ms",
                style("✓").green().bold(),
                style(name).cyan(),
                style(report.results.len()).bold(),
                if report.results.len() == 1 { "" } else { "s" },
                report.total_duration_ms()
            );
            if let Some(data) = &report.final_data {
                println!();
                println!("  {}", style("Final context:").bold());
                let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
                for line in pretty.lines() {
                    println!("    {line}");
                }
            }
        }
        Some(failed) => {
            println!(
                "  {} Workflow '{}' failed at step '{}': {}",
                style("✗").red().bold(),
                style(name).cyan(),
                style(&failed.name).bold(),
                failed.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!();
}

fn render_dependencies(dependencies: &[DependencyStatus]) {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Dependency").fg(Color::White),
        Cell::new("Circuit").fg(Color::White),
        Cell::new("Calls").fg(Color::White),
        Cell::new("Failures").fg(Color::White),
        Cell::new("Rejected").fg(Color::White),
        Cell::new("Quota").fg(Color::White),
        Cell::new("Last Error").fg(Color::White),
    ]);

    for dependency in dependencies {
        let circuit_cell = match dependency.breaker.state {
            CircuitState::Closed => Cell::new("closed").fg(Color::Green),
            CircuitState::Open => Cell::new("OPEN").fg(Color::Red),
            CircuitState::HalfOpen => Cell::new("half_open").fg(Color::Yellow),
        };

        let last_error = dependency.breaker.last_error.as_deref().unwrap_or("-");
        let last_error_display = if last_error.chars().count() > 40 {
            format!("{}...", last_error.chars().take(37).collect::<String>())
        } else {
            last_error.to_string()
        };

        let limiter = &dependency.limiter;
        table.add_row(vec![
            Cell::new(&dependency.name).fg(Color::White),
            circuit_cell,
            Cell::new(dependency.breaker.total_calls).fg(Color::White),
            Cell::new(dependency.breaker.total_failures).fg(Color::White),
            Cell::new(dependency.breaker.total_rejections).fg(Color::White),
            Cell::new(format!(
                "{}/{} per {}",
                limiter.admitted_in_window,
                limiter.max_calls,
                format_window(limiter.window_ms)
            ))
            .fg(Color::DarkGrey),
            Cell::new(last_error_display).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!();
}

fn format_window(window_ms: u64) -> String {
    match window_ms {
        3_600_000 => "hour".to_string(),
        60_000 => "minute".to_string(),
        1_000 => "second".to_string(),
        ms if ms % 1_000 == 0 => format!("{}s", ms / 1_000),
        ms => format!("{ms}ms"),
    }
}
