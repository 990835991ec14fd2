//! AI insight commands.
//!
//! Most of these are composites: one backend call gathers context, then one AI call consumes it.
//! A failure in either step is reported with the step that failed.

use std::collections::BTreeMap;

use super::args::{self, ParsedArgs, UsageError};
use super::unavailable;
use crate::backends::prometheus::DEFAULT_DURATION;
use crate::backends::{docker, jenkins, prometheus, AdapterResult, Backend};
use crate::context::BackendContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightCommand {
    AnalyzeBuild,
    AnalyzeContainer,
    Optimize,
    Anomalies,
    IncidentReport,
    Workflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightOp {
    AnalyzeBuild { job: String, build: String },
    AnalyzeContainer { container: String, lines: u32 },
    Optimize { duration: String },
    Anomalies { metric: String, duration: String },
    IncidentReport { incident: String, details: BTreeMap<String, String> },
    Workflow { workflow: String, details: BTreeMap<String, String> },
}

/// Per-pod CPU usage over `duration`, the input for optimization suggestions.
pub fn cpu_usage_query(duration: &str) -> String {
    format!("sum by (pod) (rate(container_cpu_usage_seconds_total[{}]))", duration)
}

impl InsightCommand {
    pub fn backends(self) -> &'static [Backend] {
        match self {
            InsightCommand::AnalyzeBuild => &[Backend::Jenkins, Backend::Ai],
            InsightCommand::AnalyzeContainer => &[Backend::Docker, Backend::Ai],
            InsightCommand::Optimize | InsightCommand::Anomalies => &[Backend::Prometheus, Backend::Ai],
            InsightCommand::IncidentReport | InsightCommand::Workflow => &[Backend::Ai],
        }
    }

    pub fn parse(self, parsed: ParsedArgs) -> Result<InsightOp, UsageError> {
        match self {
            InsightCommand::AnalyzeBuild => Ok(InsightOp::AnalyzeBuild {
                job: args::single_word("job", parsed.get(0))?,
                build: args::build(parsed.get(1))?,
            }),
            InsightCommand::AnalyzeContainer => Ok(InsightOp::AnalyzeContainer {
                container: args::docker_ref("container", parsed.get(0))?,
                lines: args::lines(parsed.get(1))?,
            }),
            InsightCommand::Optimize => Ok(InsightOp::Optimize {
                duration: args::duration(parsed.get(0), DEFAULT_DURATION)?,
            }),
            InsightCommand::Anomalies => Ok(InsightOp::Anomalies {
                metric: args::single_word("metric", parsed.get(0))?,
                duration: args::duration(parsed.get(1), DEFAULT_DURATION)?,
            }),
            InsightCommand::IncidentReport => match parsed {
                ParsedArgs::KeyValue { head, params } => Ok(InsightOp::IncidentReport {
                    incident: head,
                    details: params,
                }),
                _ => Err(UsageError::new("Missing required argument <incident>.")),
            },
            InsightCommand::Workflow => match parsed {
                ParsedArgs::KeyValue { head, params } => Ok(InsightOp::Workflow {
                    workflow: head,
                    details: params,
                }),
                _ => Err(UsageError::new("Missing required argument <workflow>.")),
            },
        }
    }
}

fn step_failed(step: &str, failure: AdapterResult) -> AdapterResult {
    match failure {
        AdapterResult::Failed { kind, message } => {
            AdapterResult::failed(kind, format!("Step {} failed: {}", step, message))
        }
        ok => ok,
    }
}

/// Label the outcome of the AI step.
fn analysis(title: String, result: AdapterResult) -> AdapterResult {
    match result {
        AdapterResult::Ok(text) => AdapterResult::ok(format!("{}\n\n{}", title, text)),
        failure => step_failed("2/2 (AI analysis)", failure),
    }
}

impl InsightOp {
    pub async fn invoke(self, ctx: &BackendContext) -> AdapterResult {
        let Some(ai) = ctx.insight.as_deref() else {
            return unavailable(Backend::Ai);
        };
        match self {
            InsightOp::AnalyzeBuild { job, build } => {
                let Some(ci) = ctx.ci.as_deref() else {
                    return unavailable(Backend::Jenkins);
                };
                let log = match jenkins::fetch_log(ci, &job, &build).await {
                    Ok(log) => log,
                    Err(failure) => return step_failed("1/2 (fetch console log)", failure),
                };
                analysis(format!("AI analysis of `{}` build `{}`:", job, build), ai.analyze_logs(&log).await)
            }
            InsightOp::AnalyzeContainer { container, lines } => {
                let Some(docker_api) = ctx.containers.as_deref() else {
                    return unavailable(Backend::Docker);
                };
                let log = match docker::fetch_logs(docker_api, &container, lines).await {
                    Ok(log) => log,
                    Err(failure) => return step_failed("1/2 (fetch container logs)", failure),
                };
                analysis(format!("AI analysis of container `{}`:", container), ai.analyze_logs(&log).await)
            }
            InsightOp::Optimize { duration } => {
                let Some(metrics) = ctx.metrics.as_deref() else {
                    return unavailable(Backend::Prometheus);
                };
                let expr = cpu_usage_query(&duration);
                let samples = match prometheus::fetch(metrics, &expr).await {
                    Ok(samples) => samples,
                    Err(failure) => return step_failed("1/2 (query metrics)", failure),
                };
                if samples.is_empty() {
                    return AdapterResult::ok(format!(
                        "No CPU usage data found for the last {}; nothing to analyze.",
                        duration
                    ));
                }
                let usage: BTreeMap<String, String> =
                    samples.into_iter().map(|s| (s.series_name(), s.value)).collect();
                analysis(
                    format!("Optimization suggestions (CPU usage over {}):", duration),
                    ai.suggest_optimizations(&usage).await,
                )
            }
            InsightOp::Anomalies { metric, duration } => {
                let Some(metrics) = ctx.metrics.as_deref() else {
                    return unavailable(Backend::Prometheus);
                };
                let series = match prometheus::fetch_range(metrics, &metric, &duration).await {
                    Ok(series) => series,
                    Err(failure) => return step_failed("1/2 (query metrics)", failure),
                };
                if series.is_empty() {
                    return AdapterResult::ok(format!(
                        "No data found for `{}` over the last {}; nothing to analyze.",
                        metric, duration
                    ));
                }
                analysis(
                    format!("Anomaly prediction for `{}` ({}):", metric, duration),
                    ai.predict_anomalies(&series).await,
                )
            }
            InsightOp::IncidentReport { incident, details } => {
                report(ai.incident_report(&incident, &details).await, format!("Incident report for `{}`:", incident))
            }
            InsightOp::Workflow { workflow, details } => report(
                ai.workflow_improvements(&workflow, &details).await,
                format!("Suggested improvements for `{}`:", workflow),
            ),
        }
    }
}

fn report(result: AdapterResult, title: String) -> AdapterResult {
    result.map_ok(|text| format!("{}\n\n{}", title, text))
}
