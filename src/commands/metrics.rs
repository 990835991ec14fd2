//! Prometheus commands.

use super::args::{ParsedArgs, UsageError};
use super::unavailable;
use crate::backends::{prometheus, AdapterResult, Backend};
use crate::context::BackendContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsCommand {
    Status,
    Query,
    Alerts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricsOp {
    Status,
    Query { expr: String },
    Alerts,
}

impl MetricsCommand {
    pub fn parse(self, parsed: ParsedArgs) -> Result<MetricsOp, UsageError> {
        match self {
            MetricsCommand::Status => Ok(MetricsOp::Status),
            MetricsCommand::Alerts => Ok(MetricsOp::Alerts),
            MetricsCommand::Query => parsed
                .get(0)
                .map(|expr| MetricsOp::Query { expr: expr.to_string() })
                .ok_or_else(|| UsageError::new("Missing required argument <expression>.")),
        }
    }
}

impl MetricsOp {
    pub async fn invoke(self, ctx: &BackendContext) -> AdapterResult {
        let Some(api) = ctx.metrics.as_deref() else {
            return unavailable(Backend::Prometheus);
        };
        match self {
            MetricsOp::Status => prometheus::status(api).await,
            MetricsOp::Query { expr } => prometheus::query(api, &expr).await,
            MetricsOp::Alerts => prometheus::alerts(api).await,
        }
    }
}
