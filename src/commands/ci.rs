//! Jenkins commands.

use std::collections::BTreeMap;

use super::args::{self, ParsedArgs, UsageError};
use super::unavailable;
use crate::backends::{jenkins, AdapterResult, Backend};
use crate::context::BackendContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiCommand {
    Trigger,
    Status,
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiOp {
    Trigger { job: String, params: BTreeMap<String, String> },
    Status { job: String },
    Log { job: String, build: String },
}

impl CiCommand {
    pub fn parse(self, parsed: ParsedArgs) -> Result<CiOp, UsageError> {
        match (self, parsed) {
            (CiCommand::Trigger, ParsedArgs::KeyValue { head, params }) => Ok(CiOp::Trigger { job: head, params }),
            (CiCommand::Status, parsed) => parsed
                .get(0)
                .map(|job| CiOp::Status { job: job.to_string() })
                .ok_or_else(|| UsageError::new("Missing required argument <job>.")),
            (CiCommand::Log, parsed) => Ok(CiOp::Log {
                job: args::single_word("job", parsed.get(0))?,
                build: args::build(parsed.get(1))?,
            }),
            (CiCommand::Trigger, _) => Err(UsageError::new("Missing required argument <job>.")),
        }
    }
}

impl CiOp {
    pub async fn invoke(self, ctx: &BackendContext) -> AdapterResult {
        let Some(api) = ctx.ci.as_deref() else {
            return unavailable(Backend::Jenkins);
        };
        match self {
            CiOp::Trigger { job, params } => jenkins::trigger(api, &job, &params).await,
            CiOp::Status { job } => jenkins::status(api, &job).await,
            CiOp::Log { job, build } => jenkins::log(api, &job, &build).await,
        }
    }
}
