//! `validate` subcommand.

use std::path::Path;

use nodeflow_runtime::validation::Validator;

use super::{load_workflow, print};
use crate::TRACING_TARGET_COMMAND;

/// Validates the workflow at `path` and prints the result.
///
/// Returns whether the workflow is valid.
pub async fn validate(path: &Path, pretty: bool) -> anyhow::Result<bool> {
    let workflow = load_workflow(path).await?;
    let result = Validator::new().validate(&workflow);

    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        workflow_id = %workflow.id,
        is_valid = result.is_valid,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "Workflow validated"
    );

    print(&result, pretty)?;
    Ok(result.is_valid)
}
