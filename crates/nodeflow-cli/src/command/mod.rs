//! Subcommand implementations.

mod run;
mod validate;

use std::path::Path;

use anyhow::Context;
use nodeflow_runtime::definition::Workflow;
pub use run::run;
use serde::Serialize;
pub use validate::validate;

/// Reads and parses a workflow definition.
async fn load_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read workflow file {}", path.display()))?;

    Workflow::from_json(&json)
        .with_context(|| format!("failed to parse workflow file {}", path.display()))
}

/// Writes `value` as JSON to stdout.
fn print(value: &impl Serialize, pretty: bool) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("failed to serialize output")?;

    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn test_load_workflow() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"id":"wf","nodes":[],"edge":[]}}"#).unwrap();

        let workflow = load_workflow(file.path()).await.unwrap();
        assert_eq!(workflow.id.to_string(), "wf");
    }

    #[tokio::test]
    async fn test_load_workflow_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let error = load_workflow(file.path()).await.unwrap_err();
        assert!(error.to_string().contains("failed to parse workflow file"));

        let error = load_workflow(Path::new("/nonexistent/workflow.json"))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("failed to read workflow file"));
    }
}
