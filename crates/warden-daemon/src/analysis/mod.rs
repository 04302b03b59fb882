//! Launch spec analysis collaborators.
//!
//! During reflection the supervisor hands a stopped worker's definition to
//! an analyzer and acts on the verdict. The default analyzer recommends no
//! change, so a deployment without an analysis command configured still
//! cycles workers through reflection without ever rewriting them.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use warden_types::{Analysis, WardenError, WardenResult, WorkerDefinition};

use crate::config::AnalysisConfig;

/// An external collaborator that proposes launch spec changes.
#[async_trait]
pub trait LaunchAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Inspects a stopped worker and returns a recommendation.
    async fn analyze(&self, definition: &WorkerDefinition) -> WardenResult<Analysis>;
}

/// Analyzer that always recommends leaving the worker alone.
pub struct NoOpAnalyzer;

#[async_trait]
impl LaunchAnalyzer for NoOpAnalyzer {
    fn name(&self) -> &str {
        "noop"
    }

    async fn analyze(&self, definition: &WorkerDefinition) -> WardenResult<Analysis> {
        debug!("No analyzer configured, leaving '{}' as is", definition.name);
        Ok(Analysis::none("analysis disabled"))
    }
}

/// Analyzer that delegates to an external command.
///
/// The worker definition is written to the command's stdin as JSON and the
/// verdict is read from its stdout, also as JSON. A non-zero exit means
/// the analysis failed.
pub struct CommandAnalyzer {
    command: PathBuf,
    args: Vec<String>,
}

impl CommandAnalyzer {
    pub fn new(command: PathBuf, args: Vec<String>) -> Self {
        Self { command, args }
    }
}

#[async_trait]
impl LaunchAnalyzer for CommandAnalyzer {
    fn name(&self) -> &str {
        "command"
    }

    async fn analyze(&self, definition: &WorkerDefinition) -> WardenResult<Analysis> {
        let payload = serde_json::to_vec(definition)
            .map_err(|e| WardenError::Analysis(format!("Failed to encode worker: {}", e)))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WardenError::Analysis(format!(
                    "Failed to run analyzer {:?}: {}",
                    self.command, e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| WardenError::Analysis(format!("Failed to write input: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| WardenError::Analysis(format!("Analyzer did not finish: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WardenError::Analysis(format!(
                "Analyzer exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| WardenError::Analysis(format!("Malformed analyzer verdict: {}", e)))
    }
}

/// Builds the analyzer selected by configuration.
pub fn analyzer_from_config(config: &AnalysisConfig) -> Arc<dyn LaunchAnalyzer> {
    match &config.command {
        Some(command) => Arc::new(CommandAnalyzer::new(
            command.clone(),
            config.args.clone(),
        )),
        None => Arc::new(NoOpAnalyzer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::{LaunchSpec, Recommendation};

    fn subject() -> WorkerDefinition {
        WorkerDefinition::new("indexer", LaunchSpec::new("/usr/bin/indexer"))
    }

    #[tokio::test]
    async fn test_noop_analyzer_recommends_nothing() {
        let analysis = NoOpAnalyzer.analyze(&subject()).await.unwrap();
        assert_eq!(analysis.recommendation, Recommendation::None);
    }

    #[tokio::test]
    async fn test_analyzer_from_config_defaults_to_noop() {
        let analyzer = analyzer_from_config(&AnalysisConfig::default());
        assert_eq!(analyzer.name(), "noop");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_analyzer_parses_none_verdict() {
        let analyzer = CommandAnalyzer::new(
            PathBuf::from("/bin/sh"),
            vec![
                "-c".to_string(),
                r#"cat >/dev/null; echo '{"recommendation":"none","rationale":"looks fine"}'"#
                    .to_string(),
            ],
        );

        let analysis = analyzer.analyze(&subject()).await.unwrap();
        assert_eq!(analysis.recommendation, Recommendation::None);
        assert_eq!(analysis.rationale, "looks fine");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_analyzer_parses_modify_verdict() {
        let analyzer = CommandAnalyzer::new(
            PathBuf::from("/bin/sh"),
            vec![
                "-c".to_string(),
                concat!(
                    r#"cat >/dev/null; echo '{"recommendation":{"modify":"#,
                    r#"{"program":"/usr/bin/indexer","args":["--slow"]}},"#,
                    r#""rationale":"throttle it"}'"#
                )
                .to_string(),
            ],
        );

        let analysis = analyzer.analyze(&subject()).await.unwrap();
        match analysis.recommendation {
            Recommendation::Modify(spec) => {
                assert_eq!(spec.program, "/usr/bin/indexer");
                assert_eq!(spec.args, vec!["--slow".to_string()]);
            }
            other => panic!("unexpected recommendation: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_analyzer_reads_worker_from_stdin() {
        let analyzer = CommandAnalyzer::new(
            PathBuf::from("/bin/sh"),
            vec![
                "-c".to_string(),
                r#"grep -q indexer && echo '{"recommendation":"none","rationale":"seen"}'"#
                    .to_string(),
            ],
        );

        let analysis = analyzer.analyze(&subject()).await.unwrap();
        assert_eq!(analysis.rationale, "seen");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_analyzer_nonzero_exit_is_error() {
        let analyzer = CommandAnalyzer::new(
            PathBuf::from("/bin/sh"),
            vec![
                "-c".to_string(),
                "cat >/dev/null; echo broken >&2; exit 3".to_string(),
            ],
        );

        let err = analyzer.analyze(&subject()).await.unwrap_err();
        assert!(matches!(err, WardenError::Analysis(msg) if msg.contains("broken")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_analyzer_rejects_malformed_verdict() {
        let analyzer = CommandAnalyzer::new(
            PathBuf::from("/bin/sh"),
            vec![
                "-c".to_string(),
                "cat >/dev/null; echo 'not json'".to_string(),
            ],
        );

        assert!(NoOpAnalyzer.analyze(&subject()).await.is_ok());
        assert!(analyzer.analyze(&subject()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_analyzer_command_is_error() {
        let analyzer = CommandAnalyzer::new(
            PathBuf::from("/nonexistent/warden-analyzer"),
            Vec::new(),
        );

        let err = analyzer.analyze(&subject()).await.unwrap_err();
        assert!(matches!(err, WardenError::Analysis(_)));
    }
}
