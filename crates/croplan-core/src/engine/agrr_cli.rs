//! [`Predictor`] and [`Optimizer`] backed by the `agrr` executable.
//!
//! Inputs are written to JSON temp files, the process runs with stdout and
//! stderr captured concurrently, and stdout is parsed as JSON. A non-zero
//! exit, timeout, or empty/unparsable stdout is an engine failure.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::trait_def::{Optimizer, Predictor};
use super::types::{AdjustRequest, PredictionRequest, PredictionSeries};
use crate::proposal::Proposal;

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs `agrr` subcommands as child processes.
#[derive(Debug, Clone)]
pub struct AgrrCli {
    binary: PathBuf,
    timeout: Duration,
}

impl AgrrCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    async fn run(&self, args: Vec<OsString>) -> Result<String> {
        let start = Instant::now();
        let command_line = format!(
            "{} {}",
            self.binary.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        debug!(command = %command_line, "running agrr");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to execute {command_line}"))?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stdout_pipe {
                pipe.read_to_end(&mut buf).await.ok();
            }
            String::from_utf8_lossy(&buf).into_owned()
        };

        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stderr_pipe {
                pipe.read_to_end(&mut buf).await.ok();
            }
            String::from_utf8_lossy(&buf).into_owned()
        };

        match tokio::time::timeout(self.timeout, async {
            tokio::join!(child.wait(), read_stdout, read_stderr)
        })
        .await
        {
            Ok((Ok(status), stdout, stderr)) => {
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                if !status.success() {
                    anyhow::bail!(
                        "{command_line} exited with {status}: {}",
                        stderr.trim()
                    );
                }
                if stdout.trim().is_empty() {
                    anyhow::bail!("{command_line} succeeded but produced no output");
                }
                info!(command = %command_line, elapsed_ms, "agrr finished");
                Ok(stdout)
            }
            Ok((Err(e), _, _)) => Err(e).with_context(|| format!("failed to wait on {command_line}")),
            Err(_) => {
                let _ = child.kill().await;
                anyhow::bail!(
                    "{command_line} timed out after {}s",
                    self.timeout.as_secs_f64()
                )
            }
        }
    }
}

#[async_trait]
impl Predictor for AgrrCli {
    fn name(&self) -> &str {
        "agrr"
    }

    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionSeries> {
        let stdout = self.run(predict_args(request)).await?;
        serde_json::from_str(&stdout).context("failed to parse agrr prediction output")
    }
}

#[async_trait]
impl Optimizer for AgrrCli {
    fn name(&self) -> &str {
        "agrr"
    }

    async fn adjust(&self, request: &AdjustRequest) -> Result<Proposal> {
        let inputs = AdjustInputs::write(request)?;
        let stdout = self.run(adjust_args(&inputs, request)).await?;
        parse_adjust_output(&stdout)
    }
}

/// Temp files backing one `optimize adjust` call. Removed on drop.
struct AdjustInputs {
    current_allocation: NamedTempFile,
    moves: NamedTempFile,
    fields: NamedTempFile,
    crops: NamedTempFile,
    weather: NamedTempFile,
}

impl AdjustInputs {
    fn write(request: &AdjustRequest) -> Result<Self> {
        Ok(Self {
            current_allocation: write_json("current_allocation", &request.current_allocation)?,
            moves: write_json("moves", &serde_json::json!({ "moves": request.moves }))?,
            fields: write_json("fields", &serde_json::json!({ "fields": request.fields }))?,
            crops: write_json("crops", &serde_json::json!({ "crops": request.crops }))?,
            weather: write_json("weather", &request.weather)?,
        })
    }
}

fn write_json<T: Serialize>(prefix: &str, value: &T) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".json")
        .tempfile()
        .with_context(|| format!("failed to create {prefix} input file"))?;
    serde_json::to_writer(&mut file, value)
        .with_context(|| format!("failed to write {prefix} input file"))?;
    file.flush()
        .with_context(|| format!("failed to flush {prefix} input file"))?;
    Ok(file)
}

fn predict_args(request: &PredictionRequest) -> Vec<OsString> {
    [
        "predict",
        "--start",
        &request.start_date.to_string(),
        "--end",
        &request.end_date.to_string(),
        "--model",
        &request.model,
        "--format",
        "json",
    ]
    .into_iter()
    .map(OsString::from)
    .collect()
}

fn adjust_args(inputs: &AdjustInputs, request: &AdjustRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["optimize".into(), "adjust".into()];
    let files = [
        ("--current-allocation", &inputs.current_allocation),
        ("--moves", &inputs.moves),
        ("--fields-file", &inputs.fields),
        ("--crops-file", &inputs.crops),
        ("--weather-file", &inputs.weather),
    ];
    for (flag, file) in files {
        args.push(flag.into());
        args.push(file.path().as_os_str().to_owned());
    }
    for (flag, value) in [
        ("--planning-start", request.planning_start.to_string()),
        ("--planning-end", request.planning_end.to_string()),
        ("--objective", request.objective.to_string()),
        ("--format", "json".to_owned()),
    ] {
        args.push(flag.into());
        args.push(value.into());
    }
    args
}

/// `agrr optimize adjust` wraps the allocation set in `optimization_result`
/// with the summary alongside; a bare proposal document is accepted too.
fn parse_adjust_output(stdout: &str) -> Result<Proposal> {
    let mut raw: serde_json::Value =
        serde_json::from_str(stdout).context("agrr adjust output is not JSON")?;

    let proposal = match raw.get_mut("optimization_result").map(serde_json::Value::take) {
        Some(mut result) => {
            if let (Some(obj), Some(summary)) = (result.as_object_mut(), raw.get("summary")) {
                obj.insert("summary".to_owned(), summary.clone());
            }
            serde_json::from_value(result)
        }
        None => serde_json::from_value(raw),
    };

    proposal.context("failed to parse agrr adjust output as a proposal")
}
