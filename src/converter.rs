use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use thiserror::Error;
use tokio::{process::Command, time};
use tracing::{info, warn};

use crate::{
    artifact_store::{delete_file_if_exists, job_output_path},
    config::Config,
    formats::PDF_FORMAT,
};

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(
        "PDF conversion requires a LaTeX engine ({candidates}) to be installed. \
         Please install texlive-latex-recommended and lmodern packages"
    )]
    EngineUnavailable { candidates: String },

    #[error("failed to prepare input: {0}")]
    Input(String),

    #[error("failed to start converter `{bin}`: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter failed: {status}, stderr: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("conversion exceeded {secs}s and was aborted")]
    TimedOut { secs: u64 },

    #[error("converter exited successfully but produced no output at {0}")]
    MissingOutput(PathBuf),
}

/// Runs the external document converter for a single job.
#[derive(Debug, Clone)]
pub struct Converter {
    bin: String,
    pdf_engines: Vec<String>,
    timeout: Duration,
    work_root: PathBuf,
}

impl Converter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bin: config.converter_bin.clone(),
            pdf_engines: config.pdf_engines.clone(),
            timeout: config.job_timeout,
            work_root: config.work_root.clone(),
        }
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// First installed PDF engine, in preference order.
    pub fn select_pdf_engine(&self) -> Result<String, ConversionError> {
        self.pdf_engines
            .iter()
            .find(|engine| find_executable(engine).is_some())
            .cloned()
            .ok_or_else(|| ConversionError::EngineUnavailable {
                candidates: join_candidates(&self.pdf_engines),
            })
    }

    pub async fn convert(
        &self,
        job_id: &str,
        from: &str,
        to: &str,
        input: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let engine = if to == PDF_FORMAT {
            Some(self.select_pdf_engine()?)
        } else {
            None
        };

        let output_path = job_output_path(&self.work_root, job_id, to);
        let args = build_args(input, from, to, engine.as_deref(), &output_path);

        info!(
            job_id = %job_id,
            from = %from,
            to = %to,
            engine = engine.as_deref().unwrap_or("-"),
            "Running converter"
        );

        let mut command = Command::new(&self.bin);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ConversionError::Spawn {
                    bin: self.bin.clone(),
                    source,
                })
            }
            Err(_) => {
                discard_partial_output(&output_path).await;
                return Err(ConversionError::TimedOut {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            discard_partial_output(&output_path).await;
            return Err(ConversionError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            return Err(ConversionError::MissingOutput(output_path));
        }

        Ok(output_path)
    }
}

pub fn build_args(
    input: &Path,
    from: &str,
    to: &str,
    pdf_engine: Option<&str>,
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        input.into(),
        "-f".into(),
        from.into(),
        "-t".into(),
        to.into(),
        "--standalone".into(),
        "--wrap=none".into(),
    ];
    if let Some(engine) = pdf_engine {
        args.push(format!("--pdf-engine={engine}").into());
    }
    // output goes last
    args.push("-o".into());
    args.push(output.into());
    args
}

async fn discard_partial_output(path: &Path) {
    if let Err(err) = delete_file_if_exists(path).await {
        warn!("Failed to remove partial output {}: {err:#}", path.display());
    }
}

fn join_candidates(engines: &[String]) -> String {
    match engines {
        [] => "none configured".to_string(),
        [only] => only.clone(),
        [rest @ .., last] => format!("{}, or {last}", rest.join(", ")),
    }
}

/// Resolves `name` the way a shell would: as a path if it has a separator,
/// otherwise against each `PATH` entry.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
