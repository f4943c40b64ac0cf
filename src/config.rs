use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Result;

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Directory holding uploaded inputs and converted outputs.
    pub work_root: PathBuf,
    pub queue_capacity: usize,
    pub worker_count: usize,
    /// Hard deadline for a single converter run.
    pub job_timeout: Duration,
    /// How long a conversion request waits for its job. Kept above `job_timeout`.
    pub wait_timeout: Duration,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub converter_bin: String,
    /// PDF engines in preference order.
    pub pdf_engines: Vec<String>,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            work_root: env::temp_dir(),
            queue_capacity: 256,
            worker_count: 8,
            job_timeout: Duration::from_secs(60),
            wait_timeout: Duration::from_secs(65),
            retention: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            converter_bin: "pandoc".to_string(),
            pdf_engines: vec![
                "xelatex".to_string(),
                "pdflatex".to_string(),
                "luatex".to_string(),
            ],
            max_upload_bytes: 32 << 20,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let bind_addr = resolve_bind_addr();

        let work_root = env::var("CONVERTLY_WORK_ROOT")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.work_root);

        let queue_capacity = env_parse::<usize>("CONVERTLY_QUEUE_CAPACITY")
            .filter(|v| *v > 0)
            .unwrap_or(defaults.queue_capacity);

        let worker_count = env_parse::<usize>("CONVERTLY_WORKERS")
            .filter(|v| *v > 0)
            .unwrap_or(defaults.worker_count);

        let job_timeout = env_parse::<u64>("CONVERTLY_JOB_TIMEOUT_SECONDS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.job_timeout);

        let wait_timeout = env_parse::<u64>("CONVERTLY_WAIT_TIMEOUT_SECONDS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.wait_timeout);

        let retention = env_parse::<u64>("CONVERTLY_RETENTION_SECONDS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.retention);

        let sweep_interval = env_parse::<u64>("CONVERTLY_SWEEP_INTERVAL_SECONDS")
            .filter(|v| *v > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);

        let converter_bin = env::var("CONVERTLY_CONVERTER_BIN")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.converter_bin);

        let pdf_engines = env::var("CONVERTLY_PDF_ENGINES")
            .ok()
            .map(|raw| parse_list(&raw))
            .filter(|engines| !engines.is_empty())
            .unwrap_or(defaults.pdf_engines);

        let max_upload_bytes = env_parse::<usize>("CONVERTLY_MAX_UPLOAD_BYTES")
            .unwrap_or(defaults.max_upload_bytes);

        Ok(Self {
            bind_addr,
            work_root,
            queue_capacity,
            worker_count,
            job_timeout,
            wait_timeout,
            retention,
            sweep_interval,
            converter_bin,
            pdf_engines,
            max_upload_bytes,
        })
    }
}

fn resolve_bind_addr() -> SocketAddr {
    if let Ok(raw) = env::var("CONVERTLY_BIND_ADDR") {
        let normalized = raw.trim().trim_matches('"').trim_matches('\'');
        if let Ok(addr) = normalized.parse::<SocketAddr>() {
            return addr;
        }
    }

    let port = env_parse::<u16>("PORT").unwrap_or(DEFAULT_PORT);
    SocketAddr::from(([0, 0, 0, 0], port))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
