use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the ripping service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RipConfig {
    /// Path to the shared job database (also opened by the web UI)
    pub db_path: PathBuf,
    /// Staging directory for in-progress rips
    pub raw_path: PathBuf,
    /// Media library root finished rips are moved into
    pub completed_path: PathBuf,
    /// Directory for per-job tool log files
    pub log_path: PathBuf,
    /// How many one-second attempts to make when the database is locked
    pub db_wait_time: u32,
    /// Pause new jobs so a title override can be submitted through the UI
    pub manual_wait: bool,
    /// Ceiling in seconds for the manual override wait
    pub manual_wait_time: u64,
    /// Interval in seconds between override checks while waiting
    pub manual_wait_poll_secs: u64,
    /// Allow ripping a disc that already has a successful rip on record
    pub allow_duplicates: bool,
    /// Minimum track length in seconds for a track to count as ripped
    pub min_length_secs: i64,
    /// Music CD ripping tool (invoked as `<bin> -d <device> [-c <config>]`)
    pub music_rip_bin: PathBuf,
    /// Optional config file passed to the music ripping tool
    pub music_rip_config: Option<PathBuf>,
    /// Block-copy tool for data discs (invoked dd-style: `if=... of=...`)
    pub data_rip_bin: PathBuf,
    /// Extra arguments appended to the data rip invocation
    pub data_rip_args: Vec<String>,
    /// Video rip/transcode pipeline command (device and output dir appended)
    pub video_rip_bin: PathBuf,
    /// Arguments placed before the device and output dir
    pub video_rip_args: Vec<String>,
    /// Tool used to eject the disc tray
    pub eject_bin: PathBuf,
    /// Name prepended to notification titles when non-empty
    pub site_name: String,
    /// Append the job id to notification titles
    pub notify_job_id: bool,
    /// Webhook URLs notifications are POSTed to
    pub notify_urls: Vec<String>,
}

impl Default for RipConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl RipConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            db_path: PathBuf::from("/var/lib/autorip/jobs.db"),
            raw_path: PathBuf::from("/var/lib/autorip/raw"),
            completed_path: PathBuf::from("/var/lib/autorip/completed"),
            log_path: PathBuf::from("/var/log/autorip"),
            db_wait_time: 90,
            manual_wait: true,
            manual_wait_time: 600,
            manual_wait_poll_secs: 5,
            allow_duplicates: false,
            min_length_secs: 600,
            music_rip_bin: PathBuf::from("abcde"),
            music_rip_config: None,
            data_rip_bin: PathBuf::from("dd"),
            data_rip_args: vec!["conv=noerror,sync".to_string()],
            video_rip_bin: PathBuf::from("HandBrakeCLI"),
            video_rip_args: Vec::new(),
            eject_bin: PathBuf::from("eject"),
            site_name: String::new(),
            notify_job_id: false,
            notify_urls: Vec::new(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // Try JSON first, then TOML
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    let file_config: RipConfig = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                    config = file_config;
                } else {
                    let file_config: RipConfig = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                    config = file_config;
                }
            }
        }

        Ok(config)
    }

    /// Log file path for a job, unique per job id
    pub fn job_logfile(&self, label: &str, job_id: &str) -> PathBuf {
        let label = if label.is_empty() { "disc" } else { label };
        self.log_path.join(format!("{label}_{job_id}.log"))
    }
}
