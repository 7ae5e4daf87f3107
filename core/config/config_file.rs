use super::{ConfigError, ManagerConfig, WorkerConfig};
use crate::modes::Mode;
use crate::util::Limit;
use serde_derive::{Deserialize, Serialize};
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// A partial pool configuration as written in a JSON file. Comments are allowed, and every
/// field is optional: whatever is missing keeps its default.
///
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<Limit>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,

    #[serde(
        with = "crate::util::serde::opt_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub wait_interval: Option<Duration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processing_responses_per_iteration: Option<Limit>,

    pub worker: WorkerConfigFile,
}

#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfigFile {
    #[serde(
        with = "crate::util::serde::opt_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub idle_timeout: Option<Duration>,

    #[serde(
        with = "crate::util::serde::opt_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub wait_interval: Option<Duration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_task_count: Option<Limit>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_err_count: Option<Limit>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cons_err_count: Option<Limit>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon: Option<bool>,
}

impl PoolConfigFile {
    pub async fn read(path: &Path) -> Result<Self, ConfigError> {
        let file = fs::File::open(&path)
            .await
            .map_err(|err| ConfigError::CouldNotReadFile {
                path: path.into(),
                err,
            })?;

        let reader = json_comments::StripComments::new(BufReader::new(file.into_std().await));

        serde_json::from_reader(reader).map_err(ConfigError::ParseError)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let reader = json_comments::StripComments::new(contents.as_bytes());
        serde_json::from_reader(reader).map_err(ConfigError::ParseError)
    }

    pub fn into_config(self) -> Result<ManagerConfig, ConfigError> {
        let mut builder = ManagerConfig::builder();
        if let Some(mode) = &self.mode {
            builder.mode(mode.parse::<Mode>()?);
        }
        if let Some(name) = self.name {
            builder.name(name);
        }
        if let Some(num_workers) = self.num_workers {
            builder.num_workers(num_workers);
        }
        if let Some(incremental) = self.incremental {
            builder.incremental(incremental);
        }
        if let Some(wait_interval) = self.wait_interval {
            builder.wait_interval(wait_interval);
        }
        if let Some(limit) = self.max_processing_responses_per_iteration {
            builder.max_processing_responses_per_iteration(limit);
        }
        builder.worker(self.worker.into_config()?);
        builder.build()
    }
}

impl WorkerConfigFile {
    pub fn into_config(self) -> Result<WorkerConfig, ConfigError> {
        let mut builder = WorkerConfig::builder();
        if let Some(idle_timeout) = self.idle_timeout {
            builder.idle_timeout(idle_timeout);
        }
        if let Some(wait_interval) = self.wait_interval {
            builder.wait_interval(wait_interval);
        }
        if let Some(limit) = self.max_task_count {
            builder.max_task_count(limit);
        }
        if let Some(limit) = self.max_err_count {
            builder.max_err_count(limit);
        }
        if let Some(limit) = self.max_cons_err_count {
            builder.max_cons_err_count(limit);
        }
        if let Some(daemon) = self.daemon {
            builder.daemon(daemon);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_json_with_comments() {
        let file = PoolConfigFile::parse(
            r#"
        {
            // a small, bounded pool
            "mode": "thread",
            "num_workers": 2,
            "incremental": true,
            "worker": {
                "max_task_count": 5,
                "idle_timeout": 1.5
            }
        }
        "#,
        );

        assert_matches!(
            &file,
            Ok(PoolConfigFile {
                mode: Some(mode),
                num_workers: Some(Limit::AtMost(2)),
                incremental: Some(true),
                ..
            }) if mode == "thread"
        );

        let config = file.unwrap().into_config().unwrap();
        assert_eq!(config.mode(), Mode::Thread);
        assert!(config.incremental());
        assert_eq!(config.worker().max_task_count(), Limit::AtMost(5));
        assert_eq!(config.worker().idle_timeout(), Duration::from_millis(1500));
        assert_eq!(config.worker().max_err_count(), Limit::AtMost(10));
    }

    #[test]
    fn empty_files_give_the_defaults() {
        let config = PoolConfigFile::parse("{}").unwrap().into_config().unwrap();
        assert_eq!(config.mode(), Mode::Async);
        assert_eq!(config.num_workers(), Limit::AtMost(1));
        assert_eq!(config.worker(), &WorkerConfig::default());
    }

    #[test]
    fn unknown_modes_are_rejected() {
        let file = PoolConfigFile::parse(r#"{ "mode": "process" }"#).unwrap();
        assert_matches!(file.into_config(), Err(ConfigError::UnknownMode(_)));
    }

    #[test]
    fn malformed_files_are_parse_errors() {
        assert_matches!(
            PoolConfigFile::parse(r#"{ "num_workers": "many" }"#),
            Err(ConfigError::ParseError(_))
        );
    }

    #[tokio::test]
    async fn read_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "num_workers": -1, "wait_interval": 0.25 }}"#).unwrap();

        let config = PoolConfigFile::read(file.path())
            .await
            .unwrap()
            .into_config()
            .unwrap();
        assert!(config.num_workers().is_unlimited());
        assert_eq!(config.wait_interval(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn missing_files_cannot_be_read() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            PoolConfigFile::read(&dir.path().join("pool.json")).await,
            Err(ConfigError::CouldNotReadFile { .. })
        );
    }
}
