use crate::experiment::{Experiment, Host, Microservice, NetworkService};
use serde::Serialize;
use std::{
    fmt::Debug,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("Failed to create config directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to encode config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Turns an experiment into a config artifact the engine can consume
pub trait ConfigSerializer: Send + Sync + Debug {
    /// deterministic location of the artifact for experiment `name`
    fn path_for(&self, name: &str) -> PathBuf;

    /// write the artifact and return where it was written to
    fn materialize(&self, experiment: &Experiment) -> Result<PathBuf, SerializeError>;
}

/// Writes `<dir>/<name>.json` in the engine's document layout
#[derive(Debug, Clone)]
pub struct JsonSerializer {
    dir: PathBuf,
}

impl JsonSerializer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ConfigSerializer for JsonSerializer {
    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn materialize(&self, experiment: &Experiment) -> Result<PathBuf, SerializeError> {
        fs::create_dir_all(&self.dir).map_err(|source| SerializeError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(&experiment.name);
        let document = SimulationDocument::from(experiment);
        let write_error = |source| SerializeError::Write {
            path: path.clone(),
            source,
        };

        let mut writer = BufWriter::new(File::create(&path).map_err(write_error)?);
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.flush().map_err(write_error)?;

        debug!(experiment = %experiment.name, path = ?path, "Generated simulation config");

        Ok(path)
    }
}

// NOTE: the engine expects these exact key names, they differ from the descriptor
// files on purpose
#[derive(Serialize)]
struct SimulationDocument<'a> {
    #[serde(rename = "Config")]
    config: ConfigEntry,
    #[serde(rename = "Hosts")]
    hosts: Vec<HostEntry<'a>>,
    #[serde(rename = "Microservices")]
    microservices: Vec<MicroserviceEntry<'a>>,
    #[serde(rename = "NetworkServices")]
    network_services: Vec<NetworkServiceEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigEntry {
    interval: f64,
    sample_interval: f64,
    step_size: f64,
    seed: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HostEntry<'a> {
    replica: u64,
    ram: u64,
    bw: u64,
    storage: u64,
    pes: u64,
    max_power: f64,
    static_power: f64,
    vm_scheduler: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MicroserviceEntry<'a> {
    name: &'a str,
    size: u64,
    cpu: u64,
    ram: u64,
    bw: u64,
    replicas: u64,
    max_replicas: u64,
    cpu_ratio: u64,
    ram_ratio: u64,
    bw_ratio: u64,
    #[serde(rename = "idleCPU")]
    idle_cpu: u64,
    #[serde(rename = "idleRAM")]
    idle_ram: u64,
    #[serde(rename = "idleBW")]
    idle_bw: u64,
    auto_scale: Vec<AutoScaleEntry<'a>>,
}

#[derive(Serialize)]
struct AutoScaleEntry<'a> {
    telemetry: &'a str,
    threshold: f64,
}

#[derive(Serialize)]
struct NetworkServiceEntry<'a> {
    name: &'a str,
    flows: u64,
    #[serde(rename = "Job")]
    jobs: Vec<JobEntry>,
}

#[derive(Serialize)]
struct JobEntry {
    ms: usize,
    length: u64,
    schedule: u64,
}

impl<'a> From<&'a Experiment> for SimulationDocument<'a> {
    fn from(experiment: &'a Experiment) -> Self {
        let config = &experiment.config;

        Self {
            config: ConfigEntry {
                interval: config.interval,
                sample_interval: config.sample_interval,
                step_size: config.step_size,
                seed: config.seed,
            },
            hosts: experiment.hosts.iter().map(HostEntry::from).collect(),
            microservices: experiment
                .microservices
                .iter()
                .map(MicroserviceEntry::from)
                .collect(),
            network_services: experiment
                .network_services
                .iter()
                .map(NetworkServiceEntry::from)
                .collect(),
        }
    }
}

impl<'a> From<&'a Host> for HostEntry<'a> {
    fn from(host: &'a Host) -> Self {
        Self {
            replica: host.replicas,
            ram: host.ram,
            bw: host.bw,
            storage: host.storage,
            pes: host.cpus,
            max_power: host.max_power,
            static_power: host.static_power,
            vm_scheduler: host.vm_scheduler.as_str(),
        }
    }
}

impl<'a> From<&'a Microservice> for MicroserviceEntry<'a> {
    fn from(ms: &'a Microservice) -> Self {
        Self {
            name: &ms.name,
            size: ms.size,
            cpu: ms.cpus,
            ram: ms.ram,
            bw: ms.bw,
            replicas: ms.replicas,
            max_replicas: ms.max_replicas,
            cpu_ratio: ms.cpu_ratio,
            ram_ratio: ms.ram_ratio,
            bw_ratio: ms.bw_ratio,
            idle_cpu: ms.idle_cpu,
            idle_ram: ms.idle_ram,
            idle_bw: ms.idle_bw,
            auto_scale: ms
                .auto_scale
                .iter()
                .map(|rule| AutoScaleEntry {
                    telemetry: &rule.telemetry,
                    threshold: rule.threshold,
                })
                .collect(),
        }
    }
}

impl<'a> From<&'a NetworkService> for NetworkServiceEntry<'a> {
    fn from(service: &'a NetworkService) -> Self {
        Self {
            name: &service.name,
            flows: service.flows,
            jobs: service
                .jobs
                .iter()
                .map(|job| JobEntry {
                    ms: job.ms,
                    length: job.length,
                    schedule: job.schedule,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::tests::experiment;
    use serde_json::Value;

    #[test]
    fn path_is_derived_from_name() {
        let serializer = JsonSerializer::new("configs");

        assert_eq!(serializer.path_for("1_ns_4"), PathBuf::from("configs/1_ns_4.json"));
    }

    #[test]
    fn materialize_writes_engine_layout() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = JsonSerializer::new(dir.path().join("nested/configs"));

        let path = serializer.materialize(&experiment("baseline")).unwrap();
        assert_eq!(path, serializer.path_for("baseline"));

        let document: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(document["Config"]["seed"], 1024);
        assert_eq!(document["Config"]["sampleInterval"], 1.0);
        assert_eq!(document["Config"]["stepSize"], 0.001);
        assert_eq!(document["Hosts"][0]["pes"], 16);
        assert_eq!(document["Hosts"][0]["replica"], 5);
        assert_eq!(document["Hosts"][0]["vmScheduler"], "SpaceShared");
        assert_eq!(document["Microservices"][0]["name"], "mqtt_broker");
        assert_eq!(document["Microservices"][0]["maxReplicas"], 3);
        assert_eq!(document["Microservices"][0]["ramRatio"], 32);
        assert_eq!(document["Microservices"][0]["idleCPU"], 0);
        assert_eq!(document["Microservices"][0]["autoScale"][0]["telemetry"], "cpu");
        assert_eq!(document["NetworkServices"][0]["flows"], 3);
        assert_eq!(document["NetworkServices"][0]["Job"][1]["ms"], 1);
        assert_eq!(document["NetworkServices"][0]["Job"][1]["schedule"], 1);
    }

    #[test]
    fn materialize_overwrites_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = JsonSerializer::new(dir.path());
        let mut first = experiment("rerun");

        serializer.materialize(&first).unwrap();
        first.set_num_flows(9);
        let path = serializer.materialize(&first).unwrap();

        let document: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(document["NetworkServices"][0]["flows"], 9);
    }

    #[test]
    fn materialize_fails_when_dir_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("configs");
        fs::write(&blocker, "").unwrap();

        let serializer = JsonSerializer::new(&blocker);

        assert!(matches!(
            serializer.materialize(&experiment("blocked")),
            Err(SerializeError::CreateDir { .. })
        ));
    }
}
