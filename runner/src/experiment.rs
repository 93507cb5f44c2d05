pub mod network;
pub mod service;

pub use network::{create_network_service, Job, NetworkService};
pub use service::{AutoScale, Microservice};

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Component, Path},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Resource {0} does not exist, use cpu, ram or bw")]
    UnknownResource(String),
    #[error("Microservice {0} not found")]
    UnknownMicroservice(String),
    #[error("Experiment name {0:?} is not a valid file name")]
    InvalidName(String),
    #[error("Lists of microservices ({microservices}), schedules ({schedules}) and lengths ({lengths}) are mismatching")]
    MismatchedLengths {
        microservices: usize,
        schedules: usize,
        lengths: usize,
    },
    #[error("Failed to read experiment descriptor")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse yaml experiment descriptor: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Failed to parse json experiment descriptor: {0}")]
    Json(#[from] serde_json::Error),
}

/// Basic simulation parameters
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub seed: u64,
    // datacenter schedule interval, must be larger than step_size
    #[serde(default = "default_interval")]
    pub interval: f64,
    // data collection interval, must be larger than step_size
    #[serde(default = "default_interval")]
    pub sample_interval: f64,
    // should be smaller or equal to 0.01
    #[serde(default = "default_step_size")]
    pub step_size: f64,
}

impl SimulationConfig {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            interval: default_interval(),
            sample_interval: default_interval(),
            step_size: default_step_size(),
        }
    }
}

fn default_interval() -> f64 {
    1.0
}

fn default_step_size() -> f64 {
    0.001
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VmScheduler {
    #[default]
    SpaceShared,
    TimeShared,
}

impl VmScheduler {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpaceShared => "SpaceShared",
            Self::TimeShared => "TimeShared",
        }
    }
}

/// A (replicated) simulated host
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Host {
    pub cpus: u64,
    // MB
    pub ram: u64,
    // Mbps
    pub bw: u64,
    // MB
    pub storage: u64,
    pub static_power: f64,
    pub max_power: f64,
    pub replicas: u64,
    #[serde(default)]
    pub vm_scheduler: VmScheduler,
}

/// Resources of a microservice that can be scaled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Cpu,
    Ram,
    Bw,
}

impl FromStr for Resource {
    type Err = ExperimentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "ram" => Ok(Self::Ram),
            "bw" => Ok(Self::Bw),
            _ => Err(ExperimentError::UnknownResource(value.to_string())),
        }
    }
}

/// The name ends up as `<configs>/<name>.json` and `<output>/<name>`, so it
/// has to be exactly one normal path component.
pub fn check_name(name: &str) -> Result<(), ExperimentError> {
    let mut components = Path::new(name).components();

    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(ExperimentError::InvalidName(name.to_string())),
    }
}

/// Immutable description of one experiment.
///
/// The scheduler only ever looks at `name`, which doubles as the key for the
/// generated config artifact and the output directory. Keeping names unique
/// is up to whoever builds the experiments.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Experiment {
    pub name: String,
    pub config: SimulationConfig,
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub microservices: Vec<Microservice>,
    #[serde(default)]
    pub network_services: Vec<NetworkService>,
}

impl Experiment {
    pub fn new(
        name: impl Into<String>,
        config: SimulationConfig,
        hosts: Vec<Host>,
        microservices: Vec<Microservice>,
        network_services: Vec<NetworkService>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            hosts,
            microservices,
            network_services,
        }
    }

    /// load a descriptor from disk, json files by extension, everything else as yaml
    pub fn load(path: &Path) -> Result<Self, ExperimentError> {
        let content = fs::read_to_string(path)?;

        debug!(path = ?path, "Loading experiment descriptor");

        let experiment: Self = match path.extension().and_then(|extension| extension.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };

        check_name(&experiment.name)?;

        Ok(experiment)
    }

    /// add `delta` to `resource` of every microservice
    pub fn scale_all(&mut self, resource: Resource, delta: i64) {
        self.microservices
            .iter_mut()
            .for_each(|microservice| microservice.scale(resource, delta));
    }

    /// add `delta` to `resource` of the microservice called `name`
    pub fn scale(&mut self, name: &str, resource: Resource, delta: i64) -> Result<(), ExperimentError> {
        match self
            .microservices
            .iter_mut()
            .find(|microservice| microservice.name == name)
        {
            Some(microservice) => {
                microservice.scale(resource, delta);

                Ok(())
            }
            None => Err(ExperimentError::UnknownMicroservice(name.to_string())),
        }
    }

    pub fn set_num_flows(&mut self, flows: u64) {
        self.network_services
            .iter_mut()
            .for_each(|service| service.flows = flows);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn host() -> Host {
        Host {
            cpus: 16,
            ram: 65536,
            bw: 10000,
            storage: 102400,
            static_power: 300.0,
            max_power: 750.0,
            replicas: 5,
            vm_scheduler: VmScheduler::SpaceShared,
        }
    }

    pub fn experiment(name: &str) -> Experiment {
        let mut broker = Microservice::new("mqtt_broker", 512, 2, 1, 3);
        broker.ram_ratio = 32;
        broker.add_auto_scale("cpu", 0.5);

        let postgres = Microservice::new("postgresql", 2048, 2, 1, 3);

        Experiment::new(
            name,
            SimulationConfig::new(1024),
            vec![host()],
            vec![broker, postgres],
            vec![create_network_service("receive_data", &[0, 1], &[0, 1], &[10, 10], 3).unwrap()],
        )
    }

    #[test]
    fn parse_resource() {
        assert_eq!("CPU".parse::<Resource>().unwrap(), Resource::Cpu);
        assert_eq!("bw".parse::<Resource>().unwrap(), Resource::Bw);
        assert!(matches!(
            "disk".parse::<Resource>(),
            Err(ExperimentError::UnknownResource(name)) if name == "disk"
        ));
    }

    #[test]
    fn scale_all_microservices() {
        let mut experiment = experiment("scale_all");
        experiment.scale_all(Resource::Cpu, 2);

        assert!(experiment.microservices.iter().all(|ms| ms.cpus == 4));
    }

    #[test]
    fn scale_single_microservice() {
        let mut experiment = experiment("scale");
        experiment.scale("postgresql", Resource::Ram, 256).unwrap();

        assert_eq!(experiment.microservices[0].ram, 0);
        assert_eq!(experiment.microservices[1].ram, 256);
    }

    #[test]
    fn scale_never_underflows() {
        let mut experiment = experiment("underflow");
        experiment.scale("mqtt_broker", Resource::Bw, -10).unwrap();

        assert_eq!(experiment.microservices[0].bw, 0);
    }

    #[test]
    fn scale_unknown_microservice() {
        let mut experiment = experiment("unknown");

        assert!(matches!(
            experiment.scale("redis", Resource::Cpu, 1),
            Err(ExperimentError::UnknownMicroservice(_))
        ));
    }

    #[test]
    fn set_flows_on_all_services() {
        let mut experiment = experiment("flows");
        experiment.set_num_flows(7);

        assert!(experiment.network_services.iter().all(|ns| ns.flows == 7));
    }

    #[test]
    fn load_yaml_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.yaml");
        fs::write(
            &path,
            r#"
name: baseline
config:
  seed: 42
  step_size: 0.01
hosts:
  - cpus: 4
    ram: 1024
    bw: 100
    storage: 2048
    static_power: 100.0
    max_power: 250.0
    replicas: 2
    vm_scheduler: TimeShared
microservices:
  - name: redis
    size: 2048
    cpus: 2
    replicas: 1
    max_replicas: 3
    auto_scale:
      - telemetry: cpu
        threshold: 0.5
network_services:
  - name: lookup
    flows: 2
    jobs:
      - ms: 0
        length: 10
        schedule: 0
"#,
        )
        .unwrap();

        let experiment = Experiment::load(&path).unwrap();

        assert_eq!(experiment.name, "baseline");
        assert_eq!(experiment.config.interval, 1.0);
        assert_eq!(experiment.config.step_size, 0.01);
        assert_eq!(experiment.hosts[0].vm_scheduler, VmScheduler::TimeShared);
        assert_eq!(experiment.microservices[0].auto_scale.len(), 1);
        assert_eq!(experiment.network_services[0].jobs[0].length, 10);
    }

    #[test]
    fn reject_unknown_descriptor_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yml");
        fs::write(&path, "name: broken\nconfig: { seed: 1 }\nhosts: []\ncolour: red\n").unwrap();

        assert!(matches!(Experiment::load(&path), Err(ExperimentError::Yaml(_))));
    }

    #[test]
    fn experiment_names_are_single_components() {
        for name in ["baseline", "5_ns.v2", "with space"] {
            assert!(check_name(name).is_ok(), "{name}");
        }
        for name in ["", ".", "..", "../x", "a/b", "a\\b", "/abs", "trailing/"] {
            assert!(
                matches!(check_name(name), Err(ExperimentError::InvalidName(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn reject_descriptor_escaping_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("escape.yaml");
        fs::write(&path, "name: ../escape\nconfig: { seed: 1 }\nhosts: []\n").unwrap();

        assert!(matches!(
            Experiment::load(&path),
            Err(ExperimentError::InvalidName(name)) if name == "../escape"
        ));
    }
}
