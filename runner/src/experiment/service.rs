use super::Resource;
use serde::{Deserialize, Serialize};

/// Autoscaling rule, scale once `telemetry` crosses `threshold`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AutoScale {
    pub telemetry: String,
    pub threshold: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Microservice {
    pub name: String,
    // image size
    pub size: u64,
    pub cpus: u64,
    #[serde(default)]
    pub ram: u64,
    #[serde(default)]
    pub bw: u64,
    pub replicas: u64,
    pub max_replicas: u64,
    // amount of each resource a single flow consumes
    #[serde(default)]
    pub cpu_ratio: u64,
    #[serde(default)]
    pub ram_ratio: u64,
    #[serde(default)]
    pub bw_ratio: u64,
    #[serde(default)]
    pub idle_cpu: u64,
    #[serde(default)]
    pub idle_ram: u64,
    #[serde(default)]
    pub idle_bw: u64,
    #[serde(default)]
    pub auto_scale: Vec<AutoScale>,
}

impl Microservice {
    pub fn new(name: impl Into<String>, size: u64, cpus: u64, replicas: u64, max_replicas: u64) -> Self {
        Self {
            name: name.into(),
            size,
            cpus,
            ram: 0,
            bw: 0,
            replicas,
            max_replicas,
            cpu_ratio: 0,
            ram_ratio: 0,
            bw_ratio: 0,
            idle_cpu: 0,
            idle_ram: 0,
            idle_bw: 0,
            auto_scale: Vec::new(),
        }
    }

    pub fn add_auto_scale(&mut self, telemetry: impl Into<String>, threshold: f64) {
        self.auto_scale.push(AutoScale {
            telemetry: telemetry.into(),
            threshold,
        });
    }

    /// saturates at 0 for negative deltas
    pub fn scale(&mut self, resource: Resource, delta: i64) {
        let target = match resource {
            Resource::Cpu => &mut self.cpus,
            Resource::Ram => &mut self.ram,
            Resource::Bw => &mut self.bw,
        };

        *target = target.saturating_add_signed(delta);
    }
}
