use super::ExperimentError;
use serde::{Deserialize, Serialize};

/// A single step of a network service
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Job {
    // index into the experiment's microservices
    pub ms: usize,
    // MIPS
    pub length: u64,
    // discrete time slot
    pub schedule: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkService {
    pub name: String,
    pub flows: u64,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl NetworkService {
    pub fn new(name: impl Into<String>, flows: u64) -> Self {
        Self {
            name: name.into(),
            flows,
            jobs: Vec::new(),
        }
    }

    pub fn add_job(&mut self, job: Job) {
        self.jobs.push(job);
    }

    /// Shift every job by `offset` slots, which allows reusing a predefined
    /// service with a different start time. Saturates at slot 0.
    pub fn offset_schedule(&mut self, offset: i64) {
        self.jobs
            .iter_mut()
            .for_each(|job| job.schedule = job.schedule.saturating_add_signed(offset));
    }
}

/// Build a network service from parallel lists, one job per microservice entry.
pub fn create_network_service(
    name: impl Into<String>,
    microservices: &[usize],
    schedules: &[u64],
    lengths: &[u64],
    flows: u64,
) -> Result<NetworkService, ExperimentError> {
    if microservices.len() != schedules.len() || microservices.len() != lengths.len() {
        return Err(ExperimentError::MismatchedLengths {
            microservices: microservices.len(),
            schedules: schedules.len(),
            lengths: lengths.len(),
        });
    }

    let mut service = NetworkService::new(name, flows);

    microservices
        .iter()
        .zip(schedules.iter())
        .zip(lengths.iter())
        .for_each(|((&ms, &schedule), &length)| {
            service.add_job(Job {
                ms,
                length,
                schedule,
            })
        });

    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_pairs_jobs_in_order() {
        let service = create_network_service("register_device", &[2, 5, 1], &[0, 1, 1], &[10, 20, 30], 3).unwrap();

        assert_eq!(service.flows, 3);
        assert_eq!(
            service.jobs,
            vec![
                Job { ms: 2, length: 10, schedule: 0 },
                Job { ms: 5, length: 20, schedule: 1 },
                Job { ms: 1, length: 30, schedule: 1 },
            ]
        );
    }

    #[test]
    fn create_rejects_mismatched_lists() {
        let result = create_network_service("broken", &[0, 1], &[0], &[10, 10], 1);

        assert!(matches!(
            result,
            Err(ExperimentError::MismatchedLengths {
                microservices: 2,
                schedules: 1,
                lengths: 2
            })
        ));
    }

    #[test]
    fn offset_shifts_all_jobs() {
        let mut service = create_network_service("retrieve_data", &[0, 1], &[0, 3], &[10, 10], 1).unwrap();

        service.offset_schedule(5);
        assert_eq!(service.jobs.iter().map(|job| job.schedule).collect::<Vec<_>>(), vec![5, 8]);

        service.offset_schedule(-6);
        assert_eq!(service.jobs.iter().map(|job| job.schedule).collect::<Vec<_>>(), vec![0, 2]);
    }
}
