//! Structural validation of ensemble declarations.
//!
//! Validation runs at the start of every reconciliation tick and when an
//! ensemble is submitted through the API. A failure blocks all progress for
//! the ensemble until the declaration is corrected.

use tracing::debug;

use crate::error::ValidationError;
use crate::types::*;

const MAX_NAME_LEN: usize = 63;

impl Ensemble {
    /// Check the ensemble against its structural invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("namespace", &self.namespace)?;
        validate_name("name", &self.name)?;
        if self.members.is_empty() {
            return Err(ValidationError::NoMembers);
        }
        if self.check_seconds == 0 {
            return Err(ValidationError::InvalidCheckInterval);
        }

        let mut known = 0;
        for (i, member) in self.members.iter().enumerate() {
            debug!(
                ensemble = %self.id(),
                member = i,
                algorithm = %self.algorithm_for(member).name,
                member_type = %member.member_type(),
                "validating member"
            );
            validate_member(i, member)?;
            if member.member_type() != MemberType::Unknown {
                known += 1;
            }
        }

        if known == 0 {
            return Err(ValidationError::NoKnownMembers);
        }
        Ok(())
    }
}

/// Names end up in store keys (`{namespace}/{name}`, `{id}:{ordinal}`) and
/// member resource names, so they are held to DNS-1123 labels.
fn validate_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let valid_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';
    let valid = !value.is_empty()
        && value.len() <= MAX_NAME_LEN
        && value.chars().all(valid_char)
        && !value.starts_with('-')
        && !value.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidName {
            field,
            value: value.to_string(),
        })
    }
}

fn validate_member(i: usize, member: &Member) -> Result<(), ValidationError> {
    if member.jobs.is_empty() {
        return Err(ValidationError::NoJobs(i));
    }

    for job in &member.jobs {
        if let Some(tasks) = job.tasks
            && tasks != 0
            && job.nodes > tasks
        {
            return Err(ValidationError::NodesExceedTasks {
                member: i,
                job: job.name.clone(),
                nodes: job.nodes,
                tasks,
            });
        }
    }

    let Some(cluster) = &member.minicluster else {
        return Ok(());
    };

    let max_size = cluster.effective_max_size();
    if cluster.size == 0 || max_size == 0 || cluster.min_size == 0 {
        return Err(ValidationError::InvalidSize(i));
    }
    if cluster.min_size > max_size {
        return Err(ValidationError::MinExceedsMax(i));
    }
    if cluster.size < cluster.min_size || cluster.size > max_size {
        return Err(ValidationError::SizeOutOfBounds(i));
    }

    for job in &member.jobs {
        if job.nodes > max_size {
            return Err(ValidationError::NodesExceedMaxSize {
                member: i,
                job: job.name.clone(),
                nodes: job.nodes,
                max_size,
            });
        }
    }

    let image = member
        .sidecar
        .image
        .split_once('@')
        .map(|(base, _)| base)
        .unwrap_or(&member.sidecar.image);
    if !SIDECAR_IMAGES.contains(&image) {
        return Err(ValidationError::UnsupportedSidecar {
            member: i,
            image: image.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(size: u32, min_size: u32, max_size: u32) -> ClusterSpec {
        ClusterSpec {
            size,
            min_size,
            max_size,
            image: None,
        }
    }

    fn member(jobs: Vec<Job>) -> Member {
        Member {
            minicluster: Some(cluster(1, 1, 4)),
            sidecar: Sidecar::default(),
            jobs,
            algorithm: None,
        }
    }

    fn ensemble(members: Vec<Member>) -> Ensemble {
        Ensemble {
            namespace: "default".to_string(),
            name: "hpc".to_string(),
            members,
            check_seconds: 10,
            algorithm: None,
            created_at: 0,
            updated_at: 0,
            status_generation: 0,
        }
    }

    #[test]
    fn valid_ensemble_passes() {
        let e = ensemble(vec![member(vec![Job::new("a", "echo", 3, 2)])]);
        assert_eq!(e.validate(), Ok(()));
    }

    #[test]
    fn requires_members() {
        assert_eq!(ensemble(vec![]).validate(), Err(ValidationError::NoMembers));
    }

    #[test]
    fn requires_jobs_per_member() {
        let e = ensemble(vec![member(vec![Job::new("a", "echo", 1, 1)]), member(vec![])]);
        assert_eq!(e.validate(), Err(ValidationError::NoJobs(1)));
    }

    #[test]
    fn nodes_cannot_exceed_tasks() {
        let mut job = Job::new("a", "echo", 1, 3);
        job.tasks = Some(2);
        let e = ensemble(vec![member(vec![job])]);
        assert!(matches!(
            e.validate(),
            Err(ValidationError::NodesExceedTasks { nodes: 3, tasks: 2, .. })
        ));
    }

    #[test]
    fn unset_tasks_does_not_constrain_nodes() {
        let mut job = Job::new("a", "echo", 1, 3);
        job.tasks = Some(0);
        let e = ensemble(vec![member(vec![job])]);
        assert_eq!(e.validate(), Ok(()));
    }

    #[test]
    fn job_nodes_cannot_exceed_max_size() {
        let e = ensemble(vec![member(vec![Job::new("big", "echo", 1, 8)])]);
        assert!(matches!(
            e.validate(),
            Err(ValidationError::NodesExceedMaxSize { nodes: 8, max_size: 4, .. })
        ));
    }

    #[test]
    fn sizing_invariants() {
        let mut m = member(vec![Job::new("a", "echo", 1, 1)]);

        m.minicluster = Some(cluster(0, 1, 4));
        assert_eq!(ensemble(vec![m.clone()]).validate(), Err(ValidationError::InvalidSize(0)));

        m.minicluster = Some(cluster(2, 0, 4));
        assert_eq!(ensemble(vec![m.clone()]).validate(), Err(ValidationError::InvalidSize(0)));

        m.minicluster = Some(cluster(3, 5, 4));
        assert_eq!(ensemble(vec![m.clone()]).validate(), Err(ValidationError::MinExceedsMax(0)));

        m.minicluster = Some(cluster(6, 1, 4));
        assert_eq!(
            ensemble(vec![m.clone()]).validate(),
            Err(ValidationError::SizeOutOfBounds(0))
        );

        m.minicluster = Some(cluster(1, 2, 4));
        assert_eq!(ensemble(vec![m]).validate(), Err(ValidationError::SizeOutOfBounds(0)));
    }

    #[test]
    fn sidecar_digest_is_ignored() {
        let mut m = member(vec![Job::new("a", "echo", 1, 1)]);
        m.sidecar.image = format!("{DEFAULT_SIDECAR_IMAGE}@sha256:abcdef");
        assert_eq!(ensemble(vec![m]).validate(), Ok(()));
    }

    #[test]
    fn unknown_sidecar_is_rejected() {
        let mut m = member(vec![Job::new("a", "echo", 1, 1)]);
        m.sidecar.image = "docker.io/library/alpine:latest".to_string();
        assert!(matches!(
            ensemble(vec![m]).validate(),
            Err(ValidationError::UnsupportedSidecar { member: 0, .. })
        ));
    }

    #[test]
    fn all_unknown_members_are_rejected() {
        let mut m = member(vec![Job::new("a", "echo", 1, 1)]);
        m.minicluster = None;
        assert_eq!(ensemble(vec![m]).validate(), Err(ValidationError::NoKnownMembers));
    }

    #[test]
    fn zero_check_interval_is_rejected() {
        let mut e = ensemble(vec![member(vec![Job::new("a", "echo", 1, 1)])]);
        e.check_seconds = 0;
        assert_eq!(e.validate(), Err(ValidationError::InvalidCheckInterval));
    }

    #[test]
    fn names_must_be_dns_labels() {
        let long = "a".repeat(64);
        for bad in ["", "b:0", "a/b", "HPC", "-hpc", "hpc-", "hpc_1", long.as_str()] {
            let mut e = ensemble(vec![member(vec![Job::new("a", "echo", 1, 1)])]);
            e.name = bad.to_string();
            assert!(
                matches!(e.validate(), Err(ValidationError::InvalidName { field: "name", .. })),
                "{bad:?} should be rejected"
            );
        }

        let mut e = ensemble(vec![member(vec![Job::new("a", "echo", 1, 1)])]);
        e.namespace = "team/a".to_string();
        assert!(matches!(
            e.validate(),
            Err(ValidationError::InvalidName { field: "namespace", .. })
        ));

        e.namespace = "team-a".to_string();
        e.name = "lammps-2".to_string();
        assert_eq!(e.validate(), Ok(()));
    }
}
