//! Domain types for ensembles.
//!
//! These types describe the desired state of an ensemble (its members and
//! their declared job groups), the status subresource that carries the job
//! matrix across reconciliation ticks, and the live record of each member's
//! compute cluster. All types are serializable to/from JSON for storage in
//! redb tables and for the REST API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for an ensemble (`{namespace}/{name}`).
pub type EnsembleId = String;

/// Algorithm used when neither the member nor the ensemble names one.
pub const DEFAULT_ALGORITHM: &str = "workload-demand";

/// Sidecar image used when a member does not set one.
pub const DEFAULT_SIDECAR_IMAGE: &str =
    "ghcr.io/converged-computing/ensemble-operator-api:rockylinux9";

/// Sidecar bases a member may run (digest suffixes are ignored).
pub const SIDECAR_IMAGES: &[&str] = &[
    "ghcr.io/converged-computing/ensemble-operator-api:rockylinux9-test",
    "ghcr.io/converged-computing/ensemble-operator-api:rockylinux9",
    "ghcr.io/converged-computing/ensemble-operator-api:rockylinux8",
    "ghcr.io/converged-computing/ensemble-operator-api:ubuntu-focal",
    "ghcr.io/converged-computing/ensemble-operator-api:ubuntu-jammy",
];

// ── Ensemble ──────────────────────────────────────────────────────

/// The top-level desired-state object: an ordered list of members that
/// are reconciled every `check_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ensemble {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    /// Members, identified by their position in this list.
    pub members: Vec<Member>,
    /// Seconds between reconciliation ticks.
    #[serde(default = "default_check_seconds")]
    pub check_seconds: u32,
    /// Default algorithm for members that do not name their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<AlgorithmRef>,
    /// Unix timestamp (seconds) when this ensemble was created.
    #[serde(default)]
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last spec or status change.
    #[serde(default)]
    pub updated_at: u64,
    /// Generation of the last committed status.
    #[serde(default)]
    pub status_generation: u64,
}

impl Ensemble {
    /// The ensemble id, also its key in the ensembles table.
    pub fn id(&self) -> EnsembleId {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Name of the compute cluster backing the member at `ordinal`.
    pub fn member_name(&self, ordinal: usize) -> String {
        format!("{}-{}", self.name, ordinal)
    }

    /// Resolve the algorithm for a member: the member's own, then the
    /// ensemble default, then [`DEFAULT_ALGORITHM`].
    pub fn algorithm_for(&self, member: &Member) -> AlgorithmRef {
        member
            .algorithm
            .clone()
            .or_else(|| self.algorithm.clone())
            .unwrap_or_default()
    }
}

/// One independently-scaled unit of an ensemble.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    /// Cluster sizing descriptor. A member without one has an unknown type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minicluster: Option<ClusterSpec>,
    /// The telemetry/action sidecar running next to the cluster's lead broker.
    #[serde(default)]
    pub sidecar: Sidecar,
    /// Declared job groups, copied into the job matrix on first reconcile.
    pub jobs: Vec<Job>,
    /// Member-specific algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<AlgorithmRef>,
}

impl Member {
    pub fn member_type(&self) -> MemberType {
        if self.minicluster.is_some() {
            MemberType::MiniCluster
        } else {
            MemberType::Unknown
        }
    }
}

/// Kind of compute cluster a member runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    MiniCluster,
    Unknown,
}

impl MemberType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::MiniCluster => "minicluster",
            MemberType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MemberType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node-count sizing of a member's compute cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSpec {
    #[serde(default = "default_one")]
    pub size: u32,
    #[serde(default = "default_one")]
    pub min_size: u32,
    /// Zero means "same as size".
    #[serde(default)]
    pub max_size: u32,
    /// Container image for the cluster's workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ClusterSpec {
    pub fn effective_max_size(&self) -> u32 {
        if self.max_size == 0 {
            self.size
        } else {
            self.max_size
        }
    }
}

/// Sidecar / transport descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sidecar {
    #[serde(default = "default_sidecar_image")]
    pub image: String,
    #[serde(default)]
    pub pull_always: bool,
    #[serde(default = "default_sidecar_port")]
    pub port: u16,
    #[serde(default = "default_sidecar_workers")]
    pub workers: u32,
}

impl Default for Sidecar {
    fn default() -> Self {
        Self {
            image: default_sidecar_image(),
            pull_always: false,
            port: default_sidecar_port(),
            workers: default_sidecar_workers(),
        }
    }
}

// ── Algorithm reference ───────────────────────────────────────────

/// A named algorithm plus its option bag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlgorithmRef {
    #[serde(default = "default_algorithm_name")]
    pub name: String,
    #[serde(default)]
    pub options: AlgorithmOptions,
}

impl Default for AlgorithmRef {
    fn default() -> Self {
        Self {
            name: default_algorithm_name(),
            options: AlgorithmOptions::default(),
        }
    }
}

/// A single option value: string, integer, or boolean.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptionValue {
    /// Booleans, plus the strings `yes`/`no`/`true`/`false`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            OptionValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" => Some(true),
                "no" | "false" => Some(false),
                _ => None,
            },
            OptionValue::Int(_) => None,
        }
    }

    /// Integers, plus numeric strings.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            OptionValue::Str(s) => s.trim().parse().ok(),
            OptionValue::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

/// Name-keyed option bag for an algorithm.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AlgorithmOptions(pub BTreeMap<String, OptionValue>);

impl AlgorithmOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and fixtures.
    pub fn with(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    /// A boolean option; unset or unparseable values yield `default`.
    pub fn bool_option(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(OptionValue::as_bool).unwrap_or(default)
    }

    /// A strictly positive integer option; anything else yields `default`.
    pub fn positive_int_option(&self, key: &str, default: u32) -> u32 {
        self.get(key)
            .and_then(OptionValue::as_int)
            .filter(|v| *v > 0)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(default)
    }

    pub fn string_option(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(OptionValue::as_str)
            .unwrap_or(default)
            .to_string()
    }
}

// ── Jobs ──────────────────────────────────────────────────────────

/// A declared group of identical jobs with a remaining submission count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub name: String,
    pub command: String,
    /// How many more times this group should be submitted. Zero means
    /// fully submitted; the entry is kept.
    #[serde(default = "default_one")]
    pub count: u32,
    #[serde(default = "default_one")]
    pub nodes: u32,
    /// Node count may not exceed the task count when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    /// Duration limit in seconds; zero is unlimited.
    #[serde(default)]
    pub duration: u32,
}

impl Job {
    pub fn new(name: &str, command: &str, count: u32, nodes: u32) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            count,
            nodes,
            tasks: None,
            workdir: None,
            duration: 0,
        }
    }
}

/// Remaining work per member, keyed by the stringified member ordinal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct JobMatrix(pub BTreeMap<String, Vec<Job>>);

impl JobMatrix {
    /// Copy every member's declared jobs verbatim.
    pub fn from_members(members: &[Member]) -> Self {
        let entries = members
            .iter()
            .enumerate()
            .map(|(i, member)| (i.to_string(), member.jobs.clone()))
            .collect();
        Self(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Jobs recorded for the member at `ordinal` (empty if none).
    pub fn jobs(&self, ordinal: usize) -> &[Job] {
        self.0
            .get(&ordinal.to_string())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_jobs(&mut self, ordinal: usize, jobs: Vec<Job>) {
        self.0.insert(ordinal.to_string(), jobs);
    }
}

/// The status subresource of an ensemble.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnsembleStatus {
    #[serde(default)]
    pub jobs: JobMatrix,
    /// Incremented on every committed status write.
    #[serde(default)]
    pub generation: u64,
}

// ── Member clusters ───────────────────────────────────────────────

/// Live record of the compute cluster backing one member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberCluster {
    pub ensemble_id: EnsembleId,
    pub ordinal: usize,
    /// Resource name: `{ensemble name}-{ordinal}`.
    pub name: String,
    pub size: u32,
    pub min_size: u32,
    pub max_size: u32,
    /// Lead broker address (host or ip) once the cluster is up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl MemberCluster {
    /// Build the composite key for the clusters table.
    pub fn table_key(&self) -> String {
        cluster_key(&self.ensemble_id, self.ordinal)
    }
}

/// Composite key `{ensemble_id}:{ordinal}` for a member cluster.
pub fn cluster_key(ensemble_id: &str, ordinal: usize) -> String {
    format!("{ensemble_id}:{ordinal}")
}

// ── serde defaults ────────────────────────────────────────────────

fn default_namespace() -> String {
    "default".to_string()
}

fn default_check_seconds() -> u32 {
    10
}

fn default_one() -> u32 {
    1
}

fn default_algorithm_name() -> String {
    DEFAULT_ALGORITHM.to_string()
}

fn default_sidecar_image() -> String {
    DEFAULT_SIDECAR_IMAGE.to_string()
}

fn default_sidecar_port() -> u16 {
    50051
}

fn default_sidecar_workers() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensemble_defaults_from_minimal_json() {
        let json = r#"{
            "name": "hpc",
            "members": [{
                "minicluster": {"size": 2, "max_size": 4},
                "jobs": [{"name": "lammps", "command": "lmp -in in.reaxc"}]
            }]
        }"#;
        let ensemble: Ensemble = serde_json::from_str(json).unwrap();
        assert_eq!(ensemble.id(), "default/hpc");
        assert_eq!(ensemble.check_seconds, 10);

        let member = &ensemble.members[0];
        assert_eq!(member.member_type(), MemberType::MiniCluster);
        assert_eq!(member.sidecar.port, 50051);
        assert_eq!(member.sidecar.workers, 10);
        assert_eq!(member.jobs[0].count, 1);
        assert_eq!(member.jobs[0].nodes, 1);
        assert_eq!(member.jobs[0].tasks, None);

        let cluster = member.minicluster.as_ref().unwrap();
        assert_eq!(cluster.min_size, 1);
        assert_eq!(cluster.effective_max_size(), 4);
    }

    #[test]
    fn max_size_zero_means_size() {
        let spec = ClusterSpec {
            size: 3,
            min_size: 1,
            max_size: 0,
            image: None,
        };
        assert_eq!(spec.effective_max_size(), 3);
    }

    #[test]
    fn member_without_cluster_is_unknown() {
        let member = Member {
            minicluster: None,
            sidecar: Sidecar::default(),
            jobs: vec![],
            algorithm: None,
        };
        assert_eq!(member.member_type().as_str(), "unknown");
    }

    #[test]
    fn algorithm_resolution_order() {
        let mut ensemble: Ensemble = serde_json::from_str(
            r#"{"name": "e", "members": [{"jobs": []}]}"#,
        )
        .unwrap();
        let member = ensemble.members[0].clone();
        assert_eq!(ensemble.algorithm_for(&member).name, DEFAULT_ALGORITHM);

        ensemble.algorithm = Some(AlgorithmRef {
            name: "global".to_string(),
            options: AlgorithmOptions::new(),
        });
        assert_eq!(ensemble.algorithm_for(&member).name, "global");

        let mut member = member;
        member.algorithm = Some(AlgorithmRef {
            name: "local".to_string(),
            options: AlgorithmOptions::new(),
        });
        assert_eq!(ensemble.algorithm_for(&member).name, "local");
    }

    #[test]
    fn option_values_deserialize_untagged() {
        let options: AlgorithmOptions = serde_json::from_str(
            r#"{"randomize": false, "terminateChecks": 3, "scaleUpStrategy": "largestJob", "disableTermination": "yes"}"#,
        )
        .unwrap();
        assert!(!options.bool_option("randomize", true));
        assert_eq!(options.positive_int_option("terminateChecks", 10), 3);
        assert_eq!(options.string_option("scaleUpStrategy", "nextJob"), "largestJob");
        assert!(options.bool_option("disableTermination", false));
    }

    #[test]
    fn option_accessors_fall_back_to_defaults() {
        let options = AlgorithmOptions::new()
            .with("terminateChecks", 0i64)
            .with("scaleChecks", "-2")
            .with("randomize", "maybe");
        assert_eq!(options.positive_int_option("terminateChecks", 10), 10);
        assert_eq!(options.positive_int_option("scaleChecks", 5), 5);
        assert!(options.bool_option("randomize", true));
        assert_eq!(options.positive_int_option("missing", 7), 7);
    }

    #[test]
    fn numeric_strings_are_integers() {
        let options = AlgorithmOptions::new().with("scaleChecks", "12");
        assert_eq!(options.positive_int_option("scaleChecks", 5), 12);
    }

    #[test]
    fn job_matrix_copies_declared_jobs() {
        let members = vec![
            Member {
                minicluster: None,
                sidecar: Sidecar::default(),
                jobs: vec![Job::new("a", "echo a", 3, 2)],
                algorithm: None,
            },
            Member {
                minicluster: None,
                sidecar: Sidecar::default(),
                jobs: vec![Job::new("b", "echo b", 1, 1), Job::new("c", "echo c", 0, 1)],
                algorithm: None,
            },
        ];
        let matrix = JobMatrix::from_members(&members);
        assert_eq!(matrix.jobs(0), members[0].jobs.as_slice());
        assert_eq!(matrix.jobs(1), members[1].jobs.as_slice());
        assert!(matrix.jobs(2).is_empty());

        let json = serde_json::to_value(&matrix).unwrap();
        assert_eq!(json["0"][0]["count"], 3);
        assert_eq!(json["1"][1]["name"], "c");
    }

    #[test]
    fn cluster_key_format() {
        assert_eq!(cluster_key("default/hpc", 2), "default/hpc:2");
    }
}
