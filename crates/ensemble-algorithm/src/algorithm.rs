//! The capability every decision engine provides.

use ensemble_state::{AlgorithmOptions, Ensemble, Job, Member, MemberType};

use crate::decision::Decision;
use crate::error::{AlgorithmError, AlgorithmResult};

/// A pluggable scaling/termination/submission policy.
///
/// `check` runs every tick before `make_decision`, since a member's type
/// and options can change between reconciles.
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Member types this algorithm can drive.
    fn supports(&self) -> &[MemberType];

    /// Check that the options are well-formed.
    fn validate(&self, options: &AlgorithmOptions) -> AlgorithmResult<()>;

    /// Check that the member's type is supported and its options are valid.
    fn check(&self, options: &AlgorithmOptions, member: &Member) -> AlgorithmResult<()> {
        let member_type = member.member_type();
        if !self.supports().contains(&member_type) {
            return Err(AlgorithmError::UnsupportedMemberType {
                algorithm: self.name().to_string(),
                member_type,
            });
        }
        self.validate(options)
    }

    /// Decide what to do for one member this tick, given the sidecar's
    /// status `payload` and the member's current slice of the job matrix.
    fn make_decision(
        &self,
        ensemble: &Ensemble,
        member: &Member,
        payload: &str,
        jobs: &[Job],
    ) -> AlgorithmResult<Decision>;
}
