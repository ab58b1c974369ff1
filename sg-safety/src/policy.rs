//! The risk policy table, spec.md §4.E: what safety machinery a locus's
//! risk class demands before and after its gene executes.

use sg_types::RiskClass;

/// What the executor must do for one invocation of a gene at a given risk
/// class. Looked up once per invocation from [`policy_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskPolicy {
    /// Wrap the capability and keep an undo log for this invocation.
    pub transaction: bool,
    /// A newly generated allele at this risk must clear shadow-kernel runs
    /// before it may run against the live capability at all.
    pub shadow_prequal: bool,
    /// A post-execution verification call is scheduled within the locus's
    /// convergence window.
    pub verification_required: bool,
    /// Verification also covers the resilience window, not just convergence.
    pub resilience_required: bool,
}

pub fn policy_for(risk: RiskClass) -> RiskPolicy {
    match risk {
        RiskClass::None => RiskPolicy {
            transaction: false,
            shadow_prequal: false,
            verification_required: false,
            resilience_required: false,
        },
        RiskClass::Low | RiskClass::Medium => RiskPolicy {
            transaction: true,
            shadow_prequal: false,
            verification_required: true,
            resilience_required: false,
        },
        RiskClass::High => RiskPolicy {
            transaction: true,
            shadow_prequal: true,
            verification_required: true,
            resilience_required: false,
        },
        RiskClass::Critical => RiskPolicy {
            transaction: true,
            shadow_prequal: true,
            verification_required: true,
            resilience_required: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_needs_nothing() {
        let p = policy_for(RiskClass::None);
        assert!(!p.transaction && !p.shadow_prequal && !p.verification_required);
    }

    #[test]
    fn low_and_medium_transact_but_skip_prequal() {
        for risk in [RiskClass::Low, RiskClass::Medium] {
            let p = policy_for(risk);
            assert!(p.transaction);
            assert!(!p.shadow_prequal);
            assert!(p.verification_required);
            assert!(!p.resilience_required);
        }
    }

    #[test]
    fn high_requires_shadow_prequal_without_resilience() {
        let p = policy_for(RiskClass::High);
        assert!(p.shadow_prequal);
        assert!(!p.resilience_required);
    }

    #[test]
    fn critical_requires_resilience_too() {
        let p = policy_for(RiskClass::Critical);
        assert!(p.shadow_prequal);
        assert!(p.resilience_required);
    }
}
