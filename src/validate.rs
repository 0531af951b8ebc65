//! Recipient validation: syntax check plus a bounded MX lookup.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::system_conf::read_system_conf;
use tracing::warn;

use crate::scan;

/// Request timeout and overall lookup budget for MX queries.
pub const LOOKUP_BUDGET: Duration = Duration::from_secs(5);

/// Why a candidate address was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Failed the whole-string syntax re-check.
    Syntax,
    /// The domain exists but has no MX records.
    NoMailRoute,
    /// The domain does not exist.
    DomainNotFound,
    /// The lookup exceeded the time budget.
    Timeout,
    /// Any other resolution failure.
    OtherLookupError,
}

impl RejectReason {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::NoMailRoute => "no_mail_route",
            Self::DomainNotFound => "domain_not_found",
            Self::Timeout => "timeout",
            Self::OtherLookupError => "lookup_error",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Validation verdict for a candidate address.
///
/// Lookup failures never raise past the validator; they resolve to a
/// `Rejected` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Rejected(RejectReason),
}

/// Capability trait so the pipeline can be tested without real DNS.
#[async_trait]
pub trait RecipientValidator: Send + Sync {
    async fn validate(&self, address: &str) -> Verdict;
}

// ── MX validator ────────────────────────────────────────────────────

/// Validates recipients against the domain's mail-routing records.
pub struct MxValidator {
    resolver: TokioAsyncResolver,
    budget: Duration,
}

impl Default for MxValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl MxValidator {
    pub fn new() -> Self {
        Self::with_budget(LOOKUP_BUDGET)
    }

    pub fn with_budget(budget: Duration) -> Self {
        // System resolver configuration when readable, public defaults
        // otherwise. The lookup budget overrides either way.
        let (config, mut opts) = read_system_conf()
            .unwrap_or_else(|_| (ResolverConfig::default(), ResolverOpts::default()));
        opts.timeout = budget;
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            budget,
        }
    }

    async fn lookup_mx(&self, domain: &str) -> LookupOutcome {
        match self.resolver.mx_lookup(domain).await {
            Ok(records) => LookupOutcome::Records(records.iter().count()),
            Err(e) => outcome_from_error(&e),
        }
    }
}

#[async_trait]
impl RecipientValidator for MxValidator {
    async fn validate(&self, address: &str) -> Verdict {
        if !scan::is_address(address) {
            warn!(address, "Rejected address: bad syntax");
            return Verdict::Rejected(RejectReason::Syntax);
        }

        let domain = scan::domain_of(address);
        let outcome = bounded(self.budget, self.lookup_mx(domain)).await;
        let verdict = verdict_for(outcome);

        if let Verdict::Rejected(reason) = verdict {
            warn!(domain, reason = reason.label(), "Rejected address: domain check failed");
        }
        verdict
    }
}

// ── Lookup classification ───────────────────────────────────────────

/// How a single MX lookup resolved, before it becomes a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LookupOutcome {
    Records(usize),
    NoRecords,
    NxDomain,
    TimedOut,
    Failed(String),
}

/// Run `lookup` under the time budget; an elapsed budget is a `TimedOut`
/// outcome, never an error.
async fn bounded<F>(budget: Duration, lookup: F) -> LookupOutcome
where
    F: Future<Output = LookupOutcome>,
{
    match tokio::time::timeout(budget, lookup).await {
        Ok(outcome) => outcome,
        Err(_) => LookupOutcome::TimedOut,
    }
}

fn outcome_from_error(err: &ResolveError) -> LookupOutcome {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            if *response_code == ResponseCode::NXDomain {
                LookupOutcome::NxDomain
            } else {
                LookupOutcome::NoRecords
            }
        }
        ResolveErrorKind::Timeout => LookupOutcome::TimedOut,
        other => LookupOutcome::Failed(other.to_string()),
    }
}

fn verdict_for(outcome: LookupOutcome) -> Verdict {
    match outcome {
        LookupOutcome::Records(0) | LookupOutcome::NoRecords => {
            Verdict::Rejected(RejectReason::NoMailRoute)
        }
        LookupOutcome::Records(_) => Verdict::Valid,
        LookupOutcome::NxDomain => Verdict::Rejected(RejectReason::DomainNotFound),
        LookupOutcome::TimedOut => Verdict::Rejected(RejectReason::Timeout),
        LookupOutcome::Failed(_) => Verdict::Rejected(RejectReason::OtherLookupError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_found_is_valid() {
        assert_eq!(verdict_for(LookupOutcome::Records(3)), Verdict::Valid);
        assert_eq!(verdict_for(LookupOutcome::Records(1)), Verdict::Valid);
    }

    #[test]
    fn zero_records_is_no_mail_route() {
        assert_eq!(
            verdict_for(LookupOutcome::Records(0)),
            Verdict::Rejected(RejectReason::NoMailRoute)
        );
        assert_eq!(
            verdict_for(LookupOutcome::NoRecords),
            Verdict::Rejected(RejectReason::NoMailRoute)
        );
    }

    #[test]
    fn nxdomain_is_domain_not_found() {
        assert_eq!(
            verdict_for(LookupOutcome::NxDomain),
            Verdict::Rejected(RejectReason::DomainNotFound)
        );
    }

    #[test]
    fn other_failures_are_lookup_errors() {
        assert_eq!(
            verdict_for(LookupOutcome::Failed("connection refused".into())),
            Verdict::Rejected(RejectReason::OtherLookupError)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_lookup_resolves_as_timeout_within_budget() {
        // A lookup that never returns must still resolve within the budget.
        let outcome = bounded(LOOKUP_BUDGET, std::future::pending()).await;
        assert_eq!(outcome, LookupOutcome::TimedOut);
        assert_eq!(verdict_for(outcome), Verdict::Rejected(RejectReason::Timeout));
    }

    #[tokio::test]
    async fn completed_lookup_passes_through_budget() {
        let outcome = bounded(LOOKUP_BUDGET, async { LookupOutcome::Records(2) }).await;
        assert_eq!(outcome, LookupOutcome::Records(2));
    }

    #[tokio::test]
    async fn validator_builds_from_system_conf_with_custom_budget() {
        // Constructor must succeed whether or not a system resolver
        // configuration is readable, and the budget must stick.
        let validator = MxValidator::with_budget(Duration::from_millis(50));
        assert_eq!(validator.budget, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn syntax_recheck_rejects_before_any_lookup() {
        // No DNS traffic happens for a syntactically invalid address, so
        // this is safe against a real resolver.
        let validator = MxValidator::new();
        assert_eq!(
            validator.validate("not an address").await,
            Verdict::Rejected(RejectReason::Syntax)
        );
    }
}
