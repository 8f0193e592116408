//! Access Gate
//!
//! Decides, before any artifact content is fetched, whether this page load
//! may play it. A share token in the link takes priority; without one the
//! viewer needs a verified payment, otherwise they are sent to the paywall.
//!
//! `PageGate` lives for exactly one page load. `plan` yields the single
//! check to run and never yields it twice, so repeated host effects cannot
//! spend a token twice. A reload creates a new gate and spends another use.

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::storage::{LocalStore, PaymentSlots};
use crate::tokens::{token_fingerprint, ConsumeOutcome, ConsumeRejection, ShareTokenRegistry, TokenTable};

/// Paywall entry point
pub const PAYWALL_PATH: &str = "/pricing";

/// The one check a page load must run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateCheck {
    ConsumeToken { token: String },
    CheckPayment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "via")]
pub enum GrantedVia {
    #[serde(rename_all = "camelCase")]
    ShareToken { uses_remaining: u32 },
    PaidSession,
}

/// What the viewer is told when a token is refused
///
/// Mismatched tokens are reported as invalid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DenialNotice {
    Exhausted,
    Invalid,
}

impl DenialNotice {
    pub fn message(&self) -> &'static str {
        match self {
            DenialNotice::Exhausted => "This link has already been opened the maximum number of times.",
            DenialNotice::Invalid => "This link is not valid.",
        }
    }
}

impl From<ConsumeRejection> for DenialNotice {
    fn from(reason: ConsumeRejection) -> Self {
        match reason {
            ConsumeRejection::Exhausted => DenialNotice::Exhausted,
            ConsumeRejection::Invalid | ConsumeRejection::Mismatch => DenialNotice::Invalid,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(GrantedVia),
    Denied(DenialNotice),
    RedirectToPaywall,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }

    pub fn from_outcome(outcome: ConsumeOutcome) -> Self {
        match outcome {
            ConsumeOutcome::Consumed { uses_remaining } => {
                AccessDecision::Granted(GrantedVia::ShareToken { uses_remaining })
            }
            ConsumeOutcome::Rejected(reason) => AccessDecision::Denied(reason.into()),
        }
    }
}

/// Access state for one page load of one artifact
#[derive(Clone, Debug)]
pub struct PageGate {
    exso_id: String,
    token: Option<String>,
    planned: bool,
    decision: Option<AccessDecision>,
}

impl PageGate {
    /// Blank tokens count as absent
    pub fn new(exso_id: &str, token: Option<&str>) -> Self {
        Self {
            exso_id: exso_id.to_string(),
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            planned: false,
            decision: None,
        }
    }

    pub fn exso_id(&self) -> &str {
        &self.exso_id
    }

    pub fn decision(&self) -> Option<AccessDecision> {
        self.decision
    }

    /// The check to run; `None` once it has been handed out
    pub fn plan(&mut self) -> Option<GateCheck> {
        if std::mem::replace(&mut self.planned, true) {
            return None;
        }
        Some(match &self.token {
            Some(token) => GateCheck::ConsumeToken {
                token: token.clone(),
            },
            None => GateCheck::CheckPayment,
        })
    }

    /// Record the result of the token check; later calls keep the first
    pub fn settle_token(&mut self, outcome: ConsumeOutcome) -> AccessDecision {
        *self
            .decision
            .get_or_insert_with(|| AccessDecision::from_outcome(outcome))
    }

    /// Record the result of the payment check; later calls keep the first
    pub fn settle_payment(&mut self, verified: bool) -> AccessDecision {
        *self.decision.get_or_insert(if verified {
            AccessDecision::Granted(GrantedVia::PaidSession)
        } else {
            AccessDecision::RedirectToPaywall
        })
    }

    /// Run the planned check against device-local state
    pub fn check_local<T, S>(
        &mut self,
        registry: &ShareTokenRegistry<T>,
        payments: &PaymentSlots,
        store: &S,
        now_ms: u64,
    ) -> Result<AccessDecision>
    where
        T: TokenTable,
        S: LocalStore + ?Sized,
    {
        let decision = match self.plan() {
            Some(GateCheck::ConsumeToken { token }) => {
                let outcome = registry.consume(&token, &self.exso_id, now_ms)?;
                info!(
                    exso_id = %self.exso_id,
                    token = %token_fingerprint(&token),
                    ok = outcome.is_ok(),
                    "Share token presented"
                );
                self.settle_token(outcome)
            }
            Some(GateCheck::CheckPayment) => self.settle_payment(payments.is_verified(store)),
            None => self.decision.unwrap_or(AccessDecision::RedirectToPaywall),
        };
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::tokens::MemoryTokenTable;

    #[test]
    fn test_plan_is_handed_out_once() {
        let mut gate = PageGate::new("exso-1", Some("tok"));
        assert_eq!(
            gate.plan(),
            Some(GateCheck::ConsumeToken {
                token: "tok".to_string()
            })
        );
        assert_eq!(gate.plan(), None);

        let mut gate = PageGate::new("exso-1", Some("  "));
        assert_eq!(gate.plan(), Some(GateCheck::CheckPayment));
    }

    #[test]
    fn test_repeated_checks_spend_one_use() {
        let registry = ShareTokenRegistry::new(MemoryTokenTable::new());
        let token = registry.issue("exso-1", 0).unwrap();
        let store = MemoryStore::new();
        let payments = PaymentSlots::default();

        let mut gate = PageGate::new("exso-1", Some(&token));
        let first = gate.check_local(&registry, &payments, &store, 1).unwrap();
        let second = gate.check_local(&registry, &payments, &store, 2).unwrap();
        assert_eq!(first, AccessDecision::Granted(GrantedVia::ShareToken { uses_remaining: 1 }));
        assert_eq!(first, second);
        assert_eq!(registry.peek(&token).unwrap().unwrap().uses_remaining, 1);

        // A reload is a new gate and spends another use
        let mut reload = PageGate::new("exso-1", Some(&token));
        assert_eq!(
            reload.check_local(&registry, &payments, &store, 3).unwrap(),
            AccessDecision::Granted(GrantedVia::ShareToken { uses_remaining: 0 })
        );
        let mut third = PageGate::new("exso-1", Some(&token));
        assert_eq!(
            third.check_local(&registry, &payments, &store, 4).unwrap(),
            AccessDecision::Denied(DenialNotice::Exhausted)
        );
    }

    #[test]
    fn test_mismatch_is_reported_as_invalid() {
        let registry = ShareTokenRegistry::new(MemoryTokenTable::new());
        let token = registry.issue("exso-1", 0).unwrap();
        let mut gate = PageGate::new("exso-2", Some(&token));
        let decision = gate
            .check_local(&registry, &PaymentSlots::default(), &MemoryStore::new(), 1)
            .unwrap();
        assert_eq!(decision, AccessDecision::Denied(DenialNotice::Invalid));
    }

    #[test]
    fn test_no_token_no_payment_redirects() {
        let registry = ShareTokenRegistry::new(MemoryTokenTable::new());
        let store = MemoryStore::new();
        let mut gate = PageGate::new("exso-1", None);
        let decision = gate
            .check_local(&registry, &PaymentSlots::default(), &store, 1)
            .unwrap();
        assert_eq!(decision, AccessDecision::RedirectToPaywall);
        assert!(!decision.is_granted());
    }

    #[test]
    fn test_verified_payment_grants() {
        let registry = ShareTokenRegistry::new(MemoryTokenTable::new());
        let store = MemoryStore::new();
        let payments = PaymentSlots::default();
        payments.set_verified(&store).unwrap();

        let mut gate = PageGate::new("exso-1", None);
        assert_eq!(
            gate.check_local(&registry, &payments, &store, 1).unwrap(),
            AccessDecision::Granted(GrantedVia::PaidSession)
        );
    }

    #[test]
    fn test_settle_keeps_first_decision() {
        let mut gate = PageGate::new("exso-1", None);
        gate.plan();
        assert_eq!(gate.settle_payment(false), AccessDecision::RedirectToPaywall);
        assert_eq!(gate.settle_payment(true), AccessDecision::RedirectToPaywall);
    }
}
