//! Association negotiation
//!
//! The [`Negotiator`] decides, from a decoded A-ASSOCIATE-RQ, whether an
//! association is accepted, refused or whether the request asks the SCP to
//! terminate. It performs no I/O: the upper layer binding in [`crate::ul`]
//! reads the request and writes the resulting A-ASSOCIATE-AC/RJ PDU.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

use crate::config::DimseConfig;
use crate::types::{BlockingMode, APPLICATION_CONTEXT_NAME};

/// Private SOP class used to ask a running SCP to shut down
pub const PRIVATE_SHUTDOWN_SOP_CLASS: &str = "1.2.276.0.7230010.3.4.1915765545.18030.917282194.0";

/// A presentation context proposed by the requestor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedContext {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

/// Decoded A-ASSOCIATE-RQ
#[derive(Debug, Clone)]
pub struct AssociationRequest {
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<ProposedContext>,
    /// Maximum PDU length the requestor can receive (0 = unlimited)
    pub max_pdu_length: u32,
    pub implementation_class_uid: Option<String>,
    pub implementation_version_name: Option<String>,
    pub peer_addr: Option<SocketAddr>,
}

/// Result of negotiating a single presentation context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOutcome {
    Accepted,
    AbstractSyntaxNotSupported,
    TransferSyntaxesNotSupported,
}

/// A presentation context after negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedContext {
    pub id: u8,
    pub abstract_syntax: String,
    pub outcome: ContextOutcome,
    /// Selected transfer syntax, meaningful only when accepted
    pub transfer_syntax: String,
}

/// Permanent or transient rejection (A-ASSOCIATE-RJ result)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectResult {
    Permanent,
    Transient,
}

/// A-ASSOCIATE-RJ source and diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectSource {
    ServiceUserNoReason,
    ApplicationContextNameNotSupported,
    CallingAeTitleNotRecognized,
    CalledAeTitleNotRecognized,
    ServiceProviderAcseNoReason,
    TemporaryCongestion,
    LocalLimitExceeded,
}

/// Why an association was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefusalReason {
    /// Application context name is not the DICOM one
    BadApplicationContext,
    /// `max_associations` workers are already running
    TooManyAssociations,
    /// Policy requires an Implementation Class UID
    NoImplementationClassUid,
    /// Configuration refuses every association
    Forced,
    /// Called AE title is not serviced here
    BadCalledAeTitle,
    /// No worker could be allocated for the association
    CannotAllocateWorker,
    /// None of the proposed presentation contexts was acceptable
    NoAcceptableContexts,
    /// The request asked the SCP to shut down
    Shutdown,
}

impl RefusalReason {
    pub fn result(&self) -> RejectResult {
        match self {
            RefusalReason::TooManyAssociations | RefusalReason::CannotAllocateWorker => {
                RejectResult::Transient
            }
            _ => RejectResult::Permanent,
        }
    }

    pub fn source(&self) -> RejectSource {
        match self {
            RefusalReason::BadApplicationContext => RejectSource::ApplicationContextNameNotSupported,
            RefusalReason::TooManyAssociations => RejectSource::LocalLimitExceeded,
            RefusalReason::BadCalledAeTitle => RejectSource::CalledAeTitleNotRecognized,
            RefusalReason::CannotAllocateWorker => RejectSource::TemporaryCongestion,
            RefusalReason::NoImplementationClassUid
            | RefusalReason::Forced
            | RefusalReason::NoAcceptableContexts
            | RefusalReason::Shutdown => RejectSource::ServiceUserNoReason,
        }
    }
}

impl std::fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RefusalReason::BadApplicationContext => "application context name not supported",
            RefusalReason::TooManyAssociations => "too many concurrent associations",
            RefusalReason::NoImplementationClassUid => "no implementation class UID provided",
            RefusalReason::Forced => "association refused by configuration",
            RefusalReason::BadCalledAeTitle => "called AE title not recognized",
            RefusalReason::CannotAllocateWorker => "cannot allocate a worker",
            RefusalReason::NoAcceptableContexts => "no acceptable presentation context",
            RefusalReason::Shutdown => "shutdown requested",
        };
        f.write_str(text)
    }
}

/// A refused association request
#[derive(Debug, Clone)]
pub struct Refusal {
    pub reason: RefusalReason,
    pub calling_ae_title: String,
    pub called_ae_title: String,
}

impl Refusal {
    fn new(request: &AssociationRequest, reason: RefusalReason) -> Self {
        Self {
            reason,
            calling_ae_title: request.calling_ae_title.clone(),
            called_ae_title: request.called_ae_title.clone(),
        }
    }
}

/// Slot in the global association counter, released on drop
#[derive(Debug)]
pub struct AssociationSlot {
    _permit: OwnedSemaphorePermit,
}

/// Bounds the number of live associations
#[derive(Debug, Clone)]
pub struct AssociationLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl AssociationLimiter {
    pub fn new(max_associations: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_associations)),
            max: max_associations,
        }
    }

    /// Take a slot without waiting
    pub fn try_acquire(&self) -> std::result::Result<AssociationSlot, RefusalReason> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(AssociationSlot { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(RefusalReason::TooManyAssociations),
            Err(TryAcquireError::Closed) => Err(RefusalReason::CannotAllocateWorker),
        }
    }

    /// Number of associations currently holding a slot
    pub fn active(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }

    /// Stop handing out slots
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// An established association
#[derive(Debug)]
pub struct Association {
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub peer_addr: Option<SocketAddr>,
    pub presentation_contexts: Vec<NegotiatedContext>,
    /// Largest PDU the peer accepts (0 = unlimited)
    pub peer_max_pdu: u32,
    /// Largest PDU we accept
    pub local_max_pdu: u32,
    pub implementation_class_uid: Option<String>,
    pub blocking_mode: BlockingMode,
    pub dimse_timeout: Option<Duration>,
    _slot: Option<AssociationSlot>,
}

impl Association {
    /// Accepted contexts only
    pub fn accepted_contexts(&self) -> impl Iterator<Item = &NegotiatedContext> {
        self.presentation_contexts
            .iter()
            .filter(|pc| pc.outcome == ContextOutcome::Accepted)
    }

    /// Whether some accepted context carries this abstract syntax
    pub fn accepts(&self, abstract_syntax: &str) -> bool {
        self.accepted_contexts()
            .any(|pc| pc.abstract_syntax == abstract_syntax)
    }

    /// Look up an accepted context by ID
    pub fn context(&self, id: u8) -> Option<&NegotiatedContext> {
        self.accepted_contexts().find(|pc| pc.id == id)
    }

    /// Create an association without negotiation, for in-process use
    pub fn local(
        calling_ae_title: impl Into<String>,
        called_ae_title: impl Into<String>,
        presentation_contexts: Vec<NegotiatedContext>,
    ) -> Self {
        Self {
            calling_ae_title: calling_ae_title.into(),
            called_ae_title: called_ae_title.into(),
            peer_addr: None,
            presentation_contexts,
            peer_max_pdu: 0,
            local_max_pdu: 0,
            implementation_class_uid: None,
            blocking_mode: BlockingMode::Blocking,
            dimse_timeout: None,
            _slot: None,
        }
    }
}

/// Outcome of [`Negotiator::negotiate`]
#[derive(Debug)]
pub enum Negotiation {
    Accepted(Association),
    Refused(Refusal),
    /// Refuse and stop the listener
    Terminate(Refusal),
}

/// Static negotiation policy
#[derive(Debug, Clone)]
pub struct NegotiationPolicy {
    pub abstract_syntaxes: Vec<String>,
    pub transfer_syntaxes: Vec<String>,
    pub called_ae_titles: Vec<String>,
    pub refuse_all: bool,
    pub require_implementation_class_uid: bool,
    pub allow_shutdown: bool,
    pub max_pdu: u32,
    pub blocking_mode: BlockingMode,
    pub dimse_timeout: Option<Duration>,
}

impl NegotiationPolicy {
    /// Build a policy from the service configuration and the abstract
    /// syntaxes the service provider supports
    pub fn from_config(config: &DimseConfig, abstract_syntaxes: Vec<String>) -> Self {
        Self {
            abstract_syntaxes,
            transfer_syntaxes: config.transfer_syntaxes(),
            called_ae_titles: config.called_ae_titles.clone(),
            refuse_all: config.refuse_associations,
            require_implementation_class_uid: config.require_implementation_class_uid,
            allow_shutdown: config.allow_shutdown,
            max_pdu: config.max_pdu,
            blocking_mode: config.blocking_mode,
            dimse_timeout: config.dimse_timeout(),
        }
    }
}

/// Decides the fate of incoming association requests
#[derive(Debug, Clone)]
pub struct Negotiator {
    policy: NegotiationPolicy,
    limiter: AssociationLimiter,
}

impl Negotiator {
    pub fn new(policy: NegotiationPolicy, limiter: AssociationLimiter) -> Self {
        Self { policy, limiter }
    }

    pub fn limiter(&self) -> &AssociationLimiter {
        &self.limiter
    }

    pub fn policy(&self) -> &NegotiationPolicy {
        &self.policy
    }

    /// Negotiate an association request
    pub fn negotiate(&self, request: &AssociationRequest) -> Negotiation {
        debug!(
            "Association request from {} to {} ({} presentation contexts)",
            request.calling_ae_title,
            request.called_ae_title,
            request.presentation_contexts.len()
        );

        if self.policy.allow_shutdown
            && request
                .presentation_contexts
                .iter()
                .any(|pc| pc.abstract_syntax == PRIVATE_SHUTDOWN_SOP_CLASS)
        {
            info!("Shutdown request from {}", request.calling_ae_title);
            return Negotiation::Terminate(Refusal::new(request, RefusalReason::Shutdown));
        }

        if let Err(reason) = self.check_request(request) {
            warn!(
                "Refusing association from {}: {}",
                request.calling_ae_title, reason
            );
            return Negotiation::Refused(Refusal::new(request, reason));
        }

        let slot = match self.limiter.try_acquire() {
            Ok(slot) => slot,
            Err(reason) => {
                warn!(
                    "Refusing association from {}: {}",
                    request.calling_ae_title, reason
                );
                return Negotiation::Refused(Refusal::new(request, reason));
            }
        };

        let contexts = self.negotiate_contexts(&request.presentation_contexts);
        if !contexts.iter().any(|pc| pc.outcome == ContextOutcome::Accepted) {
            warn!(
                "Refusing association from {}: {}",
                request.calling_ae_title,
                RefusalReason::NoAcceptableContexts
            );
            // the slot is released here, nothing else was set up
            return Negotiation::Refused(Refusal::new(request, RefusalReason::NoAcceptableContexts));
        }

        info!(
            "Association accepted: {} -> {} ({} of {} contexts)",
            request.calling_ae_title,
            request.called_ae_title,
            contexts.iter().filter(|pc| pc.outcome == ContextOutcome::Accepted).count(),
            contexts.len()
        );

        Negotiation::Accepted(Association {
            calling_ae_title: request.calling_ae_title.clone(),
            called_ae_title: request.called_ae_title.clone(),
            peer_addr: request.peer_addr,
            presentation_contexts: contexts,
            peer_max_pdu: request.max_pdu_length,
            local_max_pdu: self.policy.max_pdu,
            implementation_class_uid: request.implementation_class_uid.clone(),
            blocking_mode: self.policy.blocking_mode,
            dimse_timeout: self.policy.dimse_timeout,
            _slot: Some(slot),
        })
    }

    fn check_request(&self, request: &AssociationRequest) -> std::result::Result<(), RefusalReason> {
        if request.application_context_name.trim_end_matches('\0') != APPLICATION_CONTEXT_NAME {
            return Err(RefusalReason::BadApplicationContext);
        }
        if self.policy.refuse_all {
            return Err(RefusalReason::Forced);
        }
        if self.policy.require_implementation_class_uid
            && request
                .implementation_class_uid
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(RefusalReason::NoImplementationClassUid);
        }
        if !self.policy.called_ae_titles.is_empty()
            && !self
                .policy
                .called_ae_titles
                .iter()
                .any(|aet| aet.trim() == request.called_ae_title.trim())
        {
            return Err(RefusalReason::BadCalledAeTitle);
        }
        Ok(())
    }

    fn negotiate_contexts(&self, proposed: &[ProposedContext]) -> Vec<NegotiatedContext> {
        proposed
            .iter()
            .map(|pc| {
                let abstract_syntax = pc.abstract_syntax.trim_end_matches('\0').to_string();
                if !self.policy.abstract_syntaxes.contains(&abstract_syntax) {
                    return NegotiatedContext {
                        id: pc.id,
                        abstract_syntax,
                        outcome: ContextOutcome::AbstractSyntaxNotSupported,
                        transfer_syntax: String::new(),
                    };
                }
                // our preference order wins over the requestor's
                let selected = self.policy.transfer_syntaxes.iter().find(|ts| {
                    pc.transfer_syntaxes
                        .iter()
                        .any(|proposed| proposed.trim_end_matches('\0') == ts.as_str())
                });
                match selected {
                    Some(ts) => NegotiatedContext {
                        id: pc.id,
                        abstract_syntax,
                        outcome: ContextOutcome::Accepted,
                        transfer_syntax: ts.clone(),
                    },
                    None => NegotiatedContext {
                        id: pc.id,
                        abstract_syntax,
                        outcome: ContextOutcome::TransferSyntaxesNotSupported,
                        transfer_syntax: String::new(),
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{transfer_syntax, VERIFICATION_SOP_CLASS};

    const FILM_SESSION: &str = "1.2.840.10008.5.1.1.1";

    fn policy() -> NegotiationPolicy {
        NegotiationPolicy::from_config(
            &DimseConfig::default(),
            vec![VERIFICATION_SOP_CLASS.to_string(), FILM_SESSION.to_string()],
        )
    }

    fn request(contexts: Vec<ProposedContext>) -> AssociationRequest {
        AssociationRequest {
            calling_ae_title: "MODALITY".to_string(),
            called_ae_title: "PRINT_SCP".to_string(),
            application_context_name: APPLICATION_CONTEXT_NAME.to_string(),
            presentation_contexts: contexts,
            max_pdu_length: 16384,
            implementation_class_uid: Some("1.2.3.4".to_string()),
            implementation_version_name: None,
            peer_addr: None,
        }
    }

    fn context(id: u8, abstract_syntax: &str, ts: &[&str]) -> ProposedContext {
        ProposedContext {
            id,
            abstract_syntax: abstract_syntax.to_string(),
            transfer_syntaxes: ts.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn refusal_reason(negotiation: Negotiation) -> RefusalReason {
        match negotiation {
            Negotiation::Refused(refusal) => refusal.reason,
            other => panic!("Expected refusal, got {:?}", other),
        }
    }

    #[test]
    fn test_accepts_with_local_preference() {
        let negotiator = Negotiator::new(policy(), AssociationLimiter::new(4));
        let req = request(vec![
            context(
                1,
                FILM_SESSION,
                &[transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN, transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN],
            ),
            context(3, "1.2.840.10008.5.1.4.1.1.2", &[transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN]),
        ]);

        match negotiator.negotiate(&req) {
            Negotiation::Accepted(assoc) => {
                assert_eq!(assoc.presentation_contexts.len(), 2);
                let pc = assoc.context(1).expect("context 1 accepted");
                assert_eq!(pc.transfer_syntax, transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN);
                assert!(assoc.context(3).is_none());
                assert_eq!(
                    assoc.presentation_contexts[1].outcome,
                    ContextOutcome::AbstractSyntaxNotSupported
                );
                assert!(assoc.accepts(FILM_SESSION));
                assert_eq!(negotiator.limiter().active(), 1);
            }
            other => panic!("Expected acceptance, got {:?}", other),
        }
        assert_eq!(negotiator.limiter().active(), 0);
    }

    #[test]
    fn test_forced_transfer_syntax() {
        let config = DimseConfig {
            forced_transfer_syntax: Some(transfer_syntax::EXPLICIT_VR_BIG_ENDIAN.to_string()),
            ..Default::default()
        };
        let negotiator = Negotiator::new(
            NegotiationPolicy::from_config(&config, vec![FILM_SESSION.to_string()]),
            AssociationLimiter::new(1),
        );
        let req = request(vec![context(1, FILM_SESSION, &[transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN])]);
        assert_eq!(
            refusal_reason(negotiator.negotiate(&req)),
            RefusalReason::NoAcceptableContexts
        );
        // the refused association does not keep its slot
        assert_eq!(negotiator.limiter().active(), 0);
    }

    #[test]
    fn test_bad_application_context() {
        let negotiator = Negotiator::new(policy(), AssociationLimiter::new(1));
        let mut req = request(vec![context(1, FILM_SESSION, &[transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN])]);
        req.application_context_name = "1.2.3".to_string();
        let reason = refusal_reason(negotiator.negotiate(&req));
        assert_eq!(reason, RefusalReason::BadApplicationContext);
        assert_eq!(reason.result(), RejectResult::Permanent);
        assert_eq!(reason.source(), RejectSource::ApplicationContextNameNotSupported);
    }

    #[test]
    fn test_policy_refusals() {
        let ctx = vec![context(1, FILM_SESSION, &[transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN])];

        let mut forced = policy();
        forced.refuse_all = true;
        let negotiator = Negotiator::new(forced, AssociationLimiter::new(1));
        assert_eq!(refusal_reason(negotiator.negotiate(&request(ctx.clone()))), RefusalReason::Forced);

        let mut strict = policy();
        strict.require_implementation_class_uid = true;
        let negotiator = Negotiator::new(strict, AssociationLimiter::new(1));
        let mut req = request(ctx.clone());
        req.implementation_class_uid = None;
        assert_eq!(
            refusal_reason(negotiator.negotiate(&req)),
            RefusalReason::NoImplementationClassUid
        );

        let mut named = policy();
        named.called_ae_titles = vec!["OTHER_SCP".to_string()];
        let negotiator = Negotiator::new(named, AssociationLimiter::new(1));
        let reason = refusal_reason(negotiator.negotiate(&request(ctx)));
        assert_eq!(reason, RefusalReason::BadCalledAeTitle);
        assert_eq!(reason.source(), RejectSource::CalledAeTitleNotRecognized);
    }

    #[test]
    fn test_concurrency_bound() {
        let negotiator = Negotiator::new(policy(), AssociationLimiter::new(2));
        let req = request(vec![context(1, FILM_SESSION, &[transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN])]);

        let first = negotiator.negotiate(&req);
        let second = negotiator.negotiate(&req);
        assert!(matches!(first, Negotiation::Accepted(_)));
        assert!(matches!(second, Negotiation::Accepted(_)));

        let reason = refusal_reason(negotiator.negotiate(&req));
        assert_eq!(reason, RefusalReason::TooManyAssociations);
        assert_eq!(reason.result(), RejectResult::Transient);
        assert_eq!(reason.source(), RejectSource::LocalLimitExceeded);

        drop(first);
        assert!(matches!(negotiator.negotiate(&req), Negotiation::Accepted(_)));
        drop(second);
    }

    #[test]
    fn test_closed_limiter_means_congestion() {
        let limiter = AssociationLimiter::new(2);
        limiter.close();
        let negotiator = Negotiator::new(policy(), limiter);
        let req = request(vec![context(1, FILM_SESSION, &[transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN])]);
        let reason = refusal_reason(negotiator.negotiate(&req));
        assert_eq!(reason, RefusalReason::CannotAllocateWorker);
        assert_eq!(reason.source(), RejectSource::TemporaryCongestion);
    }

    #[test]
    fn test_shutdown_request() {
        let mut allow = policy();
        allow.allow_shutdown = true;
        let negotiator = Negotiator::new(allow, AssociationLimiter::new(1));
        let req = request(vec![context(
            1,
            PRIVATE_SHUTDOWN_SOP_CLASS,
            &[transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN],
        )]);
        assert!(matches!(negotiator.negotiate(&req), Negotiation::Terminate(_)));

        // without the policy flag the private class is simply not supported
        let negotiator = Negotiator::new(policy(), AssociationLimiter::new(1));
        assert_eq!(
            refusal_reason(negotiator.negotiate(&req)),
            RefusalReason::NoAcceptableContexts
        );
    }
}
