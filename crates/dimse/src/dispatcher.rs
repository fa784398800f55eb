//! DIMSE command dispatcher
//!
//! Runs the receive loop of one association: one command at a time,
//! routed by command type. C-ECHO is answered here, the normalized
//! services go to the association's [`ServiceProvider`], C-CANCEL is
//! accepted and ignored, anything else aborts the association.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::association::Association;
use crate::channel::{DimseChannel, Received};
use crate::log::{AcseKind, Direction, DimseLog, MessageKind};
use crate::message::{DimseRequest, DimseResponse};
use crate::service::ServiceProvider;
use crate::types::{BlockingMode, DimseCommand, DimseStatus, VERIFICATION_SOP_CLASS};
use crate::{DimseError, Result};

/// How the receive loop ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Peer requested release
    Released,
    /// Peer aborted or dropped the connection
    Aborted,
    /// Protocol violation or receive error, the association must be aborted
    Failed(DimseError),
}

/// Command loop of one association
#[derive(Debug, Clone)]
pub struct Dispatcher {
    blocking_mode: BlockingMode,
    dimse_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(blocking_mode: BlockingMode, dimse_timeout: Option<Duration>) -> Self {
        Self {
            blocking_mode,
            dimse_timeout,
        }
    }

    pub fn for_association(association: &Association) -> Self {
        Self::new(association.blocking_mode, association.dimse_timeout)
    }

    /// Wait for the next message, bounded by the DIMSE timeout in
    /// non-blocking mode
    pub async fn receive_next<C>(&self, channel: &mut C) -> Result<Received>
    where
        C: DimseChannel + ?Sized,
    {
        match (self.blocking_mode, self.dimse_timeout) {
            (BlockingMode::NonBlocking, Some(limit)) => {
                tokio::time::timeout(limit, channel.receive())
                    .await
                    .map_err(|_| {
                        DimseError::Timeout(format!("no command within {} ms", limit.as_millis()))
                    })?
            }
            _ => channel.receive().await,
        }
    }

    /// Process commands until release, abort or a fatal error
    pub async fn run<C>(
        &self,
        channel: &mut C,
        provider: &mut dyn ServiceProvider,
        log: &mut DimseLog,
    ) -> SessionEnd
    where
        C: DimseChannel + ?Sized,
    {
        loop {
            let request = match self.receive_next(channel).await {
                Ok(Received::Request(request)) => request,
                Ok(Received::ReleaseRequested) => {
                    log.record_now(
                        Direction::Received,
                        MessageKind::Acse(AcseKind::ReleaseRequest),
                        "A-RELEASE-RQ",
                    );
                    return SessionEnd::Released;
                }
                Ok(Received::Aborted) => {
                    log.record_now(Direction::Received, MessageKind::Acse(AcseKind::Abort), "A-ABORT");
                    return SessionEnd::Aborted;
                }
                Ok(Received::Closed) => {
                    log.record_now(
                        Direction::Received,
                        MessageKind::Acse(AcseKind::Abort),
                        "connection closed by peer",
                    );
                    return SessionEnd::Aborted;
                }
                Err(e) => return SessionEnd::Failed(e),
            };

            log.record_now(
                Direction::Received,
                MessageKind::Request(request.command),
                describe_request(&request),
            );

            let response = match request.command {
                DimseCommand::Echo => {
                    debug!("C-ECHO (message {})", request.message_id);
                    let mut response = DimseResponse::for_request(&request, DimseStatus::Success);
                    response.sop_class_uid = Some(VERIFICATION_SOP_CLASS.to_string());
                    response
                }
                DimseCommand::Cancel => {
                    debug!("C-CANCEL for message {} ignored", request.message_id);
                    continue;
                }
                DimseCommand::NCreate
                | DimseCommand::NSet
                | DimseCommand::NAction
                | DimseCommand::NDelete
                | DimseCommand::NGet => {
                    let outcome = provider.handle(&request).await;
                    if !outcome.status.is_success() {
                        info!(
                            "{} on {} failed: {}{}",
                            request.command,
                            request.sop_class_uid,
                            outcome.status,
                            outcome
                                .error_comment
                                .as_deref()
                                .map(|c| format!(" ({})", c))
                                .unwrap_or_default()
                        );
                    }
                    outcome.into_response(&request)
                }
                other => {
                    warn!("Unsupported command {} received, aborting association", other);
                    return SessionEnd::Failed(DimseError::BadCommandType(other.request_field()));
                }
            };

            log.record_now(
                Direction::Sent,
                MessageKind::Response(response.command),
                format!(
                    "{}-RSP id={} status={}",
                    response.command, response.message_id_being_responded_to, response.status
                ),
            );
            if let Err(e) = channel.send(response).await {
                return SessionEnd::Failed(e);
            }
        }
    }

    /// Acknowledge a release or abort after a failure
    ///
    /// An aborted association needs nothing more. Errors are logged since
    /// the association is gone either way.
    pub async fn teardown<C>(channel: &mut C, end: &SessionEnd, log: &mut DimseLog)
    where
        C: DimseChannel + ?Sized,
    {
        match end {
            SessionEnd::Released => {
                log.record_now(
                    Direction::Sent,
                    MessageKind::Acse(AcseKind::ReleaseResponse),
                    "A-RELEASE-RP",
                );
                if let Err(e) = channel.acknowledge_release().await {
                    warn!("Failed to acknowledge release: {}", e);
                }
            }
            SessionEnd::Aborted => {}
            SessionEnd::Failed(e) => {
                log.record_now(
                    Direction::Sent,
                    MessageKind::Acse(AcseKind::Abort),
                    format!("A-ABORT: {}", e),
                );
                if let Err(e) = channel.abort().await {
                    debug!("Failed to send A-ABORT: {}", e);
                }
            }
        }
    }
}

fn describe_request(request: &DimseRequest) -> String {
    let mut text = format!(
        "{}-RQ id={} class={}",
        request.command, request.message_id, request.sop_class_uid
    );
    if let Some(uid) = &request.sop_instance_uid {
        text.push_str(&format!(" instance={}", uid));
    }
    if let Some(action) = request.action_type_id {
        text.push_str(&format!(" action={}", action));
    }
    if request.dataset.is_some() {
        text.push_str(" +dataset");
    }
    text
}
