//! Service Class Provider (SCP) listener
//!
//! Accepts TCP connections and runs one task per association: read the
//! association request within the ACSE timeout, negotiate, build a service
//! provider, run the dispatcher, tear down and flush the DIMSE log.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::association::{
    AssociationLimiter, Negotiation, NegotiationPolicy, Negotiator, Refusal, RefusalReason,
};
use crate::config::DimseConfig;
use crate::dispatcher::{Dispatcher, SessionEnd};
use crate::log::{AcseKind, Direction, DimseLog, LogSink, MessageKind, NullLogSink};
use crate::service::ProviderFactory;
use crate::types::VERIFICATION_SOP_CLASS;
use crate::ul::{PduStream, UlChannel};
use crate::{DimseError, Result};

/// How long shutdown waits for running associations
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// DIMSE Service Class Provider
pub struct DimseScp {
    config: DimseConfig,
    factory: Arc<dyn ProviderFactory>,
    log_sink: Arc<dyn LogSink>,
    negotiator: Negotiator,
    shutdown: CancellationToken,
}

impl DimseScp {
    /// Create a new SCP serving the providers built by `factory`
    pub fn new(config: DimseConfig, factory: Arc<dyn ProviderFactory>) -> Self {
        let mut abstract_syntaxes = vec![VERIFICATION_SOP_CLASS.to_string()];
        abstract_syntaxes.extend(factory.abstract_syntaxes());
        let negotiator = Negotiator::new(
            NegotiationPolicy::from_config(&config, abstract_syntaxes),
            AssociationLimiter::new(config.max_associations as usize),
        );
        Self {
            config,
            factory,
            log_sink: Arc::new(NullLogSink),
            negotiator,
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the sink receiving DIMSE logs at association teardown
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Stop accepting when `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn limiter(&self) -> &AssociationLimiter {
        self.negotiator.limiter()
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        self.config.validate()?;
        let addr = SocketAddr::new(self.config.bind_addr, self.config.port);
        Ok(TcpListener::bind(addr).await?)
    }

    /// Bind and serve until shutdown
    pub async fn run(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve associations on an already bound listener until shutdown
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(
            "Starting DIMSE SCP on {} (AET: {})",
            addr, self.config.local_aet
        );

        let scp = Arc::new(self);
        let mut associations = JoinSet::new();

        loop {
            tokio::select! {
                _ = scp.shutdown.cancelled() => {
                    info!("DIMSE SCP on {} shutting down", addr);
                    scp.negotiator.limiter().close();
                    break;
                }
                Some(_) = associations.join_next(), if !associations.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted connection from {}", peer_addr);
                        let scp_clone = Arc::clone(&scp);
                        associations.spawn(async move {
                            if let Err(e) = scp_clone.handle_association(stream, peer_addr).await {
                                if e.is_recoverable() {
                                    warn!("Association with {} ended: {}", peer_addr, e);
                                } else {
                                    error!("Error handling association from {}: {}", peer_addr, e);
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }
        }
        drop(listener);

        Self::drain(&mut associations).await;
        Ok(())
    }

    /// Wait for running associations, aborting those still busy after
    /// [`SHUTDOWN_GRACE`]
    async fn drain(associations: &mut JoinSet<()>) {
        if associations.is_empty() {
            return;
        }
        info!("Waiting for {} running associations", associations.len());
        let finished = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while associations.join_next().await.is_some() {}
        })
        .await;
        if finished.is_err() {
            warn!(
                "Aborting {} associations still running after {} s",
                associations.len(),
                SHUTDOWN_GRACE.as_secs()
            );
            associations.shutdown().await;
        }
    }

    /// Handle a single association
    #[instrument(skip(self, stream))]
    async fn handle_association(&self, stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        stream.set_nodelay(true)?;
        let mut pdus = PduStream::new(stream, self.config.max_pdu, self.config.strict);

        let request = tokio::time::timeout(
            self.config.acse_timeout(),
            pdus.read_association_request(),
        )
        .await
        .map_err(|_| DimseError::Timeout("no association request within ACSE timeout".into()))??;

        let mut log = DimseLog::new(&request.calling_ae_title, &request.called_ae_title);
        log.record_now(
            Direction::Received,
            MessageKind::Acse(AcseKind::AssociateRequest),
            format!(
                "A-ASSOCIATE-RQ {} -> {} ({} contexts)",
                request.calling_ae_title,
                request.called_ae_title,
                request.presentation_contexts.len()
            ),
        );

        let association = match self.negotiator.negotiate(&request) {
            Negotiation::Accepted(association) => association,
            Negotiation::Refused(refusal) => {
                self.reject(&mut pdus, &refusal, &mut log).await;
                log.flush(self.log_sink.as_ref()).await;
                return Ok(());
            }
            Negotiation::Terminate(refusal) => {
                self.reject(&mut pdus, &refusal, &mut log).await;
                log.flush(self.log_sink.as_ref()).await;
                self.shutdown.cancel();
                return Ok(());
            }
        };

        let mut provider = match self.factory.create(&association) {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Cannot set up session for {}: {}", association.calling_ae_title, e);
                let refusal = Refusal {
                    reason: RefusalReason::CannotAllocateWorker,
                    calling_ae_title: association.calling_ae_title.clone(),
                    called_ae_title: association.called_ae_title.clone(),
                };
                self.reject(&mut pdus, &refusal, &mut log).await;
                log.flush(self.log_sink.as_ref()).await;
                return Ok(());
            }
        };

        pdus.send_accept(&association).await?;
        log.record_now(
            Direction::Sent,
            MessageKind::Acse(AcseKind::AssociateAccept),
            format!(
                "A-ASSOCIATE-AC ({} contexts accepted)",
                association.accepted_contexts().count()
            ),
        );

        let mut channel = UlChannel::new(pdus, &association);
        let dispatcher = Dispatcher::for_association(&association);
        let end = dispatcher
            .run(&mut channel, provider.as_mut(), &mut log)
            .await;

        match &end {
            SessionEnd::Released => info!("Association released by {}", association.calling_ae_title),
            SessionEnd::Aborted => info!("Association aborted by {}", association.calling_ae_title),
            SessionEnd::Failed(e) => warn!(
                "Aborting association with {}: {}",
                association.calling_ae_title, e
            ),
        }

        Dispatcher::teardown(&mut channel, &end, &mut log).await;
        provider.close().await;
        log.flush(self.log_sink.as_ref()).await;

        // the association slot is released when `association` drops here
        Ok(())
    }

    async fn reject(&self, pdus: &mut PduStream, refusal: &Refusal, log: &mut DimseLog) {
        log.record_now(
            Direction::Sent,
            MessageKind::Acse(AcseKind::AssociateReject),
            format!("A-ASSOCIATE-RJ: {}", refusal.reason),
        );
        if let Err(e) = pdus.send_reject(refusal).await {
            debug!("Failed to send A-ASSOCIATE-RJ: {}", e);
        }
        pdus.shutdown().await;
    }
}
