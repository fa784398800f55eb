#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use dicom_ul::pdu::{AssociationRQ, Pdu, PresentationContextProposed, UserVariableItem};
use dimse::types::{transfer_syntax, APPLICATION_CONTEXT_NAME, VERIFICATION_SOP_CLASS};
use dimse::ul::PduStream;
use dimse::{AssociationLimiter, DimseConfig, DimseScp};
use printscp::config::PrinterConfig;
use printscp::print::{uids, PrintProviderFactory};
use printscp::storage::MemoryStore;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A print SCP serving on an ephemeral loopback port
pub struct RunningScp {
    pub addr: SocketAddr,
    pub limiter: AssociationLimiter,
    pub shutdown: CancellationToken,
    pub store: Arc<MemoryStore>,
    pub handle: JoinHandle<dimse::Result<()>>,
}

pub fn loopback_config(max_associations: u32) -> DimseConfig {
    DimseConfig {
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        max_associations,
        ..DimseConfig::default()
    }
}

pub async fn start_scp(config: DimseConfig) -> RunningScp {
    let store = Arc::new(MemoryStore::new());
    let factory = Arc::new(PrintProviderFactory::new(
        "FILM",
        PrinterConfig::default(),
        store.clone(),
    ));
    let scp = DimseScp::new(config, factory);
    let listener = scp.bind().await.expect("bind");
    let addr = listener.local_addr().expect("local address");
    let limiter = scp.limiter().clone();
    let shutdown = scp.shutdown_token();
    let handle = tokio::spawn(scp.serve(listener));

    RunningScp {
        addr,
        limiter,
        shutdown,
        store,
        handle,
    }
}

/// Send an A-ASSOCIATE-RQ proposing the print meta class and verification
pub async fn associate(addr: SocketAddr, calling: &str) -> (PduStream, Pdu) {
    associate_with(addr, calling, &[uids::BASIC_GRAYSCALE_PRINT_META, VERIFICATION_SOP_CLASS]).await
}

pub async fn associate_with(addr: SocketAddr, calling: &str, abstract_syntaxes: &[&str]) -> (PduStream, Pdu) {
    let stream = TcpStream::connect(addr).await.expect("connect");
    let mut pdus = PduStream::new(stream, 16384, false);

    let request = Pdu::AssociationRQ(AssociationRQ {
        protocol_version: 1,
        calling_ae_title: calling.to_string(),
        called_ae_title: "PRINT_SCP".to_string(),
        application_context_name: APPLICATION_CONTEXT_NAME.to_string(),
        presentation_contexts: abstract_syntaxes
            .iter()
            .enumerate()
            .map(|(i, uid)| PresentationContextProposed {
                id: (i * 2 + 1) as u8,
                abstract_syntax: uid.to_string(),
                transfer_syntaxes: vec![
                    transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
                    transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
                ],
            })
            .collect(),
        user_variables: vec![
            UserVariableItem::MaxLength(16384),
            UserVariableItem::ImplementationClassUID("1.2.826.0.1.3680043.2.1143.1".to_string()),
        ],
    });
    pdus.write(&request).await.expect("send A-ASSOCIATE-RQ");
    let reply = pdus.read().await.expect("read reply").expect("reply PDU");
    (pdus, reply)
}

/// Release an established association, returning the peer's answer
pub async fn release(mut pdus: PduStream) -> Option<Pdu> {
    pdus.write(&Pdu::ReleaseRQ).await.expect("send A-RELEASE-RQ");
    pdus.read().await.expect("read release reply")
}
