//! DICOM upper layer binding over TCP
//!
//! PDU encoding and decoding is delegated to `dicom-ul`, data set encoding
//! to `dicom-object`. This module translates between those and the
//! domain types of [`crate::association`] and [`crate::message`].

use std::io::Cursor;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use dicom_encoding::transfer_syntax::TransferSyntaxIndex;
use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;
use dicom_ul::pdu::{
    read_pdu, write_pdu, AbortRQSource, AssociationAC, AssociationRJ, AssociationRJResult,
    AssociationRJServiceProviderPresentationReason, AssociationRJServiceUserReason,
    AssociationRJSource, PDataValue, PDataValueType, Pdu, PresentationContextResult,
    PresentationContextResultReason, UserVariableItem,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::association::{
    Association, AssociationRequest, ContextOutcome, ProposedContext, RejectResult,
    RejectSource, Refusal,
};
use crate::channel::{DimseChannel, Received};
use crate::message::{self, DimseRequest, DimseResponse};
use crate::types::transfer_syntax;
use crate::{DimseError, Result};

/// Implementation Class UID sent in A-ASSOCIATE-AC
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.137038125948464847900039011591283709926";

/// Implementation Version Name sent in A-ASSOCIATE-AC
pub const IMPLEMENTATION_VERSION_NAME: &str = "PRINTSCP_020";

/// PDU header plus PDV item header
const PDV_OVERHEAD: usize = 12;

/// Fallback fragment size when the peer announces no limit
const UNLIMITED_FRAGMENT: usize = 65_536;

/// Raw PDU stream over a TCP connection
pub struct PduStream {
    stream: TcpStream,
    buffer: BytesMut,
    max_pdu: u32,
    strict: bool,
}

impl PduStream {
    pub fn new(stream: TcpStream, max_pdu: u32, strict: bool) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(max_pdu as usize),
            max_pdu,
            strict,
        }
    }

    /// Read the next PDU, `None` on a clean end of stream
    pub async fn read(&mut self) -> Result<Option<Pdu>> {
        loop {
            let mut cursor = Cursor::new(&self.buffer[..]);
            match read_pdu(&mut cursor, self.max_pdu, self.strict)
                .map_err(|e| DimseError::ul(e.to_string()))?
            {
                Some(pdu) => {
                    let consumed = cursor.position() as usize;
                    self.buffer.advance(consumed);
                    return Ok(Some(pdu));
                }
                None => {
                    let read = self.stream.read_buf(&mut self.buffer).await?;
                    if read == 0 {
                        if self.buffer.is_empty() {
                            return Ok(None);
                        }
                        return Err(DimseError::ChannelClosed(
                            "connection closed inside a PDU".into(),
                        ));
                    }
                }
            }
        }
    }

    pub async fn write(&mut self, pdu: &Pdu) -> Result<()> {
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, pdu).map_err(|e| DimseError::ul(e.to_string()))?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read and decode an A-ASSOCIATE-RQ
    pub async fn read_association_request(&mut self) -> Result<AssociationRequest> {
        let peer_addr = self.stream.peer_addr().ok();
        match self.read().await? {
            Some(Pdu::AssociationRQ(rq)) => {
                let mut request = AssociationRequest {
                    calling_ae_title: rq.calling_ae_title.trim().to_string(),
                    called_ae_title: rq.called_ae_title.trim().to_string(),
                    application_context_name: rq.application_context_name,
                    presentation_contexts: rq
                        .presentation_contexts
                        .into_iter()
                        .map(|pc| ProposedContext {
                            id: pc.id,
                            abstract_syntax: pc.abstract_syntax,
                            transfer_syntaxes: pc.transfer_syntaxes,
                        })
                        .collect(),
                    max_pdu_length: 0,
                    implementation_class_uid: None,
                    implementation_version_name: None,
                    peer_addr,
                };
                for item in rq.user_variables {
                    match item {
                        UserVariableItem::MaxLength(len) => request.max_pdu_length = len,
                        UserVariableItem::ImplementationClassUID(uid) => {
                            request.implementation_class_uid = Some(uid)
                        }
                        UserVariableItem::ImplementationVersionName(name) => {
                            request.implementation_version_name = Some(name)
                        }
                        _ => {}
                    }
                }
                Ok(request)
            }
            Some(other) => Err(DimseError::UnexpectedPdu(format!(
                "expected A-ASSOCIATE-RQ, got {}",
                pdu_name(&other)
            ))),
            None => Err(DimseError::ChannelClosed(
                "connection closed before association request".into(),
            )),
        }
    }

    /// Send A-ASSOCIATE-AC for an accepted association
    pub async fn send_accept(&mut self, association: &Association) -> Result<()> {
        let pdu = Pdu::AssociationAC(AssociationAC {
            protocol_version: 1,
            calling_ae_title: association.calling_ae_title.clone(),
            called_ae_title: association.called_ae_title.clone(),
            application_context_name: crate::types::APPLICATION_CONTEXT_NAME.to_string(),
            presentation_contexts: association
                .presentation_contexts
                .iter()
                .map(|pc| PresentationContextResult {
                    id: pc.id,
                    reason: match pc.outcome {
                        ContextOutcome::Accepted => PresentationContextResultReason::Acceptance,
                        ContextOutcome::AbstractSyntaxNotSupported => {
                            PresentationContextResultReason::AbstractSyntaxNotSupported
                        }
                        ContextOutcome::TransferSyntaxesNotSupported => {
                            PresentationContextResultReason::TransferSyntaxesNotSupported
                        }
                    },
                    transfer_syntax: if pc.outcome == ContextOutcome::Accepted {
                        pc.transfer_syntax.clone()
                    } else {
                        transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN.to_string()
                    },
                })
                .collect(),
            user_variables: vec![
                UserVariableItem::MaxLength(association.local_max_pdu),
                UserVariableItem::ImplementationClassUID(IMPLEMENTATION_CLASS_UID.to_string()),
                UserVariableItem::ImplementationVersionName(
                    IMPLEMENTATION_VERSION_NAME.to_string(),
                ),
            ],
        });
        self.write(&pdu).await
    }

    /// Send A-ASSOCIATE-RJ for a refused association
    pub async fn send_reject(&mut self, refusal: &Refusal) -> Result<()> {
        let result = match refusal.reason.result() {
            RejectResult::Permanent => AssociationRJResult::Permanent,
            RejectResult::Transient => AssociationRJResult::Transient,
        };
        let source = match refusal.reason.source() {
            RejectSource::ServiceUserNoReason => {
                AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::NoReasonGiven)
            }
            RejectSource::ApplicationContextNameNotSupported => AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
            ),
            RejectSource::CallingAeTitleNotRecognized => AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CallingAETitleNotRecognized,
            ),
            RejectSource::CalledAeTitleNotRecognized => AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized,
            ),
            RejectSource::ServiceProviderAcseNoReason => AssociationRJSource::ServiceProviderASCE(
                dicom_ul::pdu::AssociationRJServiceProviderASCEReason::NoReasonGiven,
            ),
            RejectSource::TemporaryCongestion => AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
            ),
            RejectSource::LocalLimitExceeded => AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
            ),
        };
        self.write(&Pdu::AssociationRJ(AssociationRJ { result, source }))
            .await
    }

    /// Send A-ABORT as service user
    pub async fn send_abort(&mut self) -> Result<()> {
        self.write(&Pdu::AbortRQ {
            source: AbortRQSource::ServiceUser,
        })
        .await
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// [`DimseChannel`] over an established TCP association
pub struct UlChannel {
    pdus: PduStream,
    /// (context ID, transfer syntax UID) of the accepted contexts
    contexts: Vec<(u8, String)>,
    fragment_size: usize,
}

impl UlChannel {
    pub fn new(pdus: PduStream, association: &Association) -> Self {
        let fragment_size = match association.peer_max_pdu as usize {
            0 => UNLIMITED_FRAGMENT,
            max => max.saturating_sub(PDV_OVERHEAD).max(1),
        };
        Self {
            pdus,
            contexts: association
                .accepted_contexts()
                .map(|pc| (pc.id, pc.transfer_syntax.clone()))
                .collect(),
            fragment_size,
        }
    }

    pub fn into_inner(self) -> PduStream {
        self.pdus
    }

    fn transfer_syntax_of(&self, context_id: u8) -> Result<&str> {
        self.contexts
            .iter()
            .find(|(id, _)| *id == context_id)
            .map(|(_, ts)| ts.as_str())
            .ok_or_else(|| {
                DimseError::parsing(format!("presentation context {} not accepted", context_id))
            })
    }

    /// Accumulate PDV fragments of one kind until the last one
    async fn read_fragments(
        &mut self,
        kind: PDataValueType,
        context: Option<u8>,
    ) -> Result<std::result::Result<(u8, Vec<u8>), Received>> {
        let mut data = Vec::new();
        let mut context_id = context;
        loop {
            let values = match self.pdus.read().await? {
                Some(Pdu::PData { data }) => data,
                Some(Pdu::ReleaseRQ) => return Ok(Err(Received::ReleaseRequested)),
                Some(Pdu::AbortRQ { .. }) => return Ok(Err(Received::Aborted)),
                Some(other) => {
                    return Err(DimseError::UnexpectedPdu(pdu_name(&other).to_string()))
                }
                None => return Ok(Err(Received::Closed)),
            };
            for value in values {
                if value.value_type != kind {
                    return Err(DimseError::UnexpectedPdu(format!(
                        "{:?} fragment while reading {:?}",
                        value.value_type, kind
                    )));
                }
                match context_id {
                    Some(id) if id != value.presentation_context_id => {
                        return Err(DimseError::parsing(
                            "message fragments on different presentation contexts",
                        ))
                    }
                    _ => context_id = Some(value.presentation_context_id),
                }
                data.extend_from_slice(&value.data);
                if value.is_last {
                    // context_id was set by this very value
                    return Ok(Ok((value.presentation_context_id, data)));
                }
            }
        }
    }

    async fn send_fragments(&mut self, context_id: u8, kind: PDataValueType, bytes: &[u8]) -> Result<()> {
        let chunks: Vec<&[u8]> = if bytes.is_empty() {
            vec![bytes]
        } else {
            bytes.chunks(self.fragment_size).collect()
        };
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let pdu = Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: context_id,
                    value_type: kind.clone(),
                    is_last: i == last,
                    data: chunk.to_vec(),
                }],
            };
            self.pdus.write(&pdu).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DimseChannel for UlChannel {
    async fn receive(&mut self) -> Result<Received> {
        let (context_id, command_bytes) =
            match self.read_fragments(PDataValueType::Command, None).await? {
                Ok(fragments) => fragments,
                Err(event) => return Ok(event),
            };
        let command_set = decode_dataset(&command_bytes, transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN)?;
        trace!("Command set received on context {}", context_id);

        let dataset = if message::expects_dataset(&command_set)? {
            let (_, data_bytes) =
                match self.read_fragments(PDataValueType::Data, Some(context_id)).await? {
                    Ok(fragments) => fragments,
                    Err(event) => return Ok(event),
                };
            let ts = self.transfer_syntax_of(context_id)?.to_string();
            Some(decode_dataset(&data_bytes, &ts)?)
        } else {
            None
        };

        DimseRequest::from_command(context_id, &command_set, dataset).map(Received::Request)
    }

    async fn send(&mut self, response: DimseResponse) -> Result<()> {
        let context_id = response.presentation_context_id;
        let command_bytes = encode_dataset(
            &response.to_command(),
            transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN,
        )?;
        self.send_fragments(context_id, PDataValueType::Command, &command_bytes)
            .await?;
        if let Some(dataset) = &response.dataset {
            let ts = self.transfer_syntax_of(context_id)?.to_string();
            let data_bytes = encode_dataset(dataset, &ts)?;
            self.send_fragments(context_id, PDataValueType::Data, &data_bytes)
                .await?;
        }
        Ok(())
    }

    async fn acknowledge_release(&mut self) -> Result<()> {
        self.pdus.write(&Pdu::ReleaseRP).await?;
        self.pdus.shutdown().await;
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        let result = self.pdus.send_abort().await;
        self.pdus.shutdown().await;
        result
    }
}

/// Decode a data set in the given transfer syntax
pub fn decode_dataset(bytes: &[u8], ts_uid: &str) -> Result<InMemDicomObject> {
    let ts = TransferSyntaxRegistry
        .get(ts_uid)
        .ok_or_else(|| DimseError::parsing(format!("unknown transfer syntax {}", ts_uid)))?;
    InMemDicomObject::read_dataset_with_ts(bytes, ts)
        .map_err(|e| DimseError::parsing(e.to_string()))
}

/// Encode a data set in the given transfer syntax
pub fn encode_dataset(obj: &InMemDicomObject, ts_uid: &str) -> Result<Vec<u8>> {
    let ts = TransferSyntaxRegistry
        .get(ts_uid)
        .ok_or_else(|| DimseError::parsing(format!("unknown transfer syntax {}", ts_uid)))?;
    let mut bytes = Vec::new();
    obj.write_dataset_with_ts(&mut bytes, ts)
        .map_err(|e| DimseError::DicomObject(e.to_string()))?;
    debug!("Encoded {} bytes in {}", bytes.len(), ts_uid);
    Ok(bytes)
}

fn pdu_name(pdu: &Pdu) -> &'static str {
    match pdu {
        Pdu::AssociationRQ(_) => "A-ASSOCIATE-RQ",
        Pdu::AssociationAC(_) => "A-ASSOCIATE-AC",
        Pdu::AssociationRJ(_) => "A-ASSOCIATE-RJ",
        Pdu::PData { .. } => "P-DATA-TF",
        Pdu::ReleaseRQ => "A-RELEASE-RQ",
        Pdu::ReleaseRP => "A-RELEASE-RP",
        Pdu::AbortRQ { .. } => "A-ABORT",
        _ => "unknown PDU",
    }
}
