//! DIMSE messages and their command set encoding
//!
//! A DIMSE message is a command set, always encoded in Implicit VR Little
//! Endian, optionally followed by a data set in the transfer syntax of the
//! presentation context it travels on. This module converts between the
//! command set as an [`InMemDicomObject`] and the typed request / response
//! structures used by the dispatcher.

use dicom_core::value::{PrimitiveValue, Value};
use dicom_core::{dicom_value, DataElement, Tag, VR};
use dicom_dictionary_std::{tags, StandardDataDictionary};
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;

use crate::types::{DimseCommand, DimseStatus};
use crate::{DimseError, Result};

/// Command Data Set Type value meaning "no data set follows"
pub const NO_DATASET: u16 = 0x0101;

/// Command Data Set Type value used when a data set follows
pub const DATASET_PRESENT: u16 = 0x0000;

/// Maximum length of an Error Comment (LO)
const ERROR_COMMENT_MAX: usize = 64;

/// A DIMSE request received from the peer
#[derive(Debug, Clone)]
pub struct DimseRequest {
    /// Presentation context the command arrived on
    pub presentation_context_id: u8,
    /// The request primitive
    pub command: DimseCommand,
    /// Message ID, or the Message ID being cancelled for C-CANCEL
    pub message_id: u16,
    /// Affected or Requested SOP Class UID
    pub sop_class_uid: String,
    /// Affected or Requested SOP Instance UID
    pub sop_instance_uid: Option<String>,
    /// Action Type ID (N-ACTION)
    pub action_type_id: Option<u16>,
    /// Attribute Identifier List (N-GET)
    pub attribute_identifiers: Vec<Tag>,
    /// Data set following the command
    pub dataset: Option<InMemDicomObject>,
}

/// A DIMSE response sent back to the peer
#[derive(Debug, Clone)]
pub struct DimseResponse {
    pub presentation_context_id: u8,
    pub command: DimseCommand,
    pub message_id_being_responded_to: u16,
    pub sop_class_uid: Option<String>,
    pub sop_instance_uid: Option<String>,
    pub action_type_id: Option<u16>,
    pub status: DimseStatus,
    pub error_comment: Option<String>,
    pub attribute_identifiers: Vec<Tag>,
    pub dataset: Option<InMemDicomObject>,
}

impl DimseRequest {
    /// Create a request without data set
    pub fn new(
        presentation_context_id: u8,
        command: DimseCommand,
        message_id: u16,
        sop_class_uid: impl Into<String>,
    ) -> Self {
        Self {
            presentation_context_id,
            command,
            message_id,
            sop_class_uid: sop_class_uid.into(),
            sop_instance_uid: None,
            action_type_id: None,
            attribute_identifiers: Vec::new(),
            dataset: None,
        }
    }

    /// Set the SOP Instance UID
    pub fn with_instance(mut self, uid: impl Into<String>) -> Self {
        self.sop_instance_uid = Some(uid.into());
        self
    }

    /// Attach a data set
    pub fn with_dataset(mut self, dataset: InMemDicomObject) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// Set the Action Type ID
    pub fn with_action_type(mut self, action_type_id: u16) -> Self {
        self.action_type_id = Some(action_type_id);
        self
    }

    /// Set the Attribute Identifier List
    pub fn with_attribute_identifiers(mut self, tags: Vec<Tag>) -> Self {
        self.attribute_identifiers = tags;
        self
    }

    /// Decode a request from its command set
    ///
    /// Fails with [`DimseError::BadCommandType`] when the Command Field is
    /// not a known request primitive.
    pub fn from_command(
        presentation_context_id: u8,
        command_set: &InMemDicomObject,
        dataset: Option<InMemDicomObject>,
    ) -> Result<Self> {
        let field = command_field(command_set)?;
        let command =
            DimseCommand::from_request_field(field).ok_or(DimseError::BadCommandType(field))?;

        let message_id = if command == DimseCommand::Cancel {
            read_u16(command_set, tags::MESSAGE_ID_BEING_RESPONDED_TO)?
        } else {
            read_u16(command_set, tags::MESSAGE_ID)?
        }
        .ok_or_else(|| DimseError::parsing(format!("{} without Message ID", command)))?;

        let sop_class_uid = match read_str(command_set, tags::AFFECTED_SOP_CLASS_UID)? {
            Some(uid) => uid,
            None => read_str(command_set, tags::REQUESTED_SOP_CLASS_UID)?.unwrap_or_default(),
        };
        let sop_instance_uid = match read_str(command_set, tags::AFFECTED_SOP_INSTANCE_UID)? {
            Some(uid) => Some(uid),
            None => read_str(command_set, tags::REQUESTED_SOP_INSTANCE_UID)?,
        };

        Ok(Self {
            presentation_context_id,
            command,
            message_id,
            sop_class_uid,
            sop_instance_uid,
            action_type_id: read_u16(command_set, tags::ACTION_TYPE_ID)?,
            attribute_identifiers: read_tags(command_set, tags::ATTRIBUTE_IDENTIFIER_LIST),
            dataset,
        })
    }

    /// Encode the command set of this request
    pub fn to_command(&self) -> InMemDicomObject {
        let mut elements = Vec::new();
        // N-CREATE and C-ECHO address the affected object, the other
        // normalized services the requested one
        let (class_tag, instance_tag) = match self.command {
            DimseCommand::NGet | DimseCommand::NSet | DimseCommand::NAction | DimseCommand::NDelete => (
                tags::REQUESTED_SOP_CLASS_UID,
                tags::REQUESTED_SOP_INSTANCE_UID,
            ),
            _ => (tags::AFFECTED_SOP_CLASS_UID, tags::AFFECTED_SOP_INSTANCE_UID),
        };

        if self.command != DimseCommand::Cancel {
            elements.push(uid_element(class_tag, &self.sop_class_uid));
        }
        elements.push(u16_element(tags::COMMAND_FIELD, self.command.request_field()));
        if self.command == DimseCommand::Cancel {
            elements.push(u16_element(tags::MESSAGE_ID_BEING_RESPONDED_TO, self.message_id));
        } else {
            elements.push(u16_element(tags::MESSAGE_ID, self.message_id));
        }
        elements.push(u16_element(
            tags::COMMAND_DATA_SET_TYPE,
            if self.dataset.is_some() { DATASET_PRESENT } else { NO_DATASET },
        ));
        if let Some(uid) = &self.sop_instance_uid {
            elements.push(uid_element(instance_tag, uid));
        }
        if let Some(action) = self.action_type_id {
            elements.push(u16_element(tags::ACTION_TYPE_ID, action));
        }
        if !self.attribute_identifiers.is_empty() {
            elements.push(tags_element(tags::ATTRIBUTE_IDENTIFIER_LIST, &self.attribute_identifiers));
        }

        InMemDicomObject::command_from_element_iter(elements)
    }
}

impl DimseResponse {
    /// Create a response to `request` with the given status
    pub fn for_request(request: &DimseRequest, status: DimseStatus) -> Self {
        Self {
            presentation_context_id: request.presentation_context_id,
            command: request.command,
            message_id_being_responded_to: request.message_id,
            sop_class_uid: Some(request.sop_class_uid.clone()),
            sop_instance_uid: request.sop_instance_uid.clone(),
            action_type_id: request.action_type_id,
            status,
            error_comment: None,
            attribute_identifiers: Vec::new(),
            dataset: None,
        }
    }

    /// Encode the command set of this response
    pub fn to_command(&self) -> InMemDicomObject {
        let mut elements = Vec::new();

        if let Some(uid) = &self.sop_class_uid {
            elements.push(uid_element(tags::AFFECTED_SOP_CLASS_UID, uid));
        }
        elements.push(u16_element(tags::COMMAND_FIELD, self.command.response_field()));
        elements.push(u16_element(
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            self.message_id_being_responded_to,
        ));
        elements.push(u16_element(
            tags::COMMAND_DATA_SET_TYPE,
            if self.dataset.is_some() { DATASET_PRESENT } else { NO_DATASET },
        ));
        elements.push(u16_element(tags::STATUS, self.status.code()));
        if let Some(comment) = &self.error_comment {
            let comment: String = comment.chars().take(ERROR_COMMENT_MAX).collect();
            elements.push(DataElement::new(
                tags::ERROR_COMMENT,
                VR::LO,
                PrimitiveValue::from(comment),
            ));
        }
        if let Some(uid) = &self.sop_instance_uid {
            elements.push(uid_element(tags::AFFECTED_SOP_INSTANCE_UID, uid));
        }
        if self.command == DimseCommand::NAction {
            if let Some(action) = self.action_type_id {
                elements.push(u16_element(tags::ACTION_TYPE_ID, action));
            }
        }
        if !self.attribute_identifiers.is_empty() {
            elements.push(tags_element(tags::ATTRIBUTE_IDENTIFIER_LIST, &self.attribute_identifiers));
        }

        InMemDicomObject::command_from_element_iter(elements)
    }
}

/// Read the Command Field (0000,0100) of a command set
pub fn command_field(command_set: &InMemDicomObject) -> Result<u16> {
    read_u16(command_set, tags::COMMAND_FIELD)?
        .ok_or_else(|| DimseError::parsing("command set without Command Field"))
}

/// Whether the command set announces a following data set
pub fn expects_dataset(command_set: &InMemDicomObject) -> Result<bool> {
    Ok(read_u16(command_set, tags::COMMAND_DATA_SET_TYPE)?
        .map(|value| value != NO_DATASET)
        .unwrap_or(false))
}

fn read_u16(obj: &InMemDicomObject, tag: Tag) -> Result<Option<u16>> {
    match obj.element(tag) {
        Ok(elem) => elem
            .to_int::<u16>()
            .map(Some)
            .map_err(|e| DimseError::parsing(format!("{}: {}", tag, e))),
        Err(_) => Ok(None),
    }
}

fn read_str(obj: &InMemDicomObject, tag: Tag) -> Result<Option<String>> {
    match obj.element(tag) {
        Ok(elem) => {
            let value = elem
                .to_str()
                .map_err(|e| DimseError::parsing(format!("{}: {}", tag, e)))?;
            let value = value.trim_end_matches(['\0', ' ']).to_string();
            Ok(if value.is_empty() { None } else { Some(value) })
        }
        Err(_) => Ok(None),
    }
}

fn read_tags(obj: &InMemDicomObject, tag: Tag) -> Vec<Tag> {
    match obj.element(tag).map(|elem| elem.value()) {
        Ok(Value::Primitive(PrimitiveValue::Tags(list))) => list.to_vec(),
        _ => Vec::new(),
    }
}

fn u16_element(tag: Tag, value: u16) -> InMemElement<StandardDataDictionary> {
    DataElement::new(tag, VR::US, dicom_value!(U16, [value]))
}

fn uid_element(tag: Tag, uid: &str) -> InMemElement<StandardDataDictionary> {
    DataElement::new(tag, VR::UI, PrimitiveValue::from(uid))
}

fn tags_element(tag: Tag, list: &[Tag]) -> InMemElement<StandardDataDictionary> {
    DataElement::new(tag, VR::AT, PrimitiveValue::Tags(list.iter().copied().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILM_SESSION: &str = "1.2.840.10008.5.1.1.1";

    #[test]
    fn test_decode_n_set_request() {
        let request = DimseRequest::new(3, DimseCommand::NSet, 7, FILM_SESSION)
            .with_instance("1.2.3.4");
        let command = request.to_command();

        assert_eq!(command_field(&command).unwrap(), 0x0120);
        assert!(!expects_dataset(&command).unwrap());
        // N-SET addresses the requested instance
        assert!(command.element(tags::REQUESTED_SOP_INSTANCE_UID).is_ok());
        assert!(command.element(tags::AFFECTED_SOP_INSTANCE_UID).is_err());

        let decoded = DimseRequest::from_command(3, &command, None).unwrap();
        assert_eq!(decoded.command, DimseCommand::NSet);
        assert_eq!(decoded.message_id, 7);
        assert_eq!(decoded.sop_class_uid, FILM_SESSION);
        assert_eq!(decoded.sop_instance_uid.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_decode_cancel_uses_responded_message_id() {
        let request = DimseRequest::new(1, DimseCommand::Cancel, 42, "");
        let command = request.to_command();
        assert!(command.element(tags::MESSAGE_ID).is_err());

        let decoded = DimseRequest::from_command(1, &command, None).unwrap();
        assert_eq!(decoded.command, DimseCommand::Cancel);
        assert_eq!(decoded.message_id, 42);
    }

    #[test]
    fn test_response_field_is_rejected_as_request() {
        let response = DimseResponse::for_request(
            &DimseRequest::new(1, DimseCommand::Echo, 1, "1.2.840.10008.1.1"),
            DimseStatus::Success,
        );
        let command = response.to_command();
        match DimseRequest::from_command(1, &command, None) {
            Err(DimseError::BadCommandType(field)) => assert_eq!(field, 0x8030),
            other => panic!("Expected bad command type, got {:?}", other),
        }
    }

    #[test]
    fn test_response_carries_status_and_detail() {
        let request = DimseRequest::new(5, DimseCommand::NAction, 9, "1.2.840.10008.5.1.1.2")
            .with_instance("1.2.3")
            .with_action_type(1);
        let mut response = DimseResponse::for_request(&request, DimseStatus::ATTRIBUTE_LIST_ERROR);
        response.attribute_identifiers = vec![tags::FILM_SESSION_LABEL];
        response.error_comment = Some("x".repeat(100));

        let command = response.to_command();
        assert_eq!(command_field(&command).unwrap(), 0x8130);
        assert_eq!(
            command.element(tags::STATUS).unwrap().to_int::<u16>().unwrap(),
            0x0107
        );
        assert_eq!(
            command.element(tags::MESSAGE_ID_BEING_RESPONDED_TO).unwrap().to_int::<u16>().unwrap(),
            9
        );
        assert_eq!(read_tags(&command, tags::ATTRIBUTE_IDENTIFIER_LIST), vec![tags::FILM_SESSION_LABEL]);
        assert_eq!(
            read_str(&command, tags::ERROR_COMMENT).unwrap().unwrap().len(),
            ERROR_COMMENT_MAX
        );
        assert_eq!(read_u16(&command, tags::ACTION_TYPE_ID).unwrap(), Some(1));
    }

    #[test]
    fn test_missing_command_field() {
        let empty = InMemDicomObject::new_empty();
        assert!(command_field(&empty).is_err());
        assert!(!expects_dataset(&empty).unwrap());
    }
}
