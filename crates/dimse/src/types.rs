//! Common types for DIMSE operations

use serde::{Deserialize, Serialize};

/// DICOM application context name, the only one an SCP may accept
pub const APPLICATION_CONTEXT_NAME: &str = "1.2.840.10008.3.1.1.1";

/// Verification SOP Class (C-ECHO)
pub const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";

/// Transfer syntax UIDs understood by the SCP
pub mod transfer_syntax {
    pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
    pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
    pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
}

/// DIMSE command types
///
/// Only the request form is represented; whether a message is a request or
/// a response is carried by the message type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimseCommand {
    /// C-STORE
    Store,
    /// C-GET
    Get,
    /// C-FIND
    Find,
    /// C-MOVE
    Move,
    /// C-ECHO
    Echo,
    /// C-CANCEL
    Cancel,
    /// N-EVENT-REPORT
    EventReport,
    /// N-GET
    NGet,
    /// N-SET
    NSet,
    /// N-ACTION
    NAction,
    /// N-CREATE
    NCreate,
    /// N-DELETE
    NDelete,
}

impl DimseCommand {
    /// Command Field (0000,0100) value of the request primitive
    pub fn request_field(self) -> u16 {
        match self {
            DimseCommand::Store => 0x0001,
            DimseCommand::Get => 0x0010,
            DimseCommand::Find => 0x0020,
            DimseCommand::Move => 0x0021,
            DimseCommand::Echo => 0x0030,
            DimseCommand::EventReport => 0x0100,
            DimseCommand::NGet => 0x0110,
            DimseCommand::NSet => 0x0120,
            DimseCommand::NAction => 0x0130,
            DimseCommand::NCreate => 0x0140,
            DimseCommand::NDelete => 0x0150,
            DimseCommand::Cancel => 0x0FFF,
        }
    }

    /// Command Field (0000,0100) value of the response primitive
    pub fn response_field(self) -> u16 {
        self.request_field() | 0x8000
    }

    /// Decode a request Command Field, `None` for responses and unknown values
    pub fn from_request_field(field: u16) -> Option<Self> {
        let command = match field {
            0x0001 => DimseCommand::Store,
            0x0010 => DimseCommand::Get,
            0x0020 => DimseCommand::Find,
            0x0021 => DimseCommand::Move,
            0x0030 => DimseCommand::Echo,
            0x0100 => DimseCommand::EventReport,
            0x0110 => DimseCommand::NGet,
            0x0120 => DimseCommand::NSet,
            0x0130 => DimseCommand::NAction,
            0x0140 => DimseCommand::NCreate,
            0x0150 => DimseCommand::NDelete,
            0x0FFF => DimseCommand::Cancel,
            _ => return None,
        };
        Some(command)
    }

    /// Decode a response Command Field
    pub fn from_response_field(field: u16) -> Option<Self> {
        if field & 0x8000 == 0 {
            return None;
        }
        Self::from_request_field(field & 0x7FFF).filter(|c| *c != DimseCommand::Cancel)
    }

    /// Whether this is one of the normalized (N-) services
    pub fn is_normalized(self) -> bool {
        matches!(
            self,
            DimseCommand::EventReport
                | DimseCommand::NGet
                | DimseCommand::NSet
                | DimseCommand::NAction
                | DimseCommand::NCreate
                | DimseCommand::NDelete
        )
    }
}

impl std::fmt::Display for DimseCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DimseCommand::Store => "C-STORE",
            DimseCommand::Get => "C-GET",
            DimseCommand::Find => "C-FIND",
            DimseCommand::Move => "C-MOVE",
            DimseCommand::Echo => "C-ECHO",
            DimseCommand::Cancel => "C-CANCEL",
            DimseCommand::EventReport => "N-EVENT-REPORT",
            DimseCommand::NGet => "N-GET",
            DimseCommand::NSet => "N-SET",
            DimseCommand::NAction => "N-ACTION",
            DimseCommand::NCreate => "N-CREATE",
            DimseCommand::NDelete => "N-DELETE",
        };
        f.write_str(name)
    }
}

/// DIMSE operation status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimseStatus {
    /// Operation completed successfully
    Success,
    /// Operation is pending (more responses to follow)
    Pending,
    /// Operation cancelled by user
    Cancel,
    /// Operation failed with error
    Failure(u16), // DICOM status code
    /// Warning occurred during operation
    Warning(u16), // DICOM status code
}

impl DimseStatus {
    pub const ATTRIBUTE_LIST_ERROR: DimseStatus = DimseStatus::Warning(0x0107);
    pub const EMPTY_PAGE: DimseStatus = DimseStatus::Warning(0xB603);

    pub const INVALID_ATTRIBUTE_VALUE: DimseStatus = DimseStatus::Failure(0x0106);
    pub const PROCESSING_FAILURE: DimseStatus = DimseStatus::Failure(0x0110);
    pub const DUPLICATE_SOP_INSTANCE: DimseStatus = DimseStatus::Failure(0x0111);
    pub const NO_SUCH_OBJECT_INSTANCE: DimseStatus = DimseStatus::Failure(0x0112);
    pub const NO_SUCH_SOP_CLASS: DimseStatus = DimseStatus::Failure(0x0118);
    pub const MISSING_ATTRIBUTE: DimseStatus = DimseStatus::Failure(0x0120);
    pub const NO_SUCH_ACTION_TYPE: DimseStatus = DimseStatus::Failure(0x0123);
    pub const UNRECOGNIZED_OPERATION: DimseStatus = DimseStatus::Failure(0x0211);
    pub const OUT_OF_RESOURCES: DimseStatus = DimseStatus::Failure(0x0213);
    pub const FILM_SESSION_EMPTY: DimseStatus = DimseStatus::Failure(0xC600);

    /// The Status (0000,0900) value
    pub fn code(&self) -> u16 {
        match self {
            DimseStatus::Success => 0x0000,
            DimseStatus::Pending => 0xFF00,
            DimseStatus::Cancel => 0xFE00,
            DimseStatus::Failure(code) | DimseStatus::Warning(code) => *code,
        }
    }

    /// Classify a Status (0000,0900) value
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0000 => DimseStatus::Success,
            0xFF00 | 0xFF01 => DimseStatus::Pending,
            0xFE00 => DimseStatus::Cancel,
            0x0001 | 0x0107 | 0x0116 => DimseStatus::Warning(code),
            c if c & 0xF000 == 0xB000 => DimseStatus::Warning(code),
            c => DimseStatus::Failure(c),
        }
    }

    /// Success or warning
    pub fn is_success(&self) -> bool {
        matches!(self, DimseStatus::Success | DimseStatus::Warning(_))
    }
}

impl std::fmt::Display for DimseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimseStatus::Success => write!(f, "Success"),
            DimseStatus::Pending => write!(f, "Pending"),
            DimseStatus::Cancel => write!(f, "Cancel"),
            DimseStatus::Warning(code) => write!(f, "Warning 0x{:04X}", code),
            DimseStatus::Failure(code) => write!(f, "Failure 0x{:04X}", code),
        }
    }
}

/// How the dispatcher waits for the next command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockingMode {
    /// Wait indefinitely
    #[default]
    Blocking,
    /// Give up after the configured DIMSE timeout
    NonBlocking,
}
