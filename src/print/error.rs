use dicom_core::Tag;
use dimse::{DimseCommand, DimseStatus, ServiceOutcome};
use thiserror::Error;

use crate::storage::StorageError;

pub type PrintResult<T> = Result<T, PrintError>;

/// Failure of a single print N-service request
///
/// Every variant maps to exactly one DIMSE status; the association stays
/// usable after any of them.
#[derive(Debug, Error)]
pub enum PrintError {
    #[error("No such {class} instance {uid}")]
    NoSuchObject { class: &'static str, uid: String },

    #[error("SOP class {0} not supported")]
    NoSuchSopClass(String),

    #[error("Invalid value for {tag}: {reason}")]
    InvalidValue { tag: Tag, reason: String },

    #[error("Missing attribute {0}")]
    MissingAttribute(Tag),

    #[error("Out of resources: {0}")]
    OutOfResources(String),

    #[error("Processing failure: {0}")]
    Processing(String),

    #[error("Duplicate SOP instance {0}")]
    DuplicateInstance(String),

    #[error("No such action type {0}")]
    NoSuchActionType(u16),

    #[error("{0} not supported for this SOP class")]
    UnrecognizedOperation(DimseCommand),

    #[error("Film session contains no film box")]
    EmptyFilmSession,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PrintError {
    pub fn invalid(tag: Tag, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            tag,
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> DimseStatus {
        match self {
            PrintError::NoSuchObject { .. } => DimseStatus::NO_SUCH_OBJECT_INSTANCE,
            PrintError::NoSuchSopClass(_) => DimseStatus::NO_SUCH_SOP_CLASS,
            PrintError::InvalidValue { .. } => DimseStatus::INVALID_ATTRIBUTE_VALUE,
            PrintError::MissingAttribute(_) => DimseStatus::MISSING_ATTRIBUTE,
            PrintError::OutOfResources(_) => DimseStatus::OUT_OF_RESOURCES,
            PrintError::Processing(_) | PrintError::Storage(_) => DimseStatus::PROCESSING_FAILURE,
            PrintError::DuplicateInstance(_) => DimseStatus::DUPLICATE_SOP_INSTANCE,
            PrintError::NoSuchActionType(_) => DimseStatus::NO_SUCH_ACTION_TYPE,
            PrintError::UnrecognizedOperation(_) => DimseStatus::UNRECOGNIZED_OPERATION,
            PrintError::EmptyFilmSession => DimseStatus::FILM_SESSION_EMPTY,
        }
    }
}

impl From<PrintError> for ServiceOutcome {
    fn from(err: PrintError) -> Self {
        match &err {
            PrintError::InvalidValue { tag, .. } | PrintError::MissingAttribute(tag) => {
                ServiceOutcome {
                    error_comment: Some(err.to_string()),
                    ..ServiceOutcome::failure_with_attributes(err.status(), vec![*tag])
                }
            }
            PrintError::OutOfResources(_) => ServiceOutcome::out_of_resources(err.to_string()),
            _ => ServiceOutcome::failure(err.status(), err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_dictionary_std::tags;

    #[test]
    fn test_invalid_value_lists_attribute() {
        let outcome: ServiceOutcome = PrintError::invalid(tags::PRINT_PRIORITY, "URGENT").into();
        assert_eq!(outcome.status, DimseStatus::INVALID_ATTRIBUTE_VALUE);
        assert_eq!(outcome.attribute_identifiers, vec![tags::PRINT_PRIORITY]);
    }

    #[test]
    fn test_out_of_resources_has_comment_only() {
        let outcome: ServiceOutcome = PrintError::OutOfResources("16 image boxes".into()).into();
        assert_eq!(outcome.status.code(), 0x0213);
        assert!(outcome.attribute_identifiers.is_empty());
        assert!(outcome.error_comment.unwrap().contains("16 image boxes"));
    }

    #[test]
    fn test_storage_failure_is_processing_failure() {
        let err = PrintError::from(StorageError::Config("read-only".into()));
        assert_eq!(err.status(), DimseStatus::PROCESSING_FAILURE);
    }
}
