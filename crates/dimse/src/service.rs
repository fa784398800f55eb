//! Service provider seam between the dispatcher and the application
//!
//! Providers never fail across this boundary: every request yields a
//! [`ServiceOutcome`] that the dispatcher maps 1:1 into the response.

use async_trait::async_trait;
use dicom_core::Tag;
use dicom_object::InMemDicomObject;

use crate::association::Association;
use crate::message::{DimseRequest, DimseResponse};
use crate::types::DimseStatus;
use crate::Result;

/// Result of handling one DIMSE request
#[derive(Debug, Clone)]
pub struct ServiceOutcome {
    pub status: DimseStatus,
    /// Instance UID reported back, e.g. the one assigned by N-CREATE
    pub sop_instance_uid: Option<String>,
    pub error_comment: Option<String>,
    pub attribute_identifiers: Vec<Tag>,
    pub dataset: Option<InMemDicomObject>,
}

impl ServiceOutcome {
    fn with_status(status: DimseStatus) -> Self {
        Self {
            status,
            sop_instance_uid: None,
            error_comment: None,
            attribute_identifiers: Vec::new(),
            dataset: None,
        }
    }

    pub fn success() -> Self {
        Self::with_status(DimseStatus::Success)
    }

    /// Warning, optionally listing the offending attributes
    pub fn warning(code: u16, attributes: Vec<Tag>) -> Self {
        Self {
            attribute_identifiers: attributes,
            ..Self::with_status(DimseStatus::Warning(code))
        }
    }

    pub fn failure(status: DimseStatus, comment: impl Into<String>) -> Self {
        Self {
            error_comment: Some(comment.into()),
            ..Self::with_status(status)
        }
    }

    /// Failure listing the attributes that caused it
    pub fn failure_with_attributes(status: DimseStatus, attributes: Vec<Tag>) -> Self {
        Self {
            attribute_identifiers: attributes,
            ..Self::with_status(status)
        }
    }

    /// Out of resources carries an error comment and never an attribute list
    pub fn out_of_resources(comment: impl Into<String>) -> Self {
        Self::failure(DimseStatus::OUT_OF_RESOURCES, comment)
    }

    pub fn with_dataset(mut self, dataset: InMemDicomObject) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn with_instance(mut self, uid: impl Into<String>) -> Self {
        self.sop_instance_uid = Some(uid.into());
        self
    }

    /// Build the response to `request`
    pub fn into_response(self, request: &DimseRequest) -> DimseResponse {
        let mut response = DimseResponse::for_request(request, self.status);
        if let Some(uid) = self.sop_instance_uid {
            response.sop_instance_uid = Some(uid);
        }
        response.error_comment = self.error_comment;
        if self.status != DimseStatus::OUT_OF_RESOURCES {
            response.attribute_identifiers = self.attribute_identifiers;
        }
        // failed operations return no data set
        if self.status.is_success() {
            response.dataset = self.dataset;
        }
        response
    }
}

/// Handles the normalized services of one association
#[async_trait]
pub trait ServiceProvider: Send {
    /// Handle an N-service request, strictly one at a time
    async fn handle(&mut self, request: &DimseRequest) -> ServiceOutcome;

    /// Called once when the association ends, whatever the reason
    async fn close(&mut self) {}
}

/// Builds one [`ServiceProvider`] per accepted association
pub trait ProviderFactory: Send + Sync {
    /// Abstract syntaxes the providers serve, besides Verification
    fn abstract_syntaxes(&self) -> Vec<String>;

    /// Create the provider for a freshly negotiated association
    ///
    /// An error refuses the association with temporary congestion.
    fn create(&self, association: &Association) -> Result<Box<dyn ServiceProvider>>;
}
