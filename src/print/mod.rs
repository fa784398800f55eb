//! Basic Grayscale Print Management
//!
//! Per-association object model (film session, film boxes, image boxes and
//! the Presentation LUT pool) driven by N-service requests.

pub mod dataset;
pub mod error;
pub mod film_box;
pub mod film_session;
pub mod image_box;
pub mod presentation_lut;
pub mod printer;
pub mod session;
pub mod uids;

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;

pub use error::{PrintError, PrintResult};
pub use film_box::{FilmBox, HardcopyImage, StoredPrint};
pub use film_session::FilmSession;
pub use image_box::{GrayscaleImage, ImageBox};
pub use presentation_lut::{LutAlignment, PresentationLut, PresentationLutPool};
pub use session::{PrintProviderFactory, PrintSession, SessionContext};

use crate::config::PrinterConfig;

/// What a request data set is checked against
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub printer: &'a PrinterConfig,
    pub luts: &'a PresentationLutPool,
    /// Presentation LUT SOP class accepted on this association
    pub lut_negotiated: bool,
}

impl<'a> RequestContext<'a> {
    /// Resolve the Referenced Presentation LUT Sequence of `obj`
    ///
    /// Only valid when Presentation LUT support was negotiated. With
    /// alignment required, tables that fit no bit depth are refused.
    pub fn lut_reference(&self, obj: &InMemDicomObject) -> PrintResult<Option<String>> {
        if !self.lut_negotiated {
            return Ok(None);
        }
        let uid = match self.luts.resolve_reference(obj)? {
            Some(uid) => uid,
            None => return Ok(None),
        };
        if self.printer.require_lut_alignment
            && self.luts.classify_alignment(&uid) == Some(LutAlignment::Other)
        {
            return Err(PrintError::invalid(
                tags::REFERENCED_PRESENTATION_LUT_SEQUENCE,
                format!("Presentation LUT {} fits no image bit depth", uid),
            ));
        }
        Ok(Some(uid))
    }

    /// Tags reserved to Presentation LUT support
    pub fn lut_tags(&self) -> &'static [Tag] {
        if self.lut_negotiated {
            &[
                tags::ILLUMINATION,
                tags::REFLECTED_AMBIENT_LIGHT,
                tags::REFERENCED_PRESENTATION_LUT_SEQUENCE,
            ]
        } else {
            &[]
        }
    }
}
