use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use serde::{Deserialize, Serialize};

use crate::print::dataset;
use crate::print::error::{PrintError, PrintResult};
use crate::print::presentation_lut::LutAlignment;
use crate::print::uids;
use crate::print::RequestContext;

const PRINT_PRIORITIES: [&str; 3] = ["HIGH", "MED", "LOW"];

const FILM_SESSION_TAGS: [Tag; 7] = [
    tags::NUMBER_OF_COPIES,
    tags::PRINT_PRIORITY,
    tags::MEDIUM_TYPE,
    tags::FILM_DESTINATION,
    tags::FILM_SESSION_LABEL,
    tags::MEMORY_ALLOCATION,
    tags::OWNER_ID,
];

/// Basic Film Session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmSession {
    pub sop_instance_uid: String,
    pub number_of_copies: u32,
    pub print_priority: String,
    pub medium_type: String,
    pub film_destination: String,
    pub film_session_label: String,
    pub memory_allocation: Option<u32>,
    pub owner_id: Option<String>,
    pub illumination: u16,
    pub reflected_ambient_light: u16,
    /// Pool entry UID
    pub presentation_lut: Option<String>,
    pub alignment: LutAlignment,
}

impl FilmSession {
    /// Create from an N-CREATE data set, defaulting every absent attribute
    ///
    /// Returns the session and the attributes that were ignored.
    pub fn create(
        sop_instance_uid: String,
        request: &InMemDicomObject,
        ctx: RequestContext<'_>,
    ) -> PrintResult<(Self, Vec<Tag>)> {
        let printer = ctx.printer;
        let mut session = FilmSession {
            sop_instance_uid,
            number_of_copies: 1,
            print_priority: "MED".to_string(),
            medium_type: printer.default_medium_type.clone(),
            film_destination: printer.default_film_destination.clone(),
            film_session_label: "UNNAMED".to_string(),
            memory_allocation: None,
            owner_id: None,
            illumination: printer.default_illumination,
            reflected_ambient_light: printer.default_reflected_ambient_light,
            presentation_lut: None,
            alignment: LutAlignment::Shape,
        };
        let ignored = session.update(request, ctx)?;
        session.refresh_alignment(ctx);
        Ok((session, ignored))
    }

    /// Reference the pool's IDENTITY LUT when the request named none
    pub fn reference_default_lut(&mut self, identity_uid: String) {
        if self.presentation_lut.is_none() {
            self.presentation_lut = Some(identity_uid);
            self.alignment = LutAlignment::Shape;
        }
    }

    /// Apply an N-SET data set
    ///
    /// Either every attribute is applied or, on error, none is.
    pub fn apply(&mut self, request: &InMemDicomObject, ctx: RequestContext<'_>) -> PrintResult<Vec<Tag>> {
        let mut updated = self.clone();
        let ignored = updated.update(request, ctx)?;
        updated.refresh_alignment(ctx);
        *self = updated;
        Ok(ignored)
    }

    fn update(&mut self, request: &InMemDicomObject, ctx: RequestContext<'_>) -> PrintResult<Vec<Tag>> {
        let printer = ctx.printer;

        if let Some(copies) = dataset::get_int::<u32>(request, tags::NUMBER_OF_COPIES)? {
            if copies == 0 || copies > printer.max_copies {
                return Err(PrintError::invalid(
                    tags::NUMBER_OF_COPIES,
                    format!("{} copies, printer allows 1 to {}", copies, printer.max_copies),
                ));
            }
            self.number_of_copies = copies;
        }
        if let Some(priority) = dataset::get_code(request, tags::PRINT_PRIORITY)? {
            dataset::check_enum(tags::PRINT_PRIORITY, &priority, &PRINT_PRIORITIES)?;
            self.print_priority = priority;
        }
        if let Some(medium) = dataset::get_code(request, tags::MEDIUM_TYPE)? {
            dataset::check_allowed(tags::MEDIUM_TYPE, &medium, &printer.medium_types)?;
            self.medium_type = medium;
        }
        if let Some(destination) = dataset::get_code(request, tags::FILM_DESTINATION)? {
            dataset::check_allowed(tags::FILM_DESTINATION, &destination, &printer.film_destinations)?;
            self.film_destination = destination;
        }
        if let Some(label) = dataset::get_str(request, tags::FILM_SESSION_LABEL)? {
            self.film_session_label = label;
        }
        if let Some(allocation) = dataset::get_int::<u32>(request, tags::MEMORY_ALLOCATION)? {
            self.memory_allocation = Some(allocation);
        }
        if let Some(owner) = dataset::get_str(request, tags::OWNER_ID)? {
            self.owner_id = Some(owner);
        }

        if ctx.lut_negotiated {
            if let Some(illumination) = dataset::get_int::<u16>(request, tags::ILLUMINATION)? {
                self.illumination = illumination;
            }
            if let Some(light) = dataset::get_int::<u16>(request, tags::REFLECTED_AMBIENT_LIGHT)? {
                self.reflected_ambient_light = light;
            }
            if let Some(uid) = ctx.lut_reference(request)? {
                self.presentation_lut = Some(uid);
            }
        }

        let known: Vec<Tag> = FILM_SESSION_TAGS
            .iter()
            .chain(ctx.lut_tags())
            .copied()
            .collect();
        Ok(dataset::unknown_attributes(request, &known))
    }

    fn refresh_alignment(&mut self, ctx: RequestContext<'_>) {
        self.alignment = self
            .presentation_lut
            .as_deref()
            .and_then(|uid| ctx.luts.classify_alignment(uid))
            .unwrap_or(LutAlignment::Shape);
    }

    /// Response data set
    pub fn to_dataset(&self, lut_negotiated: bool) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        dataset::put_is(&mut obj, tags::NUMBER_OF_COPIES, self.number_of_copies);
        dataset::put_str(&mut obj, tags::PRINT_PRIORITY, VR::CS, &self.print_priority);
        dataset::put_str(&mut obj, tags::MEDIUM_TYPE, VR::CS, &self.medium_type);
        dataset::put_str(&mut obj, tags::FILM_DESTINATION, VR::CS, &self.film_destination);
        dataset::put_str(&mut obj, tags::FILM_SESSION_LABEL, VR::LO, &self.film_session_label);
        if let Some(allocation) = self.memory_allocation {
            dataset::put_is(&mut obj, tags::MEMORY_ALLOCATION, allocation);
        }
        dataset::put_opt_str(&mut obj, tags::OWNER_ID, VR::SH, self.owner_id.as_deref());
        if lut_negotiated {
            dataset::put_u16(&mut obj, tags::ILLUMINATION, self.illumination);
            dataset::put_u16(&mut obj, tags::REFLECTED_AMBIENT_LIGHT, self.reflected_ambient_light);
            if let Some(uid) = &self.presentation_lut {
                dataset::put_reference(
                    &mut obj,
                    tags::REFERENCED_PRESENTATION_LUT_SEQUENCE,
                    uids::PRESENTATION_LUT,
                    uid,
                );
            }
        }
        obj
    }
}
