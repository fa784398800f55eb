//! Print session of one association
//!
//! [`PrintSession`] owns the film session, its film boxes and the
//! Presentation LUT pool of a single association and routes N-service
//! requests to them by command and SOP class. Nothing is shared between
//! associations except the print store.

use std::sync::Arc;

use async_trait::async_trait;
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dimse::{
    Association, DimseCommand, DimseRequest, DimseStatus, ProviderFactory, ServiceOutcome,
    ServiceProvider,
};
use tracing::{debug, info, warn};

use crate::config::PrinterConfig;
use crate::print::error::{PrintError, PrintResult};
use crate::print::film_box::{FilmBox, StoredPrint};
use crate::print::film_session::FilmSession;
use crate::print::presentation_lut::{PresentationLut, PresentationLutPool};
use crate::print::{printer, uids, RequestContext};
use crate::storage::PrintStore;

/// N-ACTION Action Type ID for "print"
const ACTION_PRINT: u16 = 1;

/// Everything a print session needs from outside the association
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub printer_name: String,
    pub printer: PrinterConfig,
    pub store: Arc<dyn PrintStore>,
    pub calling_ae_title: String,
    pub presentation_lut_negotiated: bool,
    /// SOP classes usable on the association, meta class members included
    pub sop_classes: Vec<String>,
}

impl SessionContext {
    pub fn from_association(
        association: &Association,
        printer_name: impl Into<String>,
        printer: PrinterConfig,
        store: Arc<dyn PrintStore>,
    ) -> Self {
        let mut sop_classes: Vec<String> = association
            .accepted_contexts()
            .map(|pc| pc.abstract_syntax.clone())
            .collect();
        if association.accepts(uids::BASIC_GRAYSCALE_PRINT_META) {
            sop_classes.extend(uids::META_MEMBERS.iter().map(|uid| uid.to_string()));
        }
        sop_classes.sort();
        sop_classes.dedup();

        Self {
            printer_name: printer_name.into(),
            printer,
            store,
            calling_ae_title: association.calling_ae_title.clone(),
            presentation_lut_negotiated: association.accepts(uids::PRESENTATION_LUT),
            sop_classes,
        }
    }

    pub fn serves(&self, sop_class_uid: &str) -> bool {
        self.sop_classes.iter().any(|uid| uid == sop_class_uid)
    }
}

fn session_mut<'s>(
    film_session: &'s mut Option<FilmSession>,
    uid: Option<&str>,
) -> PrintResult<&'s mut FilmSession> {
    match film_session {
        Some(session) if Some(session.sop_instance_uid.as_str()) == uid => Ok(session),
        _ => Err(PrintError::NoSuchObject {
            class: "Basic Film Session",
            uid: uid.unwrap_or_default().to_string(),
        }),
    }
}

fn request_context<'a>(context: &'a SessionContext, luts: &'a PresentationLutPool) -> RequestContext<'a> {
    RequestContext {
        printer: &context.printer,
        luts,
        lut_negotiated: context.presentation_lut_negotiated,
    }
}

/// Success, or attribute list warning when attributes were ignored
fn accepted(ignored: Vec<Tag>) -> ServiceOutcome {
    if ignored.is_empty() {
        ServiceOutcome::success()
    } else {
        debug!("Ignored unsupported attributes {:?}", ignored);
        ServiceOutcome::warning(DimseStatus::ATTRIBUTE_LIST_ERROR.code(), ignored)
    }
}

/// Print object hierarchy of one association
#[derive(Debug)]
pub struct PrintSession {
    context: SessionContext,
    film_session: Option<FilmSession>,
    film_boxes: Vec<FilmBox>,
    luts: PresentationLutPool,
}

impl PrintSession {
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            film_session: None,
            film_boxes: Vec::new(),
            luts: PresentationLutPool::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn film_session(&self) -> Option<&FilmSession> {
        self.film_session.as_ref()
    }

    pub fn film_boxes(&self) -> &[FilmBox] {
        &self.film_boxes
    }

    pub fn presentation_luts(&self) -> &PresentationLutPool {
        &self.luts
    }

    /// Route one request; errors become failure statuses
    pub async fn dispatch(&mut self, request: &DimseRequest) -> PrintResult<ServiceOutcome> {
        let class = request.sop_class_uid.as_str();
        if !self.context.serves(class) {
            return Err(PrintError::NoSuchSopClass(class.to_string()));
        }

        let empty = InMemDicomObject::new_empty();
        let data = request.dataset.as_ref().unwrap_or(&empty);
        let instance = request.sop_instance_uid.as_deref();

        match (request.command, class) {
            (DimseCommand::NCreate, uids::BASIC_FILM_SESSION) => self.create_film_session(instance, data),
            (DimseCommand::NSet, uids::BASIC_FILM_SESSION) => self.set_film_session(instance, data),
            (DimseCommand::NAction, uids::BASIC_FILM_SESSION) => {
                self.action_film_session(instance, request.action_type_id).await
            }
            (DimseCommand::NDelete, uids::BASIC_FILM_SESSION) => self.delete_film_session(instance),

            (DimseCommand::NCreate, uids::BASIC_FILM_BOX) => self.create_film_box(instance, data),
            (DimseCommand::NSet, uids::BASIC_FILM_BOX) => self.set_film_box(instance, data),
            (DimseCommand::NAction, uids::BASIC_FILM_BOX) => {
                self.action_film_box(instance, request.action_type_id).await
            }
            (DimseCommand::NDelete, uids::BASIC_FILM_BOX) => self.delete_film_box(instance),

            (DimseCommand::NSet, uids::BASIC_GRAYSCALE_IMAGE_BOX) => self.set_image_box(instance, data),

            (DimseCommand::NGet, uids::PRINTER) => printer::get(
                instance,
                &request.attribute_identifiers,
                &self.context.printer_name,
                &self.context.printer,
            ),

            (DimseCommand::NCreate, uids::PRESENTATION_LUT) => self.create_presentation_lut(data),
            (DimseCommand::NDelete, uids::PRESENTATION_LUT) => self.delete_presentation_lut(instance),

            (command, _) => Err(PrintError::UnrecognizedOperation(command)),
        }
    }

    fn create_film_session(
        &mut self,
        requested_uid: Option<&str>,
        data: &InMemDicomObject,
    ) -> PrintResult<ServiceOutcome> {
        if let Some(existing) = &self.film_session {
            return Err(PrintError::DuplicateInstance(existing.sop_instance_uid.clone()));
        }
        let uid = requested_uid.map(str::to_string).unwrap_or_else(uids::generate_uid);

        let ctx = request_context(&self.context, &self.luts);
        let (mut session, ignored) = FilmSession::create(uid, data, ctx)?;
        // only a created session gets the IDENTITY LUT into the pool
        if self.context.presentation_lut_negotiated && session.presentation_lut.is_none() {
            session.reference_default_lut(self.luts.insert(PresentationLut::Identity, false));
        }
        info!(
            "Film session {} created for {} ({} copies, {} priority)",
            session.sop_instance_uid,
            self.context.calling_ae_title,
            session.number_of_copies,
            session.print_priority
        );

        let outcome = accepted(ignored)
            .with_instance(session.sop_instance_uid.clone())
            .with_dataset(session.to_dataset(self.context.presentation_lut_negotiated));
        self.film_session = Some(session);
        Ok(outcome)
    }

    fn set_film_session(&mut self, uid: Option<&str>, data: &InMemDicomObject) -> PrintResult<ServiceOutcome> {
        let session = session_mut(&mut self.film_session, uid)?;
        let ctx = request_context(&self.context, &self.luts);
        let ignored = session.apply(data, ctx)?;

        // session level LUT and lighting override every film box
        for film_box in &mut self.film_boxes {
            film_box.inherit(session, data);
        }
        debug!("Film session {} updated", session.sop_instance_uid);

        Ok(accepted(ignored).with_dataset(session.to_dataset(self.context.presentation_lut_negotiated)))
    }

    async fn action_film_session(
        &mut self,
        uid: Option<&str>,
        action_type: Option<u16>,
    ) -> PrintResult<ServiceOutcome> {
        session_mut(&mut self.film_session, uid)?;
        check_action_type(action_type)?;
        if self.film_boxes.is_empty() {
            return Err(PrintError::EmptyFilmSession);
        }

        self.cleanup_luts();
        for film_box in &self.film_boxes {
            self.persist(film_box).await?;
        }
        info!(
            "Film session {} printed, {} film boxes stored",
            uid.unwrap_or_default(),
            self.film_boxes.len()
        );
        Ok(ServiceOutcome::success())
    }

    fn delete_film_session(&mut self, uid: Option<&str>) -> PrintResult<ServiceOutcome> {
        session_mut(&mut self.film_session, uid)?;
        // shared LUTs stay in the pool until the next cleanup
        self.film_session = None;
        let dropped = self.film_boxes.len();
        self.film_boxes.clear();
        debug!(
            "Film session {} deleted with {} film boxes",
            uid.unwrap_or_default(),
            dropped
        );
        Ok(ServiceOutcome::success())
    }

    fn create_film_box(
        &mut self,
        requested_uid: Option<&str>,
        data: &InMemDicomObject,
    ) -> PrintResult<ServiceOutcome> {
        let session = self.film_session.as_ref().ok_or_else(|| {
            PrintError::invalid(tags::REFERENCED_FILM_SESSION_SEQUENCE, "no film session")
        })?;
        if let Some(uid) = requested_uid {
            if self.film_boxes.iter().any(|fb| fb.sop_instance_uid == uid) {
                return Err(PrintError::DuplicateInstance(uid.to_string()));
            }
        }
        let uid = requested_uid.map(str::to_string).unwrap_or_else(uids::generate_uid);

        let ctx = request_context(&self.context, &self.luts);
        let (film_box, ignored) = FilmBox::create(uid, data, ctx, session)?;
        info!(
            "Film box {} created ({}, {} image boxes)",
            film_box.sop_instance_uid,
            film_box.image_display_format,
            film_box.image_boxes.len()
        );

        let outcome = accepted(ignored)
            .with_instance(film_box.sop_instance_uid.clone())
            .with_dataset(film_box.to_dataset(self.context.presentation_lut_negotiated));
        self.film_boxes.push(film_box);
        Ok(outcome)
    }

    fn film_box_index(&self, uid: Option<&str>) -> PrintResult<usize> {
        self.film_boxes
            .iter()
            .position(|fb| Some(fb.sop_instance_uid.as_str()) == uid)
            .ok_or_else(|| PrintError::NoSuchObject {
                class: "Basic Film Box",
                uid: uid.unwrap_or_default().to_string(),
            })
    }

    fn set_film_box(&mut self, uid: Option<&str>, data: &InMemDicomObject) -> PrintResult<ServiceOutcome> {
        let index = self.film_box_index(uid)?;
        let ctx = request_context(&self.context, &self.luts);
        let film_box = &mut self.film_boxes[index];
        let ignored = film_box.apply(data, ctx)?;
        debug!("Film box {} updated", film_box.sop_instance_uid);
        Ok(accepted(ignored).with_dataset(film_box.to_dataset(self.context.presentation_lut_negotiated)))
    }

    async fn action_film_box(
        &mut self,
        uid: Option<&str>,
        action_type: Option<u16>,
    ) -> PrintResult<ServiceOutcome> {
        let index = self.film_box_index(uid)?;
        check_action_type(action_type)?;

        self.cleanup_luts();
        let film_box = &self.film_boxes[index];
        self.persist(film_box).await?;

        if film_box.has_images() {
            Ok(ServiceOutcome::success())
        } else {
            warn!("Film box {} printed without images", film_box.sop_instance_uid);
            Ok(ServiceOutcome::warning(DimseStatus::EMPTY_PAGE.code(), Vec::new()))
        }
    }

    fn delete_film_box(&mut self, uid: Option<&str>) -> PrintResult<ServiceOutcome> {
        let index = self.film_box_index(uid)?;
        let film_box = self.film_boxes.remove(index);
        debug!("Film box {} deleted", film_box.sop_instance_uid);
        Ok(ServiceOutcome::success())
    }

    fn set_image_box(&mut self, uid: Option<&str>, data: &InMemDicomObject) -> PrintResult<ServiceOutcome> {
        let ctx = request_context(&self.context, &self.luts);
        let target = uid.unwrap_or_default();
        for film_box in &mut self.film_boxes {
            let film_box_lut = film_box.presentation_lut.clone();
            if let Some(image_box) = film_box.image_box_mut(target) {
                let ignored = image_box.apply(data, ctx, film_box_lut.as_deref())?;
                debug!(
                    "Image box {} at position {} updated",
                    image_box.sop_instance_uid, image_box.image_position
                );
                return Ok(accepted(ignored));
            }
        }
        Err(PrintError::NoSuchObject {
            class: "Basic Grayscale Image Box",
            uid: target.to_string(),
        })
    }

    fn create_presentation_lut(&mut self, data: &InMemDicomObject) -> PrintResult<ServiceOutcome> {
        let lut = PresentationLut::from_dataset(data)?;
        let uid = self.luts.insert(lut, false);
        let stored = self.luts.get(&uid).map(PresentationLut::to_dataset)
            .unwrap_or_else(InMemDicomObject::new_empty);
        debug!("Presentation LUT {} ({} in pool)", uid, self.luts.len());
        Ok(ServiceOutcome::success().with_instance(uid).with_dataset(stored))
    }

    fn delete_presentation_lut(&mut self, uid: Option<&str>) -> PrintResult<ServiceOutcome> {
        let target = uid.unwrap_or_default();
        if self.referenced_luts().any(|lut| lut == target) {
            warn!("Presentation LUT {} deleted while still referenced", target);
        }
        if !self.luts.delete(target) {
            return Err(PrintError::NoSuchObject {
                class: "Presentation LUT",
                uid: target.to_string(),
            });
        }
        Ok(ServiceOutcome::success())
    }

    fn referenced_luts(&self) -> impl Iterator<Item = &str> + '_ {
        self.film_session
            .iter()
            .filter_map(|session| session.presentation_lut.as_deref())
            .chain(self.film_boxes.iter().flat_map(|film_box| film_box.lut_references()))
    }

    /// Drop pool entries no object references
    fn cleanup_luts(&mut self) {
        let referenced: Vec<String> = self.referenced_luts().map(str::to_string).collect();
        self.luts.cleanup(referenced.iter().map(String::as_str));
    }

    async fn persist(&self, film_box: &FilmBox) -> PrintResult<()> {
        let session = self
            .film_session
            .as_ref()
            .ok_or_else(|| PrintError::Processing("film box without film session".into()))?;
        let print = StoredPrint::build(
            session,
            film_box,
            &self.luts,
            &self.context.calling_ae_title,
            &self.context.printer_name,
        )?;
        self.context.store.persist_film_box(&print).await?;
        info!(
            "Film box {} stored as {} with {} images",
            film_box.sop_instance_uid,
            print.sop_instance_uid,
            print.hardcopy_images.len()
        );
        Ok(())
    }
}

fn check_action_type(action_type: Option<u16>) -> PrintResult<()> {
    match action_type {
        Some(ACTION_PRINT) => Ok(()),
        other => Err(PrintError::NoSuchActionType(other.unwrap_or_default())),
    }
}

#[async_trait]
impl ServiceProvider for PrintSession {
    async fn handle(&mut self, request: &DimseRequest) -> ServiceOutcome {
        match self.dispatch(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("{} on {} rejected: {}", request.command, request.sop_class_uid, e);
                e.into()
            }
        }
    }

    async fn close(&mut self) {
        if !self.film_boxes.is_empty() {
            debug!(
                "Discarding {} film boxes of {}",
                self.film_boxes.len(),
                self.context.calling_ae_title
            );
        }
        self.film_session = None;
        self.film_boxes.clear();
        self.luts = PresentationLutPool::new();
    }
}

/// Creates one [`PrintSession`] per association for a configured printer
#[derive(Debug, Clone)]
pub struct PrintProviderFactory {
    printer_name: String,
    printer: PrinterConfig,
    store: Arc<dyn PrintStore>,
}

impl PrintProviderFactory {
    pub fn new(printer_name: impl Into<String>, printer: PrinterConfig, store: Arc<dyn PrintStore>) -> Self {
        Self {
            printer_name: printer_name.into(),
            printer,
            store,
        }
    }
}

impl ProviderFactory for PrintProviderFactory {
    fn abstract_syntaxes(&self) -> Vec<String> {
        [
            uids::BASIC_GRAYSCALE_PRINT_META,
            uids::BASIC_FILM_SESSION,
            uids::BASIC_FILM_BOX,
            uids::BASIC_GRAYSCALE_IMAGE_BOX,
            uids::PRINTER,
            uids::PRESENTATION_LUT,
        ]
        .iter()
        .map(|uid| uid.to_string())
        .collect()
    }

    fn create(&self, association: &Association) -> dimse::Result<Box<dyn ServiceProvider>> {
        let context = SessionContext::from_association(
            association,
            self.printer_name.clone(),
            self.printer.clone(),
            self.store.clone(),
        );
        debug!(
            "Print session for {} serving {} SOP classes (Presentation LUT: {})",
            context.calling_ae_title,
            context.sop_classes.len(),
            context.presentation_lut_negotiated
        );
        Ok(Box::new(PrintSession::new(context)))
    }
}
