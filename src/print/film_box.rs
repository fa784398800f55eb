use chrono::{DateTime, Utc};
use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use serde::{Deserialize, Serialize};

use crate::config::PrinterConfig;
use crate::print::dataset;
use crate::print::error::{PrintError, PrintResult};
use crate::print::film_session::FilmSession;
use crate::print::image_box::{GrayscaleImage, ImageBox};
use crate::print::presentation_lut::{PoolEntry, PresentationLutPool};
use crate::print::uids;
use crate::print::RequestContext;

const ORIENTATIONS: [&str; 2] = ["PORTRAIT", "LANDSCAPE"];
const TRIM_VALUES: [&str; 2] = ["YES", "NO"];

/// Attributes a film box accepts in N-SET
const FILM_BOX_SET_TAGS: [Tag; 8] = [
    tags::MAGNIFICATION_TYPE,
    tags::SMOOTHING_TYPE,
    tags::BORDER_DENSITY,
    tags::EMPTY_IMAGE_DENSITY,
    tags::MIN_DENSITY,
    tags::MAX_DENSITY,
    tags::TRIM,
    tags::CONFIGURATION_INFORMATION,
];

/// Attributes only allowed at creation
const FILM_BOX_CREATE_TAGS: [Tag; 5] = [
    tags::IMAGE_DISPLAY_FORMAT,
    tags::FILM_ORIENTATION,
    tags::FILM_SIZE_ID,
    tags::REQUESTED_RESOLUTION_ID,
    tags::REFERENCED_FILM_SESSION_SEQUENCE,
];

/// Parsed Image Display Format (2010,0010)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayFormat {
    /// `STANDARD\C,R`
    Standard { columns: u32, rows: u32 },
    /// `ROW\a,b,..`, images per row
    Row(Vec<u32>),
    /// `COL\a,b,..`, images per column
    Col(Vec<u32>),
}

impl DisplayFormat {
    pub fn parse(text: &str) -> PrintResult<Self> {
        let tag = tags::IMAGE_DISPLAY_FORMAT;
        let invalid = || PrintError::invalid(tag, format!("'{}' is not a supported format", text));

        let (kind, values) = text.split_once('\\').ok_or_else(invalid)?;
        let numbers = values
            .split(',')
            .map(|v| v.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;
        if numbers.contains(&0) {
            return Err(invalid());
        }

        match kind.trim().to_ascii_uppercase().as_str() {
            "STANDARD" => match numbers.as_slice() {
                [columns, rows] => Ok(DisplayFormat::Standard {
                    columns: *columns,
                    rows: *rows,
                }),
                _ => Err(invalid()),
            },
            "ROW" => Ok(DisplayFormat::Row(numbers)),
            "COL" => Ok(DisplayFormat::Col(numbers)),
            _ => Err(invalid()),
        }
    }

    /// Number of image boxes on the film
    ///
    /// Counted in `u64` since the layout numbers come from the peer.
    pub fn image_count(&self) -> u64 {
        match self {
            DisplayFormat::Standard { columns, rows } => u64::from(*columns) * u64::from(*rows),
            DisplayFormat::Row(counts) | DisplayFormat::Col(counts) => counts
                .iter()
                .fold(0u64, |total, count| total.saturating_add(u64::from(*count))),
        }
    }

    /// Widest row and tallest column
    fn extent(&self) -> (u32, u32) {
        match self {
            DisplayFormat::Standard { columns, rows } => (*columns, *rows),
            DisplayFormat::Row(counts) => (
                counts.iter().copied().max().unwrap_or(0),
                counts.len() as u32,
            ),
            DisplayFormat::Col(counts) => (
                counts.len() as u32,
                counts.iter().copied().max().unwrap_or(0),
            ),
        }
    }

    /// A layout beyond the printer's matrix cannot be allocated
    pub fn check_capacity(&self, printer: &PrinterConfig) -> PrintResult<()> {
        let (columns, rows) = self.extent();
        let count = self.image_count();
        if columns > printer.max_columns
            || rows > printer.max_rows
            || count > printer.max_image_boxes()
        {
            return Err(PrintError::OutOfResources(format!(
                "{} image boxes in a {}x{} layout, printer supports {}x{}",
                count,
                columns,
                rows,
                printer.max_columns,
                printer.max_rows
            )));
        }
        Ok(())
    }
}

/// Basic Film Box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmBox {
    pub sop_instance_uid: String,
    pub film_session_uid: String,
    pub image_display_format: String,
    pub film_orientation: String,
    pub film_size_id: String,
    pub magnification_type: String,
    pub smoothing_type: Option<String>,
    pub border_density: Option<String>,
    pub empty_image_density: Option<String>,
    pub min_density: Option<u16>,
    pub max_density: Option<u16>,
    pub trim: Option<String>,
    pub configuration_information: Option<String>,
    pub requested_resolution_id: String,
    pub illumination: u16,
    pub reflected_ambient_light: u16,
    /// Pool entry UID
    pub presentation_lut: Option<String>,
    pub image_boxes: Vec<ImageBox>,
}

impl FilmBox {
    /// Create under `session` from an N-CREATE data set
    ///
    /// One placeholder image box is allocated per position of the image
    /// display format.
    pub fn create(
        sop_instance_uid: String,
        request: &InMemDicomObject,
        ctx: RequestContext<'_>,
        session: &FilmSession,
    ) -> PrintResult<(Self, Vec<Tag>)> {
        let printer = ctx.printer;

        let reference_tag = tags::REFERENCED_FILM_SESSION_SEQUENCE;
        match dataset::get_reference(request, reference_tag)? {
            None => return Err(PrintError::MissingAttribute(reference_tag)),
            Some((class, uid)) => {
                if class != uids::BASIC_FILM_SESSION || uid != session.sop_instance_uid {
                    return Err(PrintError::invalid(
                        reference_tag,
                        format!("film session {} does not exist", uid),
                    ));
                }
            }
        }

        let image_display_format = dataset::get_str(request, tags::IMAGE_DISPLAY_FORMAT)?
            .ok_or(PrintError::MissingAttribute(tags::IMAGE_DISPLAY_FORMAT))?;
        let layout = DisplayFormat::parse(&image_display_format)?;
        layout.check_capacity(printer)?;

        let film_orientation = match dataset::get_code(request, tags::FILM_ORIENTATION)? {
            Some(orientation) => {
                dataset::check_enum(tags::FILM_ORIENTATION, &orientation, &ORIENTATIONS)?;
                orientation
            }
            None => "PORTRAIT".to_string(),
        };
        let film_size_id = match dataset::get_code(request, tags::FILM_SIZE_ID)? {
            Some(size) => {
                dataset::check_allowed(tags::FILM_SIZE_ID, &size, &printer.film_size_ids)?;
                size
            }
            None => printer.default_film_size_id.clone(),
        };
        let requested_resolution_id = match dataset::get_code(request, tags::REQUESTED_RESOLUTION_ID)? {
            Some(resolution) => {
                dataset::check_allowed(
                    tags::REQUESTED_RESOLUTION_ID,
                    &resolution,
                    &printer.resolution_ids,
                )?;
                resolution
            }
            None => printer.default_resolution_id.clone(),
        };

        let count = u16::try_from(layout.image_count()).map_err(|_| {
            PrintError::OutOfResources(format!(
                "{} image boxes exceed the addressable positions",
                layout.image_count()
            ))
        })?;
        let image_boxes = (1..=count)
            .map(|position| ImageBox::placeholder(uids::generate_uid(), position))
            .collect();

        let mut film_box = FilmBox {
            sop_instance_uid,
            film_session_uid: session.sop_instance_uid.clone(),
            image_display_format,
            film_orientation,
            film_size_id,
            magnification_type: printer.default_magnification_type.clone(),
            smoothing_type: None,
            border_density: None,
            empty_image_density: None,
            min_density: None,
            max_density: None,
            trim: None,
            configuration_information: None,
            requested_resolution_id,
            illumination: session.illumination,
            reflected_ambient_light: session.reflected_ambient_light,
            presentation_lut: session.presentation_lut.clone(),
            image_boxes,
        };
        film_box.update(request, ctx)?;

        let known: Vec<Tag> = FILM_BOX_SET_TAGS
            .iter()
            .chain(FILM_BOX_CREATE_TAGS.iter())
            .chain(ctx.lut_tags())
            .copied()
            .collect();
        Ok((film_box, dataset::unknown_attributes(request, &known)))
    }

    /// Apply an N-SET data set, all or nothing
    pub fn apply(&mut self, request: &InMemDicomObject, ctx: RequestContext<'_>) -> PrintResult<Vec<Tag>> {
        let mut updated = self.clone();
        updated.update(request, ctx)?;
        *self = updated;

        let known: Vec<Tag> = FILM_BOX_SET_TAGS
            .iter()
            .chain(ctx.lut_tags())
            .copied()
            .collect();
        Ok(dataset::unknown_attributes(request, &known))
    }

    fn update(&mut self, request: &InMemDicomObject, ctx: RequestContext<'_>) -> PrintResult<()> {
        let printer = ctx.printer;

        if let Some(magnification) = dataset::get_code(request, tags::MAGNIFICATION_TYPE)? {
            dataset::check_allowed(tags::MAGNIFICATION_TYPE, &magnification, &printer.magnification_types)?;
            self.magnification_type = magnification;
        }
        if let Some(smoothing) = dataset::get_code(request, tags::SMOOTHING_TYPE)? {
            dataset::check_allowed(tags::SMOOTHING_TYPE, &smoothing, &printer.smoothing_types)?;
            self.smoothing_type = Some(smoothing);
        }
        if let Some(density) = dataset::get_code(request, tags::BORDER_DENSITY)? {
            check_density(tags::BORDER_DENSITY, &density)?;
            self.border_density = Some(density);
        }
        if let Some(density) = dataset::get_code(request, tags::EMPTY_IMAGE_DENSITY)? {
            check_density(tags::EMPTY_IMAGE_DENSITY, &density)?;
            self.empty_image_density = Some(density);
        }
        if let Some(min) = dataset::get_int::<u16>(request, tags::MIN_DENSITY)? {
            self.min_density = Some(min);
        }
        if let Some(max) = dataset::get_int::<u16>(request, tags::MAX_DENSITY)? {
            self.max_density = Some(max);
        }
        if let (Some(min), Some(max)) = (self.min_density, self.max_density) {
            if min > max {
                return Err(PrintError::invalid(
                    tags::MAX_DENSITY,
                    format!("max density {} below min density {}", max, min),
                ));
            }
        }
        if let Some(trim) = dataset::get_code(request, tags::TRIM)? {
            dataset::check_enum(tags::TRIM, &trim, &TRIM_VALUES)?;
            if trim == "YES" && !printer.supports_trim {
                return Err(PrintError::invalid(tags::TRIM, "printer does not trim"));
            }
            self.trim = Some(trim);
        }
        if let Some(info) = dataset::get_str(request, tags::CONFIGURATION_INFORMATION)? {
            self.configuration_information = Some(info);
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
        Ok(())
    }

    /// Take over the session values a film session N-SET changed
    pub fn inherit(&mut self, session: &FilmSession, request: &InMemDicomObject) {
        if request.element(tags::ILLUMINATION).is_ok() {
            self.illumination = session.illumination;
        }
        if request.element(tags::REFLECTED_AMBIENT_LIGHT).is_ok() {
            self.reflected_ambient_light = session.reflected_ambient_light;
        }
        if request
            .element(tags::REFERENCED_PRESENTATION_LUT_SEQUENCE)
            .is_ok()
        {
            self.presentation_lut = session.presentation_lut.clone();
        }
    }

    pub fn image_box_mut(&mut self, uid: &str) -> Option<&mut ImageBox> {
        self.image_boxes
            .iter_mut()
            .find(|image_box| image_box.sop_instance_uid == uid)
    }

    /// Whether at least one image box holds an image
    pub fn has_images(&self) -> bool {
        self.image_boxes.iter().any(ImageBox::is_populated)
    }

    /// LUT UIDs referenced by the film box and its image boxes
    pub fn lut_references(&self) -> impl Iterator<Item = &str> + '_ {
        self.presentation_lut
            .as_deref()
            .into_iter()
            .chain(
                self.image_boxes
                    .iter()
                    .filter_map(|image_box| image_box.presentation_lut.as_deref()),
            )
    }

    /// Response data set, listing the allocated image boxes
    pub fn to_dataset(&self, lut_negotiated: bool) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        dataset::put_str(&mut obj, tags::IMAGE_DISPLAY_FORMAT, VR::ST, &self.image_display_format);
        dataset::put_str(&mut obj, tags::FILM_ORIENTATION, VR::CS, &self.film_orientation);
        dataset::put_str(&mut obj, tags::FILM_SIZE_ID, VR::CS, &self.film_size_id);
        dataset::put_str(&mut obj, tags::MAGNIFICATION_TYPE, VR::CS, &self.magnification_type);
        dataset::put_opt_str(&mut obj, tags::SMOOTHING_TYPE, VR::CS, self.smoothing_type.as_deref());
        dataset::put_opt_str(&mut obj, tags::BORDER_DENSITY, VR::CS, self.border_density.as_deref());
        dataset::put_opt_str(
            &mut obj,
            tags::EMPTY_IMAGE_DENSITY,
            VR::CS,
            self.empty_image_density.as_deref(),
        );
        if let Some(min) = self.min_density {
            dataset::put_u16(&mut obj, tags::MIN_DENSITY, min);
        }
        if let Some(max) = self.max_density {
            dataset::put_u16(&mut obj, tags::MAX_DENSITY, max);
        }
        dataset::put_opt_str(&mut obj, tags::TRIM, VR::CS, self.trim.as_deref());
        dataset::put_opt_str(
            &mut obj,
            tags::CONFIGURATION_INFORMATION,
            VR::ST,
            self.configuration_information.as_deref(),
        );
        dataset::put_str(
            &mut obj,
            tags::REQUESTED_RESOLUTION_ID,
            VR::CS,
            &self.requested_resolution_id,
        );
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
        dataset::put_reference(
            &mut obj,
            tags::REFERENCED_FILM_SESSION_SEQUENCE,
            uids::BASIC_FILM_SESSION,
            &self.film_session_uid,
        );
        dataset::put_sequence(
            &mut obj,
            tags::REFERENCED_IMAGE_BOX_SEQUENCE,
            self.image_boxes
                .iter()
                .map(|image_box| {
                    dataset::reference_item(uids::BASIC_GRAYSCALE_IMAGE_BOX, &image_box.sop_instance_uid)
                })
                .collect(),
        );
        obj
    }
}

/// BLACK, WHITE or hundredths of optical density
fn check_density(tag: Tag, value: &str) -> PrintResult<()> {
    if value == "BLACK" || value == "WHITE" || value.parse::<u16>().is_ok() {
        Ok(())
    } else {
        Err(PrintError::invalid(tag, format!("'{}' is not a density", value)))
    }
}

/// Hardcopy Grayscale Image produced from one populated image box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardcopyImage {
    pub sop_instance_uid: String,
    pub sop_class_uid: String,
    pub image_box_uid: String,
    pub image_position: u16,
    pub polarity: String,
    /// LUT applied to the image, its own or the film box's
    pub presentation_lut: Option<String>,
    pub image: GrayscaleImage,
}

/// Persisted form of an actioned film box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPrint {
    pub sop_instance_uid: String,
    pub sop_class_uid: String,
    pub created: DateTime<Utc>,
    pub calling_ae_title: String,
    pub printer_name: String,
    pub film_session: FilmSession,
    /// Image boxes without pixel data, see `hardcopy_images`
    pub film_box: FilmBox,
    pub presentation_luts: Vec<PoolEntry>,
    pub hardcopy_images: Vec<HardcopyImage>,
}

impl StoredPrint {
    /// Snapshot `film_box` for storage
    ///
    /// Fails when a referenced Presentation LUT is no longer in the pool.
    pub fn build(
        session: &FilmSession,
        film_box: &FilmBox,
        luts: &PresentationLutPool,
        calling_ae_title: &str,
        printer_name: &str,
    ) -> PrintResult<Self> {
        let mut referenced: Vec<&str> = session
            .presentation_lut
            .as_deref()
            .into_iter()
            .chain(film_box.lut_references())
            .collect();
        referenced.sort_unstable();
        referenced.dedup();

        let presentation_luts = referenced
            .into_iter()
            .map(|uid| {
                luts.get(uid)
                    .map(|lut| PoolEntry {
                        uid: uid.to_string(),
                        lut: lut.clone(),
                    })
                    .ok_or_else(|| {
                        PrintError::Processing(format!("Presentation LUT {} was deleted", uid))
                    })
            })
            .collect::<PrintResult<Vec<_>>>()?;

        let hardcopy_images = film_box
            .image_boxes
            .iter()
            .filter_map(|image_box| {
                image_box.image.as_ref().map(|image| HardcopyImage {
                    sop_instance_uid: uids::generate_uid(),
                    sop_class_uid: uids::HARDCOPY_GRAYSCALE_IMAGE_STORAGE.to_string(),
                    image_box_uid: image_box.sop_instance_uid.clone(),
                    image_position: image_box.image_position,
                    polarity: image_box.polarity.clone(),
                    presentation_lut: image_box
                        .presentation_lut
                        .clone()
                        .or_else(|| film_box.presentation_lut.clone()),
                    image: image.clone(),
                })
            })
            .collect();

        let mut film_box = film_box.clone();
        for image_box in &mut film_box.image_boxes {
            image_box.image = None;
        }

        Ok(StoredPrint {
            sop_instance_uid: uids::generate_uid(),
            sop_class_uid: uids::STORED_PRINT_STORAGE.to_string(),
            created: Utc::now(),
            calling_ae_title: calling_ae_title.to_string(),
            printer_name: printer_name.to_string(),
            film_session: session.clone(),
            film_box,
            presentation_luts,
            hardcopy_images,
        })
    }

    #[cfg(test)]
    pub(crate) fn sample(calling_ae_title: &str) -> Self {
        let printer = PrinterConfig::default();
        let luts = PresentationLutPool::new();
        let ctx = RequestContext {
            printer: &printer,
            luts: &luts,
            lut_negotiated: false,
        };
        let (session, _) = FilmSession::create(
            uids::generate_uid(),
            &InMemDicomObject::new_empty(),
            ctx,
        )
        .unwrap();
        let mut film_box = FilmBox::create(
            uids::generate_uid(),
            &tests::film_box_request(&session, "STANDARD\\1,1"),
            ctx,
            &session,
        )
        .unwrap()
        .0;
        film_box.image_boxes[0].image = Some(GrayscaleImage {
            rows: 2,
            columns: 2,
            bits_allocated: 8,
            bits_stored: 8,
            high_bit: 7,
            photometric_interpretation: "MONOCHROME2".to_string(),
            pixel_aspect_ratio: None,
            pixel_data: vec![0, 64, 128, 255],
        });
        Self::build(&session, &film_box, &luts, calling_ae_title, "PRINTER").unwrap()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::print::presentation_lut::PresentationLut;

    pub(crate) fn film_box_request(session: &FilmSession, format: &str) -> InMemDicomObject {
        let mut request = InMemDicomObject::new_empty();
        dataset::put_str(&mut request, tags::IMAGE_DISPLAY_FORMAT, VR::ST, format);
        dataset::put_reference(
            &mut request,
            tags::REFERENCED_FILM_SESSION_SEQUENCE,
            uids::BASIC_FILM_SESSION,
            &session.sop_instance_uid,
        );
        request
    }

    fn session(printer: &PrinterConfig, luts: &PresentationLutPool) -> FilmSession {
        FilmSession::create(
            "1.2.3".into(),
            &InMemDicomObject::new_empty(),
            RequestContext {
                printer,
                luts,
                lut_negotiated: true,
            },
        )
        .unwrap()
        .0
    }

    fn ctx<'a>(printer: &'a PrinterConfig, luts: &'a PresentationLutPool) -> RequestContext<'a> {
        RequestContext {
            printer,
            luts,
            lut_negotiated: true,
        }
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(
            DisplayFormat::parse("STANDARD\\2,3").unwrap(),
            DisplayFormat::Standard { columns: 2, rows: 3 }
        );
        assert_eq!(DisplayFormat::parse("STANDARD\\2,3").unwrap().image_count(), 6);
        assert_eq!(DisplayFormat::parse("ROW\\2,1,3").unwrap().image_count(), 6);
        assert_eq!(DisplayFormat::parse("col\\4").unwrap().image_count(), 4);
        assert!(DisplayFormat::parse("STANDARD\\2").is_err());
        assert!(DisplayFormat::parse("SLIDE").is_err());
        assert!(DisplayFormat::parse("STANDARD\\0,1").is_err());
    }

    #[test]
    fn test_capacity() {
        let printer = PrinterConfig {
            max_columns: 2,
            max_rows: 2,
            ..PrinterConfig::default()
        };
        assert!(DisplayFormat::parse("STANDARD\\2,2").unwrap().check_capacity(&printer).is_ok());
        assert!(matches!(
            DisplayFormat::parse("STANDARD\\3,1").unwrap().check_capacity(&printer),
            Err(PrintError::OutOfResources(_))
        ));
        assert!(DisplayFormat::parse("ROW\\1,1,1").unwrap().check_capacity(&printer).is_err());
    }

    #[test]
    fn test_capacity_with_huge_layouts() {
        let printer = PrinterConfig::default();
        for format in ["STANDARD\\70000,70000", "ROW\\4294967295,1", "COL\\4294967295,4294967295"] {
            let layout = DisplayFormat::parse(format).unwrap();
            match layout.check_capacity(&printer) {
                Err(PrintError::OutOfResources(message)) => {
                    assert!(message.contains(&layout.image_count().to_string()), "{}", message)
                }
                other => panic!("{}: expected out of resources, got {:?}", format, other),
            }
        }
        assert_eq!(
            DisplayFormat::parse("STANDARD\\70000,70000").unwrap().image_count(),
            4_900_000_000
        );
        assert_eq!(
            DisplayFormat::parse("ROW\\4294967295,1").unwrap().image_count(),
            4_294_967_296
        );
    }

    #[test]
    fn test_create_allocates_image_boxes() {
        let printer = PrinterConfig::default();
        let luts = PresentationLutPool::new();
        let session = session(&printer, &luts);

        let (film_box, ignored) = FilmBox::create(
            "1.2.3.4".into(),
            &film_box_request(&session, "STANDARD\\2,2"),
            ctx(&printer, &luts),
            &session,
        )
        .unwrap();
        assert!(ignored.is_empty());
        assert_eq!(film_box.image_boxes.len(), 4);
        assert_eq!(
            film_box
                .image_boxes
                .iter()
                .map(|b| b.image_position)
                .collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(film_box.film_orientation, "PORTRAIT");
        assert_eq!(film_box.film_size_id, "8INX10IN");
        assert_eq!(film_box.illumination, session.illumination);
        assert!(!film_box.has_images());

        let response = film_box.to_dataset(true);
        assert_eq!(dataset::get_items(&response, tags::REFERENCED_IMAGE_BOX_SEQUENCE).len(), 4);
    }

    #[test]
    fn test_create_checks_session_reference() {
        let printer = PrinterConfig::default();
        let luts = PresentationLutPool::new();
        let session = session(&printer, &luts);

        let mut request = film_box_request(&session, "STANDARD\\1,1");
        dataset::put_reference(
            &mut request,
            tags::REFERENCED_FILM_SESSION_SEQUENCE,
            uids::BASIC_FILM_SESSION,
            "9.9.9",
        );
        assert!(matches!(
            FilmBox::create("1.2.3.4".into(), &request, ctx(&printer, &luts), &session),
            Err(PrintError::InvalidValue { .. })
        ));

        let mut request = InMemDicomObject::new_empty();
        dataset::put_str(&mut request, tags::IMAGE_DISPLAY_FORMAT, VR::ST, "STANDARD\\1,1");
        assert!(matches!(
            FilmBox::create("1.2.3.4".into(), &request, ctx(&printer, &luts), &session),
            Err(PrintError::MissingAttribute(_))
        ));
    }

    #[test]
    fn test_set_rejects_create_only_attributes() {
        let printer = PrinterConfig {
            supports_trim: false,
            ..PrinterConfig::default()
        };
        let luts = PresentationLutPool::new();
        let session = session(&printer, &luts);
        let (mut film_box, _) = FilmBox::create(
            "1.2.3.4".into(),
            &film_box_request(&session, "STANDARD\\1,1"),
            ctx(&printer, &luts),
            &session,
        )
        .unwrap();

        let mut request = InMemDicomObject::new_empty();
        dataset::put_str(&mut request, tags::FILM_ORIENTATION, VR::CS, "LANDSCAPE");
        dataset::put_str(&mut request, tags::BORDER_DENSITY, VR::CS, "WHITE");
        let ignored = film_box.apply(&request, ctx(&printer, &luts)).unwrap();
        assert_eq!(ignored, vec![tags::FILM_ORIENTATION]);
        assert_eq!(film_box.film_orientation, "PORTRAIT");
        assert_eq!(film_box.border_density.as_deref(), Some("WHITE"));

        let mut trim = InMemDicomObject::new_empty();
        dataset::put_str(&mut trim, tags::TRIM, VR::CS, "YES");
        assert!(film_box.apply(&trim, ctx(&printer, &luts)).is_err());
        assert_eq!(film_box.trim, None);
    }

    #[test]
    fn test_inherit_session_changes() {
        let printer = PrinterConfig::default();
        let mut luts = PresentationLutPool::new();
        let mut session = session(&printer, &luts);
        let (mut film_box, _) = FilmBox::create(
            "1.2.3.4".into(),
            &film_box_request(&session, "STANDARD\\1,1"),
            ctx(&printer, &luts),
            &session,
        )
        .unwrap();
        film_box.reflected_ambient_light = 42;

        let lin_od = luts.insert(PresentationLut::LinOd, false);
        let mut request = InMemDicomObject::new_empty();
        dataset::put_u16(&mut request, tags::ILLUMINATION, 300);
        dataset::put_reference(
            &mut request,
            tags::REFERENCED_PRESENTATION_LUT_SEQUENCE,
            uids::PRESENTATION_LUT,
            &lin_od,
        );
        session.apply(&request, ctx(&printer, &luts)).unwrap();
        film_box.inherit(&session, &request);

        assert_eq!(film_box.illumination, 300);
        assert_eq!(film_box.presentation_lut.as_deref(), Some(lin_od.as_str()));
        // untouched by the request
        assert_eq!(film_box.reflected_ambient_light, 42);
    }

    #[test]
    fn test_stored_print_snapshot() {
        let print = StoredPrint::sample("MODALITY");
        assert_eq!(print.sop_class_uid, uids::STORED_PRINT_STORAGE);
        assert_eq!(print.hardcopy_images.len(), 1);
        assert_eq!(print.hardcopy_images[0].image_position, 1);
        assert!(print.film_box.image_boxes[0].image.is_none());
        assert!(print.presentation_luts.is_empty());
    }

    #[test]
    fn test_stored_print_needs_live_luts() {
        let printer = PrinterConfig::default();
        let mut luts = PresentationLutPool::new();
        let mut session = session(&printer, &luts);
        let uid = luts.insert(PresentationLut::LinOd, false);
        session.presentation_lut = Some(uid.clone());
        let (film_box, _) = FilmBox::create(
            "1.2.3.4".into(),
            &film_box_request(&session, "STANDARD\\1,1"),
            ctx(&printer, &luts),
            &session,
        )
        .unwrap();

        let print = StoredPrint::build(&session, &film_box, &luts, "SCU", "PRINTER").unwrap();
        assert_eq!(print.presentation_luts.len(), 1);

        luts.delete(&uid);
        assert!(matches!(
            StoredPrint::build(&session, &film_box, &luts, "SCU", "PRINTER"),
            Err(PrintError::Processing(_))
        ));
    }
}
