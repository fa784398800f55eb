use dicom_core::value::PrimitiveValue;
use dicom_core::{DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use serde::{Deserialize, Serialize};

use crate::config::PrinterConfig;
use crate::print::dataset;
use crate::print::error::{PrintError, PrintResult};
use crate::print::RequestContext;

const POLARITIES: [&str; 2] = ["NORMAL", "REVERSE"];
const DECIMATE_CROP_BEHAVIORS: [&str; 3] = ["CENTER", "DECIMATE", "FAIL"];
const PHOTOMETRIC_INTERPRETATIONS: [&str; 2] = ["MONOCHROME1", "MONOCHROME2"];

/// Pixel content of a Basic Grayscale Image Sequence item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrayscaleImage {
    pub rows: u16,
    pub columns: u16,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub high_bit: u16,
    pub photometric_interpretation: String,
    pub pixel_aspect_ratio: Option<String>,
    #[serde(with = "crate::storage::base64_bytes")]
    pub pixel_data: Vec<u8>,
}

impl GrayscaleImage {
    /// Parse and check an image item against the printer's capabilities
    pub fn from_item(item: &InMemDicomObject, printer: &PrinterConfig) -> PrintResult<Self> {
        let samples: u16 = dataset::require_int(item, tags::SAMPLES_PER_PIXEL)?;
        if samples != 1 {
            return Err(PrintError::invalid(
                tags::SAMPLES_PER_PIXEL,
                format!("{} samples per pixel", samples),
            ));
        }
        let photometric = dataset::get_code(item, tags::PHOTOMETRIC_INTERPRETATION)?
            .ok_or(PrintError::MissingAttribute(tags::PHOTOMETRIC_INTERPRETATION))?;
        dataset::check_enum(
            tags::PHOTOMETRIC_INTERPRETATION,
            &photometric,
            &PHOTOMETRIC_INTERPRETATIONS,
        )?;

        let rows: u16 = dataset::require_int(item, tags::ROWS)?;
        let columns: u16 = dataset::require_int(item, tags::COLUMNS)?;
        if rows == 0 || columns == 0 {
            return Err(PrintError::invalid(tags::ROWS, "empty image matrix"));
        }

        let bits_allocated: u16 = dataset::require_int(item, tags::BITS_ALLOCATED)?;
        let bits_stored: u16 = dataset::require_int(item, tags::BITS_STORED)?;
        let high_bit: u16 = dataset::require_int(item, tags::HIGH_BIT)?;
        match (bits_allocated, bits_stored) {
            (8, 8) => {}
            (16, 12) if printer.supports_12bit => {}
            (16, 12) => {
                return Err(PrintError::invalid(
                    tags::BITS_STORED,
                    "12-bit images not supported by this printer",
                ))
            }
            _ => {
                return Err(PrintError::invalid(
                    tags::BITS_STORED,
                    format!("{} bits stored in {} bits allocated", bits_stored, bits_allocated),
                ))
            }
        }
        if high_bit != bits_stored - 1 {
            return Err(PrintError::invalid(tags::HIGH_BIT, format!("high bit {}", high_bit)));
        }
        if let Some(representation) = dataset::get_int::<u16>(item, tags::PIXEL_REPRESENTATION)? {
            if representation != 0 {
                return Err(PrintError::invalid(
                    tags::PIXEL_REPRESENTATION,
                    "signed pixel data",
                ));
            }
        }

        let mut pixel_data = dataset::get_bytes(item, tags::PIXEL_DATA)?
            .ok_or(PrintError::MissingAttribute(tags::PIXEL_DATA))?;
        let expected = rows as usize * columns as usize * (bits_allocated as usize / 8);
        if pixel_data.len() < expected {
            return Err(PrintError::invalid(
                tags::PIXEL_DATA,
                format!("{} bytes of pixel data, expected {}", pixel_data.len(), expected),
            ));
        }
        // drop padding
        pixel_data.truncate(expected);

        Ok(GrayscaleImage {
            rows,
            columns,
            bits_allocated,
            bits_stored,
            high_bit,
            photometric_interpretation: photometric,
            pixel_aspect_ratio: dataset::get_str(item, tags::PIXEL_ASPECT_RATIO)?,
            pixel_data,
        })
    }

    pub fn to_item(&self) -> InMemDicomObject {
        let mut item = InMemDicomObject::new_empty();
        dataset::put_u16(&mut item, tags::SAMPLES_PER_PIXEL, 1);
        dataset::put_str(
            &mut item,
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            &self.photometric_interpretation,
        );
        dataset::put_u16(&mut item, tags::ROWS, self.rows);
        dataset::put_u16(&mut item, tags::COLUMNS, self.columns);
        dataset::put_opt_str(&mut item, tags::PIXEL_ASPECT_RATIO, VR::IS, self.pixel_aspect_ratio.as_deref());
        dataset::put_u16(&mut item, tags::BITS_ALLOCATED, self.bits_allocated);
        dataset::put_u16(&mut item, tags::BITS_STORED, self.bits_stored);
        dataset::put_u16(&mut item, tags::HIGH_BIT, self.high_bit);
        dataset::put_u16(&mut item, tags::PIXEL_REPRESENTATION, 0);
        item.put(DataElement::new(
            tags::PIXEL_DATA,
            if self.bits_allocated > 8 { VR::OW } else { VR::OB },
            PrimitiveValue::U8(self.pixel_data.iter().copied().collect()),
        ));
        item
    }
}

/// Basic Grayscale Image Box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBox {
    pub sop_instance_uid: String,
    /// 1-based position on the film
    pub image_position: u16,
    pub polarity: String,
    pub magnification_type: Option<String>,
    pub smoothing_type: Option<String>,
    pub requested_decimate_crop_behavior: Option<String>,
    pub requested_image_size: Option<String>,
    /// Pool entry UID
    pub presentation_lut: Option<String>,
    pub image: Option<GrayscaleImage>,
}

impl ImageBox {
    /// Empty placeholder created with its film box
    pub fn placeholder(sop_instance_uid: String, image_position: u16) -> Self {
        Self {
            sop_instance_uid,
            image_position,
            polarity: "NORMAL".to_string(),
            magnification_type: None,
            smoothing_type: None,
            requested_decimate_crop_behavior: None,
            requested_image_size: None,
            presentation_lut: None,
            image: None,
        }
    }

    pub fn is_populated(&self) -> bool {
        self.image.is_some()
    }

    fn known_tags(ctx: &RequestContext<'_>) -> Vec<Tag> {
        let printer = ctx.printer;
        let mut known = vec![
            tags::IMAGE_BOX_POSITION,
            tags::POLARITY,
            tags::MAGNIFICATION_TYPE,
            tags::SMOOTHING_TYPE,
            tags::BASIC_GRAYSCALE_IMAGE_SEQUENCE,
        ];
        if printer.supports_decimate_crop {
            known.push(tags::REQUESTED_DECIMATE_CROP_BEHAVIOR);
        }
        if printer.supports_requested_image_size {
            known.push(tags::REQUESTED_IMAGE_SIZE);
        }
        if printer.image_box_presentation_lut && ctx.lut_negotiated {
            known.push(tags::REFERENCED_PRESENTATION_LUT_SEQUENCE);
        }
        known
    }

    /// Apply an N-SET data set, all or nothing
    ///
    /// `film_box_lut` is the LUT the image inherits when it names none.
    pub fn apply(
        &mut self,
        request: &InMemDicomObject,
        ctx: RequestContext<'_>,
        film_box_lut: Option<&str>,
    ) -> PrintResult<Vec<Tag>> {
        let printer = ctx.printer;
        let mut updated = self.clone();

        if let Some(position) = dataset::get_int::<u16>(request, tags::IMAGE_BOX_POSITION)? {
            if position != self.image_position {
                return Err(PrintError::invalid(
                    tags::IMAGE_BOX_POSITION,
                    format!("image box is at position {}, not {}", self.image_position, position),
                ));
            }
        }
        if let Some(polarity) = dataset::get_code(request, tags::POLARITY)? {
            dataset::check_enum(tags::POLARITY, &polarity, &POLARITIES)?;
            updated.polarity = polarity;
        }
        if let Some(magnification) = dataset::get_code(request, tags::MAGNIFICATION_TYPE)? {
            dataset::check_allowed(tags::MAGNIFICATION_TYPE, &magnification, &printer.magnification_types)?;
            updated.magnification_type = Some(magnification);
        }
        if let Some(smoothing) = dataset::get_code(request, tags::SMOOTHING_TYPE)? {
            dataset::check_allowed(tags::SMOOTHING_TYPE, &smoothing, &printer.smoothing_types)?;
            updated.smoothing_type = Some(smoothing);
        }
        if printer.supports_decimate_crop {
            if let Some(behavior) = dataset::get_code(request, tags::REQUESTED_DECIMATE_CROP_BEHAVIOR)? {
                dataset::check_enum(
                    tags::REQUESTED_DECIMATE_CROP_BEHAVIOR,
                    &behavior,
                    &DECIMATE_CROP_BEHAVIORS,
                )?;
                updated.requested_decimate_crop_behavior = Some(behavior);
            }
        }
        if printer.supports_requested_image_size {
            if let Some(size) = dataset::get_str(request, tags::REQUESTED_IMAGE_SIZE)? {
                match size.parse::<f64>() {
                    Ok(mm) if mm > 0.0 => updated.requested_image_size = Some(size),
                    _ => {
                        return Err(PrintError::invalid(
                            tags::REQUESTED_IMAGE_SIZE,
                            format!("'{}' is not a positive size", size),
                        ))
                    }
                }
            }
        }
        if printer.image_box_presentation_lut {
            if let Some(uid) = ctx.lut_reference(request)? {
                updated.presentation_lut = Some(uid);
            }
        }
        if let Some(item) = dataset::get_single_item(request, tags::BASIC_GRAYSCALE_IMAGE_SEQUENCE)? {
            updated.image = Some(GrayscaleImage::from_item(item, printer)?);
        }

        if printer.require_lut_alignment {
            updated.check_alignment(ctx, film_box_lut)?;
        }

        let ignored = dataset::unknown_attributes(request, &Self::known_tags(&ctx));
        *self = updated;
        Ok(ignored)
    }

    /// The effective LUT must fit the bit depth of the image
    fn check_alignment(&self, ctx: RequestContext<'_>, film_box_lut: Option<&str>) -> PrintResult<()> {
        let image = match &self.image {
            Some(image) => image,
            None => return Ok(()),
        };
        let uid = match self.presentation_lut.as_deref().or(film_box_lut) {
            Some(uid) => uid,
            None => return Ok(()),
        };
        match ctx.luts.classify_alignment(uid) {
            Some(alignment) if !alignment.matches_bits(image.bits_stored) => Err(PrintError::invalid(
                tags::REFERENCED_PRESENTATION_LUT_SEQUENCE,
                format!(
                    "Presentation LUT {} ({:?}) does not fit {}-bit image",
                    uid, alignment, image.bits_stored
                ),
            )),
            _ => Ok(()),
        }
    }
}
