//! Presentation LUT pool
//!
//! The pool is the single owner of every Presentation LUT of a print
//! session. Film sessions, film boxes and image boxes only hold the UID of
//! a pool entry. Insertion deduplicates by content and unreferenced entries
//! are reclaimed by an explicit [`PresentationLutPool::cleanup`] pass before
//! anything is persisted.

use dicom_core::VR;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::print::dataset;
use crate::print::error::{PrintError, PrintResult};
use crate::print::uids;

/// LUT Descriptor (0028,3002)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LutDescriptor {
    /// Number of entries, 0 encodes 65536
    pub entries: u16,
    /// First input value mapped
    pub first_mapped: u16,
    /// Bits per entry
    pub bits: u16,
}

impl LutDescriptor {
    pub fn entry_count(&self) -> usize {
        match self.entries {
            0 => 65_536,
            n => n as usize,
        }
    }
}

/// Presentation LUT content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresentationLut {
    Identity,
    Inverse,
    LinOd,
    Table {
        descriptor: LutDescriptor,
        data: Vec<u16>,
        explanation: Option<String>,
    },
}

/// Compatibility of a LUT with the bit depth of the images it applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LutAlignment {
    /// A named shape, fits any bit depth
    Shape,
    /// 256 entries starting at 0, for 8-bit images
    Table8,
    /// 4096 entries starting at 0, for 12-bit images
    Table12,
    /// A table fitting neither
    Other,
}

impl LutAlignment {
    /// Whether images with `bits_stored` can use a LUT of this alignment
    pub fn matches_bits(&self, bits_stored: u16) -> bool {
        match self {
            LutAlignment::Shape => true,
            LutAlignment::Table8 => bits_stored == 8,
            LutAlignment::Table12 => bits_stored == 12,
            LutAlignment::Other => false,
        }
    }
}

impl PresentationLut {
    /// Parse the Presentation LUT Shape or Presentation LUT Sequence of an
    /// N-CREATE data set
    pub fn from_dataset(obj: &InMemDicomObject) -> PrintResult<Self> {
        let shape = dataset::get_code(obj, tags::PRESENTATION_LUT_SHAPE)?;
        let table = dataset::get_single_item(obj, tags::PRESENTATION_LUT_SEQUENCE)?;

        match (shape, table) {
            (Some(_), Some(_)) => Err(PrintError::invalid(
                tags::PRESENTATION_LUT_SHAPE,
                "both shape and table given",
            )),
            (None, None) => Err(PrintError::MissingAttribute(tags::PRESENTATION_LUT_SHAPE)),
            (Some(shape), None) => match shape.as_str() {
                "IDENTITY" => Ok(PresentationLut::Identity),
                "INVERSE" => Ok(PresentationLut::Inverse),
                "LIN OD" => Ok(PresentationLut::LinOd),
                other => Err(PrintError::invalid(
                    tags::PRESENTATION_LUT_SHAPE,
                    format!("unknown shape '{}'", other),
                )),
            },
            (None, Some(item)) => Self::table_from_item(item),
        }
    }

    fn table_from_item(item: &InMemDicomObject) -> PrintResult<Self> {
        let values = dataset::get_u16_list(item, tags::LUT_DESCRIPTOR)?
            .ok_or(PrintError::MissingAttribute(tags::LUT_DESCRIPTOR))?;
        let descriptor = match values.as_slice() {
            [entries, first_mapped, bits] => LutDescriptor {
                entries: *entries,
                first_mapped: *first_mapped,
                bits: *bits,
            },
            _ => {
                return Err(PrintError::invalid(
                    tags::LUT_DESCRIPTOR,
                    format!("expected 3 values, found {}", values.len()),
                ))
            }
        };
        if !(8..=16).contains(&descriptor.bits) {
            return Err(PrintError::invalid(
                tags::LUT_DESCRIPTOR,
                format!("{} bits per entry", descriptor.bits),
            ));
        }

        let data = dataset::get_u16_list(item, tags::LUT_DATA)?
            .ok_or(PrintError::MissingAttribute(tags::LUT_DATA))?;
        if data.len() != descriptor.entry_count() {
            return Err(PrintError::invalid(
                tags::LUT_DATA,
                format!(
                    "{} entries, descriptor announces {}",
                    data.len(),
                    descriptor.entry_count()
                ),
            ));
        }

        Ok(PresentationLut::Table {
            descriptor,
            data,
            explanation: dataset::get_str(item, tags::LUT_EXPLANATION)?,
        })
    }

    /// Encode as Presentation LUT Shape or Presentation LUT Sequence
    pub fn to_dataset(&self) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        match self {
            PresentationLut::Identity => {
                dataset::put_str(&mut obj, tags::PRESENTATION_LUT_SHAPE, VR::CS, "IDENTITY")
            }
            PresentationLut::Inverse => {
                dataset::put_str(&mut obj, tags::PRESENTATION_LUT_SHAPE, VR::CS, "INVERSE")
            }
            PresentationLut::LinOd => {
                dataset::put_str(&mut obj, tags::PRESENTATION_LUT_SHAPE, VR::CS, "LIN OD")
            }
            PresentationLut::Table {
                descriptor,
                data,
                explanation,
            } => {
                let mut item = InMemDicomObject::new_empty();
                item.put(dicom_core::DataElement::new(
                    tags::LUT_DESCRIPTOR,
                    VR::US,
                    dicom_core::PrimitiveValue::U16(
                        [descriptor.entries, descriptor.first_mapped, descriptor.bits]
                            .into_iter()
                            .collect(),
                    ),
                ));
                dataset::put_opt_str(&mut item, tags::LUT_EXPLANATION, VR::LO, explanation.as_deref());
                item.put(dicom_core::DataElement::new(
                    tags::LUT_DATA,
                    VR::US,
                    dicom_core::PrimitiveValue::U16(data.iter().copied().collect()),
                ));
                dataset::put_sequence(&mut obj, tags::PRESENTATION_LUT_SEQUENCE, vec![item]);
            }
        }
        obj
    }

    /// Alignment class of this LUT
    pub fn alignment(&self) -> LutAlignment {
        match self {
            PresentationLut::Table { descriptor, .. } => {
                match (descriptor.entry_count(), descriptor.first_mapped) {
                    (256, 0) => LutAlignment::Table8,
                    (4096, 0) => LutAlignment::Table12,
                    _ => LutAlignment::Other,
                }
            }
            _ => LutAlignment::Shape,
        }
    }

    /// Canonical form used for storage and comparison
    ///
    /// INVERSE folds to IDENTITY since inversion is applied to the bitmap
    /// before printing. An inversion request mirrors the table.
    fn normalized(self, inverse_requested: bool) -> Self {
        match self {
            PresentationLut::Inverse => PresentationLut::Identity,
            PresentationLut::Table {
                descriptor,
                mut data,
                explanation,
            } => {
                if inverse_requested {
                    data.reverse();
                }
                PresentationLut::Table {
                    descriptor,
                    data,
                    explanation,
                }
            }
            other => other,
        }
    }

    /// Content equality, ignoring the explanation
    fn same_content(&self, other: &Self) -> bool {
        match (self, other) {
            (
                PresentationLut::Table {
                    descriptor: d1,
                    data: a,
                    ..
                },
                PresentationLut::Table {
                    descriptor: d2,
                    data: b,
                    ..
                },
            ) => d1 == d2 && a == b,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    pub uid: String,
    pub lut: PresentationLut,
}

/// Deduplicated arena of the Presentation LUTs of one session
#[derive(Debug, Default, Clone)]
pub struct PresentationLutPool {
    entries: Vec<PoolEntry>,
}

impl PresentationLutPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `candidate`, returning the UID of an existing entry with the
    /// same content or of the new entry
    pub fn insert(&mut self, candidate: PresentationLut, inverse_requested: bool) -> String {
        let lut = candidate.normalized(inverse_requested);
        if let Some(existing) = self.entries.iter().find(|e| e.lut.same_content(&lut)) {
            debug!("Presentation LUT matches existing entry {}", existing.uid);
            return existing.uid.clone();
        }
        let uid = uids::generate_uid();
        debug!("New Presentation LUT {} ({:?})", uid, lut.alignment());
        self.entries.push(PoolEntry {
            uid: uid.clone(),
            lut,
        });
        uid
    }

    pub fn get(&self, uid: &str) -> Option<&PresentationLut> {
        self.entries.iter().find(|e| e.uid == uid).map(|e| &e.lut)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.get(uid).is_some()
    }

    /// Remove the entry, whether or not something still references it
    pub fn delete(&mut self, uid: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.uid != uid);
        self.entries.len() != before
    }

    /// Drop every entry not in `referenced`, returning the removed UIDs
    pub fn cleanup<'a, I>(&mut self, referenced: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: Vec<&str> = referenced.into_iter().collect();
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            let live = keep.contains(&e.uid.as_str());
            if !live {
                removed.push(e.uid.clone());
            }
            live
        });
        if !removed.is_empty() {
            debug!("Removed {} unreferenced Presentation LUTs", removed.len());
        }
        removed
    }

    /// Pool entry named by the Referenced Presentation LUT Sequence of `obj`
    pub fn resolve_reference(&self, obj: &InMemDicomObject) -> PrintResult<Option<String>> {
        let tag = tags::REFERENCED_PRESENTATION_LUT_SEQUENCE;
        let (class, uid) = match dataset::get_reference(obj, tag)? {
            Some(reference) => reference,
            None => return Ok(None),
        };
        if class != uids::PRESENTATION_LUT {
            return Err(PrintError::invalid(
                tag,
                format!("{} is not the Presentation LUT SOP class", class),
            ));
        }
        if !self.contains(&uid) {
            return Err(PrintError::invalid(
                tag,
                format!("unknown Presentation LUT {}", uid),
            ));
        }
        Ok(Some(uid))
    }

    /// Alignment of the entry with this UID
    pub fn classify_alignment(&self, uid: &str) -> Option<LutAlignment> {
        self.get(uid).map(PresentationLut::alignment)
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
