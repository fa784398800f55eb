//! Attribute access helpers for print data sets

use std::str::FromStr;

use dicom_core::value::{DataSetSequence, PrimitiveValue, Value};
use dicom_core::{DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;

use crate::print::error::{PrintError, PrintResult};

/// Trimmed string value, `None` when absent or empty
pub fn get_str(obj: &InMemDicomObject, tag: Tag) -> PrintResult<Option<String>> {
    match obj.element(tag) {
        Ok(elem) => {
            let value = elem
                .to_str()
                .map_err(|e| PrintError::invalid(tag, e.to_string()))?;
            let value = value.trim_matches(|c: char| c == ' ' || c == '\0');
            Ok(if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            })
        }
        Err(_) => Ok(None),
    }
}

/// Upper-cased code string value
pub fn get_code(obj: &InMemDicomObject, tag: Tag) -> PrintResult<Option<String>> {
    Ok(get_str(obj, tag)?.map(|v| v.to_ascii_uppercase()))
}

/// Integer value from a binary (US) or text (IS) element
pub fn get_int<T>(obj: &InMemDicomObject, tag: Tag) -> PrintResult<Option<T>>
where
    T: FromStr + TryFrom<i64>,
{
    let text = match get_str(obj, tag)? {
        Some(text) => text,
        None => return Ok(None),
    };
    let value: i64 = text
        .parse()
        .map_err(|_| PrintError::invalid(tag, format!("'{}' is not an integer", text)))?;
    T::try_from(value)
        .map(Some)
        .map_err(|_| PrintError::invalid(tag, format!("{} out of range", value)))
}

/// Integer value of an attribute that must be present
pub fn require_int<T>(obj: &InMemDicomObject, tag: Tag) -> PrintResult<T>
where
    T: FromStr + TryFrom<i64>,
{
    get_int(obj, tag)?.ok_or(PrintError::MissingAttribute(tag))
}

/// Multi-valued unsigned short
pub fn get_u16_list(obj: &InMemDicomObject, tag: Tag) -> PrintResult<Option<Vec<u16>>> {
    match obj.element(tag) {
        Ok(elem) => match elem.value() {
            Value::Primitive(PrimitiveValue::U16(values)) => Ok(Some(values.to_vec())),
            Value::Primitive(PrimitiveValue::I16(values)) => {
                Ok(Some(values.iter().map(|v| *v as u16).collect()))
            }
            Value::Primitive(PrimitiveValue::U8(bytes)) => Ok(Some(
                bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect(),
            )),
            _ => elem
                .to_multi_int::<u16>()
                .map(Some)
                .map_err(|e| PrintError::invalid(tag, e.to_string())),
        },
        Err(_) => Ok(None),
    }
}

/// Raw bytes of an OB/OW element, little endian
pub fn get_bytes(obj: &InMemDicomObject, tag: Tag) -> PrintResult<Option<Vec<u8>>> {
    match obj.element(tag) {
        Ok(elem) => match elem.value() {
            Value::Primitive(PrimitiveValue::U8(bytes)) => Ok(Some(bytes.to_vec())),
            Value::Primitive(PrimitiveValue::U16(words)) => {
                Ok(Some(words.iter().flat_map(|w| w.to_le_bytes()).collect()))
            }
            _ => Err(PrintError::invalid(tag, "unsupported pixel data encoding")),
        },
        Err(_) => Ok(None),
    }
}

/// Items of a sequence, empty when absent
pub fn get_items(obj: &InMemDicomObject, tag: Tag) -> &[InMemDicomObject] {
    obj.element(tag)
        .ok()
        .and_then(|elem| elem.items())
        .unwrap_or(&[])
}

/// The single item of a sequence that may hold at most one
pub fn get_single_item(obj: &InMemDicomObject, tag: Tag) -> PrintResult<Option<&InMemDicomObject>> {
    match get_items(obj, tag) {
        [] => Ok(None),
        [item] => Ok(Some(item)),
        items => Err(PrintError::invalid(
            tag,
            format!("expected one item, found {}", items.len()),
        )),
    }
}

/// Referenced SOP Class and Instance UIDs of a reference sequence
pub fn get_reference(obj: &InMemDicomObject, tag: Tag) -> PrintResult<Option<(String, String)>> {
    let item = match get_single_item(obj, tag)? {
        Some(item) => item,
        None => return Ok(None),
    };
    let class = get_str(item, tags::REFERENCED_SOP_CLASS_UID)?
        .ok_or_else(|| PrintError::invalid(tag, "reference without SOP class"))?;
    let instance = get_str(item, tags::REFERENCED_SOP_INSTANCE_UID)?
        .ok_or_else(|| PrintError::invalid(tag, "reference without SOP instance"))?;
    Ok(Some((class, instance)))
}

/// Tags present in `obj` that are not in `known`
pub fn unknown_attributes(obj: &InMemDicomObject, known: &[Tag]) -> Vec<Tag> {
    obj.into_iter()
        .map(|elem| elem.header().tag)
        .filter(|tag| tag.element() != 0x0000 && !known.contains(tag))
        .collect()
}

pub fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

pub fn put_opt_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: Option<&str>) {
    if let Some(value) = value {
        put_str(obj, tag, vr, value);
    }
}

pub fn put_u16(obj: &mut InMemDicomObject, tag: Tag, value: u16) {
    obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

/// Integer String value
pub fn put_is(obj: &mut InMemDicomObject, tag: Tag, value: u32) {
    put_str(obj, tag, VR::IS, &value.to_string());
}

pub fn put_sequence(obj: &mut InMemDicomObject, tag: Tag, items: Vec<InMemDicomObject>) {
    obj.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
}

/// Item of a reference sequence
pub fn reference_item(class_uid: &str, instance_uid: &str) -> InMemDicomObject {
    let mut item = InMemDicomObject::new_empty();
    put_str(&mut item, tags::REFERENCED_SOP_CLASS_UID, VR::UI, class_uid);
    put_str(&mut item, tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, instance_uid);
    item
}

/// Reference sequence holding a single item
pub fn put_reference(obj: &mut InMemDicomObject, tag: Tag, class_uid: &str, instance_uid: &str) {
    put_sequence(obj, tag, vec![reference_item(class_uid, instance_uid)]);
}

/// Fail unless `value` is one of `allowed`; an empty list allows anything
pub fn check_allowed(tag: Tag, value: &str, allowed: &[String]) -> PrintResult<()> {
    if allowed.is_empty() || allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
        Ok(())
    } else {
        Err(PrintError::invalid(tag, format!("'{}' not supported", value)))
    }
}

/// Fail unless `value` is one of the fixed enumerated values
pub fn check_enum(tag: Tag, value: &str, allowed: &[&str]) -> PrintResult<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(PrintError::invalid(tag, format!("'{}' is not a defined term", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_int_from_text_and_binary() {
        let mut obj = InMemDicomObject::new_empty();
        put_str(&mut obj, tags::NUMBER_OF_COPIES, VR::IS, "3 ");
        put_u16(&mut obj, tags::ILLUMINATION, 150);
        put_str(&mut obj, tags::MEMORY_ALLOCATION, VR::IS, "many");

        assert_eq!(get_int::<u32>(&obj, tags::NUMBER_OF_COPIES).unwrap(), Some(3));
        assert_eq!(get_int::<u16>(&obj, tags::ILLUMINATION).unwrap(), Some(150));
        assert_eq!(get_int::<u16>(&obj, tags::OWNER_ID).unwrap(), None);
        assert!(get_int::<u32>(&obj, tags::MEMORY_ALLOCATION).is_err());
    }

    #[test]
    fn test_reference_round_trip() {
        let mut obj = InMemDicomObject::new_empty();
        put_reference(&mut obj, tags::REFERENCED_FILM_SESSION_SEQUENCE, "1.2", "1.2.3");
        assert_eq!(
            get_reference(&obj, tags::REFERENCED_FILM_SESSION_SEQUENCE).unwrap(),
            Some(("1.2".to_string(), "1.2.3".to_string()))
        );
        assert_eq!(get_reference(&obj, tags::REFERENCED_IMAGE_BOX_SEQUENCE).unwrap(), None);
    }

    #[test]
    fn test_unknown_attributes() {
        let mut obj = InMemDicomObject::new_empty();
        put_str(&mut obj, tags::FILM_SESSION_LABEL, VR::LO, "A");
        put_str(&mut obj, tags::PATIENT_NAME, VR::PN, "DOE^J");
        assert_eq!(
            unknown_attributes(&obj, &[tags::FILM_SESSION_LABEL]),
            vec![tags::PATIENT_NAME]
        );
    }

    #[test]
    fn test_allowed_values() {
        let allowed = vec!["PAPER".to_string(), "BLUE FILM".to_string()];
        assert!(check_allowed(tags::MEDIUM_TYPE, "blue film", &allowed).is_ok());
        assert!(check_allowed(tags::MEDIUM_TYPE, "CLEAR FILM", &allowed).is_err());
        assert!(check_allowed(tags::MEDIUM_TYPE, "ANYTHING", &[]).is_ok());
    }
}
