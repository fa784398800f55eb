//! Printer SOP class, N-GET on the well-known Printer SOP Instance

use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dimse::{DimseStatus, ServiceOutcome};

use crate::config::PrinterConfig;
use crate::print::dataset;
use crate::print::error::{PrintError, PrintResult};
use crate::print::uids;

/// Full Printer attribute set
pub fn printer_attributes(name: &str, printer: &PrinterConfig) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    dataset::put_str(&mut obj, tags::PRINTER_STATUS, VR::CS, "NORMAL");
    dataset::put_str(&mut obj, tags::PRINTER_STATUS_INFO, VR::CS, "NORMAL");
    dataset::put_str(&mut obj, tags::PRINTER_NAME, VR::LO, name);
    dataset::put_str(&mut obj, tags::MANUFACTURER, VR::LO, &printer.manufacturer);
    dataset::put_str(&mut obj, tags::MANUFACTURER_MODEL_NAME, VR::LO, &printer.model_name);
    dataset::put_str(&mut obj, tags::SOFTWARE_VERSIONS, VR::LO, &printer.software_version);
    obj
}

/// N-GET, filtered by the Attribute Identifier List
///
/// An empty list returns every attribute. Requested attributes the printer
/// does not have are reported with warning 0x0107.
pub fn get(
    instance_uid: Option<&str>,
    requested: &[Tag],
    name: &str,
    printer: &PrinterConfig,
) -> PrintResult<ServiceOutcome> {
    let uid = instance_uid.unwrap_or_default();
    if uid != uids::PRINTER_INSTANCE {
        return Err(PrintError::NoSuchObject {
            class: "Printer",
            uid: uid.to_string(),
        });
    }

    let all = printer_attributes(name, printer);
    if requested.is_empty() {
        return Ok(ServiceOutcome::success()
            .with_instance(uid)
            .with_dataset(all));
    }

    let mut selected = InMemDicomObject::new_empty();
    let mut missing = Vec::new();
    for tag in requested {
        match all.element(*tag) {
            Ok(elem) => {
                selected.put(elem.clone());
            }
            Err(_) => missing.push(*tag),
        }
    }
    let outcome = if missing.is_empty() {
        ServiceOutcome::success()
    } else {
        ServiceOutcome::warning(DimseStatus::ATTRIBUTE_LIST_ERROR.code(), missing)
    };
    Ok(outcome.with_instance(uid).with_dataset(selected))
}
