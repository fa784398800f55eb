//! SOP class UIDs of the Basic Grayscale Print Management Meta SOP Class

use uuid::Uuid;

pub const BASIC_GRAYSCALE_PRINT_META: &str = "1.2.840.10008.5.1.1.9";
pub const BASIC_FILM_SESSION: &str = "1.2.840.10008.5.1.1.1";
pub const BASIC_FILM_BOX: &str = "1.2.840.10008.5.1.1.2";
pub const BASIC_GRAYSCALE_IMAGE_BOX: &str = "1.2.840.10008.5.1.1.4";
pub const PRINTER: &str = "1.2.840.10008.5.1.1.16";
pub const PRESENTATION_LUT: &str = "1.2.840.10008.5.1.1.23";
pub const STORED_PRINT_STORAGE: &str = "1.2.840.10008.5.1.1.27";
pub const HARDCOPY_GRAYSCALE_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.1.29";

/// Well-known Printer SOP Instance
pub const PRINTER_INSTANCE: &str = "1.2.840.10008.5.1.1.17";

/// Classes covered by the meta SOP class
pub const META_MEMBERS: [&str; 4] = [
    BASIC_FILM_SESSION,
    BASIC_FILM_BOX,
    BASIC_GRAYSCALE_IMAGE_BOX,
    PRINTER,
];

/// Generate a UID under the `2.25` UUID root
pub fn generate_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_uids_are_valid() {
        let a = generate_uid();
        let b = generate_uid();
        assert_ne!(a, b);
        assert!(a.starts_with("2.25."));
        assert!(a.len() <= 64);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c == '.'));
    }
}
