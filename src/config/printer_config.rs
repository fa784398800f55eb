use serde::Deserialize;

use crate::config::ConfigError;

/// Defaults and policy of one configured printer
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    pub description: String,
    pub manufacturer: String,
    pub model_name: String,
    pub software_version: String,

    /// Supported values; an empty list accepts anything
    pub film_size_ids: Vec<String>,
    pub medium_types: Vec<String>,
    pub film_destinations: Vec<String>,
    pub magnification_types: Vec<String>,
    pub smoothing_types: Vec<String>,
    pub resolution_ids: Vec<String>,

    pub default_medium_type: String,
    pub default_film_destination: String,
    pub default_film_size_id: String,
    pub default_magnification_type: String,
    pub default_resolution_id: String,
    pub default_illumination: u16,
    pub default_reflected_ambient_light: u16,

    pub max_copies: u32,
    /// Largest STANDARD image display format
    pub max_columns: u32,
    pub max_rows: u32,

    pub supports_12bit: bool,
    pub supports_trim: bool,
    pub supports_decimate_crop: bool,
    pub supports_requested_image_size: bool,
    /// Reject LUTs that do not fit the bit depth of the image
    pub require_lut_alignment: bool,
    /// Accept Referenced Presentation LUT Sequence on image boxes
    pub image_box_presentation_lut: bool,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            description: "Basic grayscale printer".to_string(),
            manufacturer: "PRINTSCP".to_string(),
            model_name: "Virtual Printer".to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            film_size_ids: ["8INX10IN", "10INX12IN", "11INX14IN", "14INX14IN", "14INX17IN", "A4"]
                .map(String::from)
                .to_vec(),
            medium_types: ["PAPER", "CLEAR FILM", "BLUE FILM"].map(String::from).to_vec(),
            film_destinations: ["MAGAZINE", "PROCESSOR"].map(String::from).to_vec(),
            magnification_types: ["REPLICATE", "BILINEAR", "CUBIC", "NONE"]
                .map(String::from)
                .to_vec(),
            smoothing_types: Vec::new(),
            resolution_ids: ["STANDARD", "HIGH"].map(String::from).to_vec(),
            default_medium_type: "DEFAULT".to_string(),
            default_film_destination: "PROCESSOR".to_string(),
            default_film_size_id: "8INX10IN".to_string(),
            default_magnification_type: "BILINEAR".to_string(),
            default_resolution_id: "STANDARD".to_string(),
            default_illumination: 2000,
            default_reflected_ambient_light: 10,
            max_copies: 100,
            max_columns: 8,
            max_rows: 8,
            supports_12bit: true,
            supports_trim: true,
            supports_decimate_crop: true,
            supports_requested_image_size: true,
            require_lut_alignment: false,
            image_box_presentation_lut: false,
        }
    }
}

impl PrinterConfig {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPrinter {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if self.max_copies == 0 {
            return Err(invalid("max_copies must be greater than 0"));
        }
        if self.max_columns == 0 || self.max_rows == 0 {
            return Err(invalid("max_columns and max_rows must be greater than 0"));
        }
        if self.max_image_boxes() > u64::from(u16::MAX) {
            return Err(invalid("max_columns * max_rows must not exceed 65535"));
        }
        if !self.film_size_ids.is_empty()
            && !self
                .film_size_ids
                .iter()
                .any(|id| id.eq_ignore_ascii_case(&self.default_film_size_id))
        {
            return Err(invalid("default_film_size_id is not a supported film size"));
        }
        Ok(())
    }

    /// Largest number of image boxes on one film
    pub fn max_image_boxes(&self) -> u64 {
        u64::from(self.max_columns) * u64::from(self.max_rows)
    }
}
