//! Acquisition metadata carried in provider file names

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{AllotropeError, AllotropeResult, Product};

/// Provider processing levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingLevel {
    L2SP,
    L2D,
}

impl std::fmt::Display for ProcessingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingLevel::L2SP => write!(f, "L2SP"),
            ProcessingLevel::L2D => write!(f, "L2D"),
        }
    }
}

impl std::str::FromStr for ProcessingLevel {
    type Err = AllotropeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L2SP" => Ok(ProcessingLevel::L2SP),
            "L2D" => Ok(ProcessingLevel::L2D),
            _ => Err(AllotropeError::FileName(format!("Unknown processing level: {}", s))),
        }
    }
}

/// Metadata parsed from a product file name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionMetadata {
    pub product: Product,
    /// STAC platform name
    pub platform: String,
    pub processing_level: ProcessingLevel,
    pub product_type: String,
    /// Acquisition start (UTC)
    pub datetime: DateTime<Utc>,
    /// Sensor band, Landsat only
    pub band: Option<String>,
}

/// Parses PRISMA and Landsat-9 file names
#[derive(Debug, Clone)]
pub struct FileNameParser {
    prisma: Regex,
    landsat: Regex,
}

impl FileNameParser {
    pub fn new() -> AllotropeResult<Self> {
        // PRS_<level>_<type>_<start>_<end>_<sequence>
        let prisma = Regex::new(r"^PRS_([A-Z0-9]+)_([A-Z0-9]+)_(\d{14})_(\d{14})_(\d{4})$")
            .map_err(|e| AllotropeError::Config(format!("Regex error: {}", e)))?;
        // LC09_<level>_<pathrow>_<acquired>_<processed>_<collection>_<category>_<type>_<band>
        let landsat = Regex::new(
            r"^LC09_([A-Z0-9]+)_(\d{6})_(\d{8})_(\d{8})_(\d{2})_([A-Z0-9]{2})_([A-Z]+)_([A-Z0-9]+)$",
        )
        .map_err(|e| AllotropeError::Config(format!("Regex error: {}", e)))?;
        Ok(Self { prisma, landsat })
    }

    pub fn parse(&self, file_name: &str) -> AllotropeResult<AcquisitionMetadata> {
        let file_id = file_name.split('.').next().unwrap_or(file_name);
        if file_id.starts_with("PRS") {
            self.prisma(file_id)
        } else if file_id.starts_with("LC09") {
            self.landsat_09(file_id)
        } else {
            Err(AllotropeError::FileName(format!(
                "No parser registered for {}",
                file_name
            )))
        }
    }

    fn prisma(&self, file_id: &str) -> AllotropeResult<AcquisitionMetadata> {
        let captures = self.prisma.captures(file_id).ok_or_else(|| {
            AllotropeError::FileName(format!("Malformed PRISMA file name: {}", file_id))
        })?;

        let start = NaiveDateTime::parse_from_str(&captures[3], "%Y%m%d%H%M%S").map_err(|e| {
            AllotropeError::FileName(format!("Invalid acquisition start {}: {}", &captures[3], e))
        })?;

        Ok(AcquisitionMetadata {
            product: Product::Prisma,
            platform: "Prisma".to_string(),
            processing_level: captures[1].parse()?,
            product_type: captures[2].to_string(),
            datetime: Utc.from_utc_datetime(&start),
            band: None,
        })
    }

    fn landsat_09(&self, file_id: &str) -> AllotropeResult<AcquisitionMetadata> {
        let captures = self.landsat.captures(file_id).ok_or_else(|| {
            AllotropeError::FileName(format!("Malformed Landsat file name: {}", file_id))
        })?;

        let acquired = NaiveDate::parse_from_str(&captures[3], "%Y%m%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(|| {
                AllotropeError::FileName(format!("Invalid acquisition date {}", &captures[3]))
            })?;

        Ok(AcquisitionMetadata {
            product: Product::Landsat,
            platform: "landsat-9".to_string(),
            processing_level: captures[1].parse()?,
            product_type: captures[7].to_string(),
            datetime: Utc.from_utc_datetime(&acquired),
            band: Some(captures[8].to_string()),
        })
    }
}
