//! GeoKey directory parsing.
//!
//! The directory is a SHORT array: a four-value header
//! (version, revision, minor revision, key count) followed by one
//! `(key id, tag location, count, value)` quadruple per key. Keys with a tag
//! location of 0 carry their value inline; others point into the double or
//! ASCII parameter tags, which we never need.

use std::collections::HashMap;

use crate::error::TiffError;
use crate::geo::Srid;

pub const GT_MODEL_TYPE: u16 = 1024;
pub const GEOGRAPHIC_TYPE: u16 = 2048;
pub const GEOG_ANGULAR_UNITS: u16 = 2054;
pub const PROJECTED_CS_TYPE: u16 = 3072;
pub const PROJ_LINEAR_UNITS: u16 = 3076;

pub const ANGULAR_DEGREE: u16 = 9102;
pub const LINEAR_METER: u16 = 9001;

/// Inline SHORT-valued GeoKeys of a raster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoKeyDirectory {
    keys: HashMap<u16, u16>,
}

impl GeoKeyDirectory {
    pub fn parse(values: &[u16]) -> Result<Self, TiffError> {
        if values.len() < 4 {
            return Err(TiffError::InvalidTagValue {
                tag: "GeoKeyDirectory",
                message: format!("expected at least 4 values, got {}", values.len()),
            });
        }

        let key_count = values[3] as usize;
        let needed = 4 + key_count * 4;
        if values.len() < needed {
            return Err(TiffError::InvalidTagValue {
                tag: "GeoKeyDirectory",
                message: format!("{} keys need {} values, got {}", key_count, needed, values.len()),
            });
        }

        let keys = values[4..needed]
            .chunks_exact(4)
            .filter(|key| key[1] == 0)
            .map(|key| (key[0], key[3]))
            .collect();

        Ok(Self { keys })
    }

    pub fn get(&self, key: u16) -> Option<u16> {
        self.keys.get(&key).copied()
    }

    /// Resolve the raster's coordinate reference system.
    ///
    /// A projected CRS must be Web Mercator in meters; otherwise the
    /// geographic CRS must be WGS84 in degrees.
    pub fn srid(&self) -> Result<Srid, TiffError> {
        if let Some(code) = self.get(PROJECTED_CS_TYPE) {
            if Srid::from_code(code as u32) != Some(Srid::Epsg3857) {
                return Err(TiffError::UnsupportedRaster(format!(
                    "projected CRS EPSG:{} (only EPSG:3857 is supported)",
                    code
                )));
            }
            if let Some(units) = self.get(PROJ_LINEAR_UNITS) {
                if units != LINEAR_METER {
                    return Err(TiffError::UnsupportedRaster(format!(
                        "linear units {} (only meters are supported)",
                        units
                    )));
                }
            }
            return Ok(Srid::Epsg3857);
        }

        match self.get(GEOGRAPHIC_TYPE) {
            Some(4326) => {
                if let Some(units) = self.get(GEOG_ANGULAR_UNITS) {
                    if units != ANGULAR_DEGREE {
                        return Err(TiffError::UnsupportedRaster(format!(
                            "angular units {} (only degrees are supported)",
                            units
                        )));
                    }
                }
                Ok(Srid::Epsg4326)
            }
            Some(code) => Err(TiffError::UnsupportedRaster(format!(
                "geographic CRS EPSG:{} (only EPSG:4326 is supported)",
                code
            ))),
            None => Err(TiffError::UnsupportedRaster(
                "no ProjectedCSType or GeographicType GeoKey".to_string(),
            )),
        }
    }
}
