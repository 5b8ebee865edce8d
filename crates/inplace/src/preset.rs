//! Ready-made lossless TIFF recompression setups.

use crate::error::{Error, ErrorKind, Result};
use crate::selftest::{SelfTest, Version};
use exn::ResultExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

const TIFF_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

/// A known external program, with the command line, file extensions, and
/// self-test that go with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// ImageMagick's `convert`, LZW compression. Requires ImageMagick 6.2 or newer.
    ImageMagick,
    /// libtiff's `tiffcp`, LZW compression.
    Tiffcp,
}

impl Preset {
    pub fn command(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            Preset::ImageMagick => &["convert", "{{ input }}", "-compress", "LZW", "{{ output }}"],
            Preset::Tiffcp => &["tiffcp", "-c", "lzw", "{{ input }}", "{{ output }}"],
        };
        argv.iter().map(ToString::to_string).collect()
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        &TIFF_EXTENSIONS
    }

    pub fn self_test(&self) -> Result<SelfTest> {
        Ok(match self {
            Preset::ImageMagick => SelfTest::Version {
                args: vec!["-version".to_string()],
                pattern: Regex::new(r"ImageMagick (?P<major>\d+)\.(?P<minor>\d+)")
                    .or_raise(|| ErrorKind::SelfTest("invalid version pattern".to_string()))?,
                minimum: Version::new(6, 2),
            },
            Preset::Tiffcp => SelfTest::Presence,
        })
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::ImageMagick => "imagemagick",
            Preset::Tiffcp => "tiffcp",
        }
    }
}

impl FromStr for Preset {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "imagemagick" | "convert" => Ok(Preset::ImageMagick),
            "tiffcp" | "libtiff" => Ok(Preset::Tiffcp),
            _ => exn::bail!(ErrorKind::UnknownPreset(s.to_string())),
        }
    }
}

impl Display for Preset {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
