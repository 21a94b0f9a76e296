//! OS image catalog.
//!
//! The catalog lists published platform images. Callers pick a base image by
//! label and region and usually want the most recently published one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OsImage {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub image_family: String,
    /// Semicolon separated list of regions, e.g. `West US;East US`.
    #[serde(default)]
    pub location: String,
    pub published_date: DateTime<Utc>,
}

impl OsImage {
    /// Whether the image is offered in `location`.
    pub fn available_in(&self, location: &str) -> bool {
        self.location.split(';').map(str::trim).any(|candidate| candidate == location)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OsImageList {
    #[serde(default, rename = "OSImages")]
    pub os_images: Vec<OsImage>,
}

impl OsImageList {
    /// Images whose label equals `label` and that are offered in `location`,
    /// in catalog order.
    pub fn filter(&self, label: &str, location: &str) -> Vec<&OsImage> {
        self.os_images
            .iter()
            .filter(|image| image.label == label && image.available_in(location))
            .collect()
    }

    /// Orders `images` newest first. Images published at the same instant keep
    /// their relative order.
    pub fn sort_by_date_desc(images: &mut [&OsImage]) {
        images.sort_by(|left, right| right.published_date.cmp(&left.published_date));
    }

    /// The most recently published image matching `label` in `location`.
    pub fn newest(&self, label: &str, location: &str) -> Option<&OsImage> {
        let mut matches = self.filter(label, location);
        Self::sort_by_date_desc(&mut matches);
        matches.into_iter().next()
    }
}
