//! Recording metadata as published by the remote service.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::{Error, Result};

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-2]?[0-9]):([0-5]?[0-9])$").expect("valid regex"));

/// Base name of the primary media file inside a recording directory.
pub const VIDEO_BASE_NAME: &str = "video";

/// Base name of the thumbnail inside a recording directory.
pub const IMAGE_BASE_NAME: &str = "image";

/// Attributes every recording must carry, in dump order.
///
/// `downloadHQ` is not an element of its own; it is satisfied by a
/// `download`/`HQ` file descriptor.
pub const REQUIRED_ATTRIBUTES: [&str; 14] = [
    "id",
    "title",
    "subtitle",
    "description",
    "channel",
    "genre",
    "start",
    "duration",
    "image_name",
    "image",
    "series_season",
    "series_number",
    "series_count",
    "downloadHQ",
];

/// A recording listed by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingRecord {
    /// Stable remote identifier.
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub channel: String,
    pub genre: String,
    /// Scheduled start, `DD-MM-YYYY HH:MM`.
    pub start: String,
    /// Duration, `H:MM`.
    pub duration: String,
    pub image_name: String,
    pub image_url: String,
    pub series_season: String,
    pub series_number: String,
    pub series_count: String,
    /// High quality ("HQ") download URL.
    pub download_hq: String,
    /// Normal quality ("NQ") download URL.
    pub download_nq: Option<String>,
    /// Elements outside the known schema, kept for diagnostics only.
    pub extra: BTreeMap<String, String>,
}

impl RecordingRecord {
    /// Builds a record from the flat element map of a `<recording>`.
    ///
    /// Consumes the known elements; whatever is left over ends up in
    /// [`extra`](Self::extra).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAttribute`] for the first required attribute
    /// that is absent.
    pub fn from_elements(
        id: &str,
        mut elements: BTreeMap<String, String>,
        download_hq: Option<String>,
        download_nq: Option<String>,
    ) -> Result<Self> {
        let mut take = |attribute: &'static str| {
            elements.remove(attribute).ok_or_else(|| Error::MissingAttribute {
                id: id.to_string(),
                attribute,
            })
        };

        let mut record = Self {
            id: take("id")?,
            title: take("title")?,
            subtitle: take("subtitle")?,
            description: take("description")?,
            channel: take("channel")?,
            genre: take("genre")?,
            start: take("start")?,
            duration: take("duration")?,
            image_name: take("image_name")?,
            image_url: take("image")?,
            series_season: take("series_season")?,
            series_number: take("series_number")?,
            series_count: take("series_count")?,
            download_hq: download_hq.ok_or_else(|| Error::MissingAttribute {
                id: id.to_string(),
                attribute: "downloadHQ",
            })?,
            download_nq,
            extra: BTreeMap::new(),
        };
        record.extra = elements;
        Ok(record)
    }

    /// Returns the primary download URL if the service offered a usable one.
    #[must_use]
    pub fn primary_url(&self) -> Option<&str> {
        Some(self.download_hq.trim()).filter(|u| !u.is_empty())
    }

    /// Returns the thumbnail URL when both image URL and image name are set.
    #[must_use]
    pub fn thumbnail_url(&self) -> Option<&str> {
        let url = self.image_url.trim();
        (!url.is_empty() && !self.image_name.trim().is_empty()).then_some(url)
    }

    /// Start timestamp in catalog form, `None` when malformed.
    #[must_use]
    pub fn normalized_start(&self) -> Option<String> {
        normalize_start(&self.start)
    }

    /// Duration in catalog form, `None` when malformed.
    #[must_use]
    pub fn normalized_duration(&self) -> Option<String> {
        normalize_duration(&self.duration)
    }

    /// Attribute/value pairs in a stable order for diagnostics.
    #[must_use]
    pub fn attributes(&self) -> Vec<(&str, &str)> {
        let mut attrs = vec![
            ("id", self.id.as_str()),
            ("title", self.title.as_str()),
            ("subtitle", self.subtitle.as_str()),
            ("description", self.description.as_str()),
            ("channel", self.channel.as_str()),
            ("genre", self.genre.as_str()),
            ("start", self.start.as_str()),
            ("duration", self.duration.as_str()),
            ("image_name", self.image_name.as_str()),
            ("image", self.image_url.as_str()),
            ("series_season", self.series_season.as_str()),
            ("series_number", self.series_number.as_str()),
            ("series_count", self.series_count.as_str()),
            ("downloadHQ", self.download_hq.as_str()),
        ];
        if let Some(nq) = &self.download_nq {
            attrs.push(("downloadNQ", nq.as_str()));
        }
        attrs.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        attrs
    }
}

/// Converts `23-11-2011 20:15` into `2011-11-23 20:15:00`.
#[must_use]
pub fn normalize_start(raw: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(raw.trim(), "%d-%m-%Y %H:%M")
        .ok()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Converts `1:50` into `01:50:00`.
#[must_use]
pub fn normalize_duration(raw: &str) -> Option<String> {
    let caps = DURATION_RE.captures(raw.trim())?;
    Some(format!("{:0>2}:{:0>2}:00", &caps[1], &caps[2]))
}

/// Directory name for a catalog entry, e.g. `bong000042`.
#[must_use]
pub fn entry_dir_name(entry_id: i64) -> String {
    format!("bong{entry_id:06}")
}

/// File name for a downloaded asset: `base` plus the extension of the URL path.
#[must_use]
pub fn asset_file_name(url: &str, base: &str) -> String {
    let path = reqwest::Url::parse(url).map_or_else(
        |_| url.split(['?', '#']).next().unwrap_or_default().to_string(),
        |u| u.path().to_string(),
    );
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!("{base}.{ext}"),
        _ => base.to_string(),
    }
}
