//! Streaming parser for the service's XML replies.
//!
//! Every reply has a root element with a `status` child and zero or more
//! `recording` children. Recordings carry flat text elements plus a
//! `files` block of `file` descriptors (`type`, `quality`, `url`).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::{Captures, Regex};

use crate::error::{Error, Result};
use crate::record::RecordingRecord;

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#?\w+;").expect("valid regex"));

/// Recordings keyed by remote identifier.
pub type Inventory = BTreeMap<String, RecordingRecord>;

/// A parsed service reply.
#[derive(Debug, Default)]
pub struct Reply {
    /// Text of the top-level `status` element, if present.
    pub status: Option<String>,
    /// Recording elements that carried a non-empty `id`.
    pub recordings: Vec<RawRecording>,
}

impl Reply {
    /// Whether the service flagged the request as successful.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.status.as_deref().is_some_and(|s| s.trim() == "true")
    }

    /// Fails with [`Error::Protocol`] unless the status indicator is positive.
    ///
    /// # Errors
    ///
    /// Returns an error when the status is missing or not `true`.
    pub fn ensure_positive(&self) -> Result<()> {
        if self.is_positive() {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "response contains errors (status {:?})",
                self.status.as_deref().unwrap_or("missing")
            )))
        }
    }

    /// Validates every recording and collects them into an inventory.
    ///
    /// # Errors
    ///
    /// Fails on the first recording missing a required attribute; nothing is
    /// returned in that case.
    pub fn into_inventory(self) -> Result<Inventory> {
        self.recordings
            .into_iter()
            .map(|raw| raw.into_record().map(|r| (r.id.clone(), r)))
            .collect()
    }
}

/// A `file` descriptor inside a recording's `files` block.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub kind: String,
    pub quality: String,
    pub url: String,
}

/// An unvalidated recording element.
#[derive(Debug, Default)]
pub struct RawRecording {
    pub elements: BTreeMap<String, String>,
    pub files: Vec<MediaFile>,
}

impl RawRecording {
    /// Remote identifier, empty when the element had none.
    #[must_use]
    pub fn id(&self) -> &str {
        self.elements.get("id").map_or("", |s| s.trim())
    }

    /// Classifies media files into primary and secondary download slots.
    ///
    /// Later descriptors win, unknown `(type, quality)` pairs are ignored.
    #[must_use]
    pub fn download_urls(&self) -> (Option<String>, Option<String>) {
        let mut hq = None;
        let mut nq = None;
        for file in &self.files {
            match (file.kind.trim(), file.quality.trim()) {
                ("download", "HQ") => hq = Some(file.url.clone()),
                ("download", "NQ") => nq = Some(file.url.clone()),
                _ => {}
            }
        }
        (hq, nq)
    }

    /// Converts into a validated [`RecordingRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAttribute`] if a required attribute is absent.
    pub fn into_record(self) -> Result<RecordingRecord> {
        let id = self.id().to_string();
        let (hq, nq) = self.download_urls();
        let mut record = RecordingRecord::from_elements(&id, self.elements, hq, nq)?;
        record.id = id;
        Ok(record)
    }
}

/// Where the parser currently is within the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Root,
    Status,
    Recording,
    Element,
    Files,
    File,
    FileField,
    Ignored,
}

/// Parses a service reply.
///
/// Recording elements without a non-empty `id` are skipped.
///
/// # Errors
///
/// Returns [`Error::Xml`] for malformed documents and [`Error::Protocol`]
/// for documents without a root element.
pub fn parse_reply(xml: &str) -> Result<Reply> {
    let mut reader = Reader::from_str(xml);
    let mut reply = Reply::default();

    // One entry per open element below the root.
    let mut stack: Vec<Scope> = Vec::new();
    let mut seen_root = false;
    let mut depth = 0usize;

    let mut current: Option<RawRecording> = None;
    let mut current_file: Option<MediaFile> = None;
    let mut field = String::new();
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                depth += 1;
                if depth == 1 {
                    seen_root = true;
                    continue;
                }
                let parent = stack.last().copied().unwrap_or(Scope::Root);
                let scope = open_scope(parent, &name, &mut current, &mut current_file);
                if matches!(scope, Scope::Status | Scope::Element | Scope::FileField) {
                    field = name;
                    text.clear();
                }
                stack.push(scope);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if depth == 0 {
                    seen_root = true;
                    continue;
                }
                let parent = stack.last().copied().unwrap_or(Scope::Root);
                match parent {
                    Scope::Root if name == "status" => reply.status = Some(String::new()),
                    Scope::Root if name == "recording" => {
                        // An empty recording has no id and is skipped.
                    }
                    Scope::Recording if name != "files" => {
                        if let Some(rec) = current.as_mut() {
                            rec.elements.insert(name, String::new());
                        }
                    }
                    Scope::File => {
                        if let Some(file) = current_file.as_mut() {
                            set_file_field(file, &name, String::new());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if collects_text(&stack) {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::CData(e) => {
                if collects_text(&stack) {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::GeneralRef(e) => {
                if collects_text(&stack) {
                    text.push('&');
                    text.push_str(&String::from_utf8_lossy(&e));
                    text.push(';');
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                let Some(scope) = stack.pop() else {
                    continue;
                };
                match scope {
                    Scope::Status => reply.status = Some(unescape(&std::mem::take(&mut text))),
                    Scope::Element => {
                        let value = unescape(&std::mem::take(&mut text));
                        if let Some(rec) = current.as_mut() {
                            rec.elements.insert(std::mem::take(&mut field), value);
                        }
                    }
                    Scope::FileField => {
                        let value = unescape(&std::mem::take(&mut text));
                        if let Some(file) = current_file.as_mut() {
                            set_file_field(file, &field, value);
                        }
                    }
                    Scope::File => {
                        if let (Some(rec), Some(file)) = (current.as_mut(), current_file.take()) {
                            rec.files.push(file);
                        }
                    }
                    Scope::Recording => {
                        if let Some(rec) = current.take()
                            && !rec.id().is_empty()
                        {
                            reply.recordings.push(rec);
                        }
                    }
                    Scope::Root | Scope::Files | Scope::Ignored => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(Error::Protocol("response has no root element".to_string()));
    }
    Ok(reply)
}

fn open_scope(
    parent: Scope,
    name: &str,
    current: &mut Option<RawRecording>,
    current_file: &mut Option<MediaFile>,
) -> Scope {
    match (parent, name) {
        (Scope::Root, "status") => Scope::Status,
        (Scope::Root, "recording") => {
            *current = Some(RawRecording::default());
            Scope::Recording
        }
        (Scope::Recording, "files") => Scope::Files,
        (Scope::Recording, _) => Scope::Element,
        (Scope::Files, "file") => {
            *current_file = Some(MediaFile::default());
            Scope::File
        }
        (Scope::File, _) => Scope::FileField,
        _ => Scope::Ignored,
    }
}

/// Text counts when the nearest enclosing known element is a text field;
/// markup nested inside a field contributes its text.
fn collects_text(stack: &[Scope]) -> bool {
    matches!(
        stack.iter().rev().find(|s| **s != Scope::Ignored),
        Some(Scope::Status | Scope::Element | Scope::FileField)
    )
}

fn set_file_field(file: &mut MediaFile, name: &str, value: String) {
    match name {
        "type" => file.kind = value,
        "quality" => file.quality = value,
        "url" => file.url = value,
        _ => {}
    }
}

/// Resolves character references and HTML5 named entities.
///
/// Unknown entities are left as they are.
#[must_use]
pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[0];
            let body = &entity[1..entity.len() - 1];
            resolve_entity(body).unwrap_or_else(|| entity.to_string())
        })
        .into_owned()
}

fn resolve_entity(body: &str) -> Option<String> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    resolve_html5_entity(body).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::recording_xml;

    #[test]
    fn parses_status_and_recordings() {
        let xml = format!(
            "<?xml version=\"1.0\"?>\n<recordings>\n  <status>true</status>\n  {}\n  {}\n</recordings>",
            recording_xml("1", None),
            recording_xml("2", None)
        );
        let reply = parse_reply(&xml).unwrap();
        assert!(reply.is_positive());
        let inventory = reply.into_inventory().unwrap();
        assert_eq!(inventory.len(), 2);

        let rec = &inventory["1"];
        assert_eq!(rec.title, "Show 1");
        assert_eq!(rec.description, "News & weather");
        assert_eq!(rec.subtitle, "");
        assert_eq!(rec.download_hq, "http://media.example/1.mp4");
        assert_eq!(rec.download_nq.as_deref(), Some("http://media.example/1_nq.mp4"));
    }

    #[test]
    fn negative_status_is_reported() {
        let reply = parse_reply("<users><status>false</status></users>").unwrap();
        assert!(!reply.is_positive());
        assert!(reply.ensure_positive().is_err());

        let reply = parse_reply("<users><user>x</user></users>").unwrap();
        assert!(matches!(reply.ensure_positive(), Err(Error::Protocol(_))));
    }

    #[test]
    fn recordings_without_id_are_skipped() {
        let xml = format!(
            "<recordings><status>true</status>\
             <recording><title>no id</title></recording>\
             <recording><id></id><title>empty id</title></recording>\
             {}</recordings>",
            recording_xml("7", None)
        );
        let inventory = parse_reply(&xml).unwrap().into_inventory().unwrap();
        assert_eq!(inventory.keys().collect::<Vec<_>>(), vec!["7"]);
    }

    #[test]
    fn missing_attribute_fails_whole_inventory() {
        let xml = format!(
            "<recordings><status>true</status>{}{}</recordings>",
            recording_xml("1", None),
            recording_xml("2", Some("channel"))
        );
        let err = parse_reply(&xml).unwrap().into_inventory().unwrap_err();
        assert!(matches!(
            err,
            Error::MissingAttribute { ref id, attribute: "channel" } if id == "2"
        ));
    }

    #[test]
    fn unknown_elements_become_extra() {
        let xml = recording_xml("3", None).replace("<genre>", "<rating>12</rating><genre>");
        let xml = format!("<recordings><status>true</status>{xml}</recordings>");
        let inventory = parse_reply(&xml).unwrap().into_inventory().unwrap();
        assert_eq!(inventory["3"].extra.get("rating").map(String::as_str), Some("12"));
    }

    #[test]
    fn markup_inside_a_field_keeps_its_text() {
        let xml = format!(
            "<recordings><status>true</status>{}</recordings>",
            recording_xml("7", Some("title")).replace(
                "<recording>",
                "<recording><title>A <b>B</b> C</title>"
            )
        );
        let inventory = parse_reply(&xml).unwrap().into_inventory().unwrap();
        assert_eq!(inventory["7"].title, "A B C");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_reply("<recordings><status>true</recordings>").is_err());
        assert!(matches!(parse_reply(""), Err(Error::Protocol(_))));
    }

    #[test]
    fn unescape_handles_references() {
        assert_eq!(unescape("a &amp; b"), "a & b");
        assert_eq!(unescape("caf&#233; &#x41;"), "café A");
        assert_eq!(unescape("M&uuml;ller"), "Müller");
        assert_eq!(unescape("&unknown; stays"), "&unknown; stays");
        assert_eq!(unescape("plain"), "plain");
        assert_eq!(
            unescape("&bdquo;Tatort&ldquo; &ndash; M&uuml;nster &copy;"),
            "\u{201e}Tatort\u{201c} \u{2013} Münster ©"
        );
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_reply_never_panics(s in "\\PC*") {
                let _ = parse_reply(&s);
            }

            #[test]
            fn unescape_without_ampersand_is_identity(s in "[^&]*") {
                prop_assert_eq!(unescape(&s), s);
            }
        }
    }
}
