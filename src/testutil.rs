//! Fixtures and mocks shared by the unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::api::{Inventory, RemoteCatalog, Transport};
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::record::{RecordingRecord, VIDEO_BASE_NAME};
use crate::stats::FileStats;
use crate::transfer::{Transfer, TransferRequest};

/// XML for one complete `<recording>`, optionally without element `skip`.
pub fn recording_xml(id: &str, skip: Option<&str>) -> String {
    let fields = [
        ("id", id.to_string()),
        ("title", format!("Show {id}")),
        ("subtitle", String::new()),
        ("description", "News &amp; weather".to_string()),
        ("channel", "ZDF".to_string()),
        ("genre", "Magazin".to_string()),
        ("start", "23-11-2011 20:15".to_string()),
        ("duration", "1:50".to_string()),
        ("image_name", format!("{id}.jpg")),
        ("image", format!("http://img.example/{id}.jpg")),
        ("series_season", String::new()),
        ("series_number", String::new()),
        ("series_count", String::new()),
    ];
    let mut xml = String::from("<recording>");
    for (name, value) in fields {
        if skip == Some(name) {
            continue;
        }
        if value.is_empty() {
            xml.push_str(&format!("<{name}/>"));
        } else {
            xml.push_str(&format!("<{name}>{value}</{name}>"));
        }
    }
    xml.push_str("<files>");
    if skip != Some("downloadHQ") {
        xml.push_str(&format!(
            "<file><type>download</type><quality>HQ</quality><url>http://media.example/{id}.mp4</url></file>"
        ));
    }
    xml.push_str(&format!(
        "<file><type>download</type><quality>NQ</quality><url>http://media.example/{id}_nq.mp4</url></file>\
         <file><type>stream</type><quality>HQ</quality><url>rtmp://media.example/{id}</url></file>"
    ));
    xml.push_str("</files></recording>");
    xml
}

/// A positive recordings reply listing `ids`.
pub fn inventory_xml(ids: &[&str]) -> String {
    let recordings: String = ids.iter().map(|id| recording_xml(id, None)).collect();
    format!("<recordings><status>true</status>{recordings}</recordings>")
}

/// The record [`recording_xml`] describes.
pub fn record(id: &str) -> RecordingRecord {
    RecordingRecord {
        id: id.to_string(),
        title: format!("Show {id}"),
        description: "News & weather".to_string(),
        channel: "ZDF".to_string(),
        genre: "Magazin".to_string(),
        start: "23-11-2011 20:15".to_string(),
        duration: "1:50".to_string(),
        image_name: format!("{id}.jpg"),
        image_url: format!("http://img.example/{id}.jpg"),
        download_hq: format!("http://media.example/{id}.mp4"),
        download_nq: Some(format!("http://media.example/{id}_nq.mp4")),
        ..RecordingRecord::default()
    }
}

/// Sets the modification time of `path` to `age` ago.
pub fn age_file(path: &Path, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

/// Makes the catalog refuse to insert the recordings `ids`.
pub fn reject_inserts(catalog: &Catalog, ids: &[&str]) {
    let list = ids
        .iter()
        .map(|id| format!("'{id}'"))
        .collect::<Vec<_>>()
        .join(", ");
    catalog
        .execute_batch(&format!(
            "CREATE TRIGGER reject_listed BEFORE INSERT ON recording \
             WHEN NEW.remote_id IN ({list}) BEGIN SELECT RAISE(ABORT, 'rejected'); END;"
        ))
        .unwrap();
}

#[derive(Default)]
struct TransportState {
    responses: BTreeMap<String, std::result::Result<String, u16>>,
    calls: BTreeMap<String, usize>,
    last_url: Option<String>,
}

/// [`Transport`] answering from canned replies keyed by the path below `/api/`.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, body: &str) {
        let mut state = self.state.lock().unwrap();
        state.responses.insert(path.to_string(), Ok(body.to_string()));
    }

    pub fn fail(&self, path: &str, status: u16) {
        let mut state = self.state.lock().unwrap();
        state.responses.insert(path.to_string(), Err(status));
    }

    pub fn calls(&self, path: &str) -> usize {
        self.state.lock().unwrap().calls.get(path).copied().unwrap_or(0)
    }

    pub fn last_url(&self) -> Option<String> {
        self.state.lock().unwrap().last_url.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &reqwest::Url) -> Result<String> {
        let path = url.path().trim_start_matches("/api/").to_string();
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(path.clone()).or_default() += 1;
        state.last_url = Some(url.to_string());
        match state.responses.get(&path) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(Error::Status {
                status: *status,
                url: path,
            }),
            None => Err(Error::Status {
                status: 404,
                url: path,
            }),
        }
    }
}

/// Shared state of a simulated service plus transfer engine.
#[derive(Default)]
pub struct Sim {
    pub inventory: Inventory,
    pub reject_credentials: bool,
    pub fetch_fails: bool,
    pub retire_fails: bool,
    pub fetches: usize,
    pub retired: Vec<String>,
    /// Primary transfers allowed per fetch; `None` means unlimited.
    pub budget_per_fetch: Option<usize>,
    pub budget: Option<usize>,
    pub failing_urls: BTreeSet<String>,
    pub requests: Vec<TransferRequest>,
}

impl Sim {
    pub fn with_ids(ids: &[&str]) -> Arc<Mutex<Self>> {
        let inventory = ids.iter().map(|id| ((*id).to_string(), record(id))).collect();
        Arc::new(Mutex::new(Self {
            inventory,
            ..Self::default()
        }))
    }
}

/// [`RemoteCatalog`] over a [`Sim`]; retiring removes the recording.
pub struct MockRemote {
    pub sim: Arc<Mutex<Sim>>,
}

impl MockRemote {
    pub fn new(sim: &Arc<Mutex<Sim>>) -> Self {
        Self {
            sim: Arc::clone(sim),
        }
    }
}

#[async_trait]
impl RemoteCatalog for MockRemote {
    async fn check_credentials(&mut self) -> Result<()> {
        if self.sim.lock().unwrap().reject_credentials {
            return Err(Error::Protocol("response contains errors".into()));
        }
        Ok(())
    }

    async fn fetch_inventory(&mut self) -> Result<Inventory> {
        let mut sim = self.sim.lock().unwrap();
        sim.fetches += 1;
        if sim.fetch_fails {
            return Err(Error::Status {
                status: 500,
                url: "recordings.xml".into(),
            });
        }
        sim.budget = sim.budget_per_fetch;
        Ok(sim.inventory.clone())
    }

    async fn retire_recording(&mut self, id: &str) -> Result<()> {
        let mut sim = self.sim.lock().unwrap();
        sim.retired.push(id.to_string());
        if sim.retire_fails {
            return Err(Error::Protocol("delete refused".into()));
        }
        sim.inventory.remove(id);
        Ok(())
    }
}

/// [`Transfer`] over a [`Sim`]; records every request.
pub struct MockTransfer {
    pub sim: Arc<Mutex<Sim>>,
}

impl MockTransfer {
    pub fn new(sim: &Arc<Mutex<Sim>>) -> Self {
        Self {
            sim: Arc::clone(sim),
        }
    }
}

#[async_trait]
impl Transfer for MockTransfer {
    async fn fetch(&self, request: &TransferRequest) -> Result<FileStats> {
        let mut sim = self.sim.lock().unwrap();
        sim.requests.push(request.clone());
        if sim.failing_urls.contains(&request.url) {
            return Err(Error::Transfer(format!("{} unreachable", request.url)));
        }
        if request.file_name.starts_with(VIDEO_BASE_NAME) {
            match sim.budget {
                Some(0) => return Err(Error::Transfer("budget exhausted".into())),
                Some(n) => sim.budget = Some(n - 1),
                None => {}
            }
        }
        Ok(FileStats {
            size: 100,
            ..FileStats::default()
        })
    }
}
