//! In-memory fakes for tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use crate::archive::{ArchiveApi, CaseFileSearch, DocumentSettings};
use crate::config::ArchiverConfig;
use crate::engine::CaseDocumentSource;
use crate::error::{Error, Result};
use crate::models::{
    ArchiveCaseFile, ArchiveDocument, ArchiveFormat, CaseFileRequest, DocumentPayload, ItemKind,
    Metadata, RemoteItem, SourceCase, SourceDocument, SourceVersion,
};
use crate::notify::{Alert, AlertDispatcher};
use crate::remote::{ChildrenPage, RawMetadatum, RemoteTreeApi, UploadOptions};

const DEFAULT_PAGE_SIZE: usize = 100;

pub fn folder(id: &str, name: &str, changed_at: DateTime<Utc>) -> RemoteItem {
    item(id, name, ItemKind::Folder, changed_at)
}

pub fn file(id: &str, name: &str, changed_at: DateTime<Utc>) -> RemoteItem {
    item(id, name, ItemKind::File, changed_at)
}

fn item(id: &str, name: &str, kind: ItemKind, changed_at: DateTime<Utc>) -> RemoteItem {
    RemoteItem {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        parent_id: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        last_changed_at: changed_at,
        metadata: Metadata::new(),
    }
}

#[derive(Default)]
struct TreeState {
    children: HashMap<String, Vec<RemoteItem>>,
    metadata: HashMap<String, Vec<RawMetadatum>>,
    contents: HashMap<String, Vec<u8>>,
    skips: HashMap<String, Vec<usize>>,
    failing_listings: HashSet<String>,
    failing_downloads: HashSet<String>,
}

/// Remote tree held in memory, paged like the real listing
pub struct FakeRemoteTree {
    page_size: usize,
    state: Mutex<TreeState>,
}

impl Default for FakeRemoteTree {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(TreeState::default()),
        }
    }
}

impl FakeRemoteTree {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn add_children(&self, parent_id: &str, items: Vec<RemoteItem>) {
        let mut state = self.state.lock().unwrap();
        let children = state.children.entry(parent_id.to_string()).or_default();
        children.extend(items.into_iter().map(|mut item| {
            item.parent_id = Some(parent_id.to_string());
            item
        }));
    }

    pub fn set_metadata(&self, item_id: &str, entries: Vec<(&str, &str)>) {
        let entries = entries
            .into_iter()
            .map(|(name, value)| RawMetadatum {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .metadata
            .insert(item_id.to_string(), entries);
    }

    pub fn set_content(&self, item_id: &str, contents: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .contents
            .insert(item_id.to_string(), contents.to_vec());
    }

    /// Move an item's change time
    pub fn touch(&self, item_id: &str, changed_at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        for item in state.children.values_mut().flatten() {
            if item.id == item_id {
                item.last_changed_at = changed_at;
            }
        }
    }

    pub fn fail_listing(&self, parent_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_listings
            .insert(parent_id.to_string());
    }

    pub fn fail_download(&self, item_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_downloads
            .insert(item_id.to_string());
    }

    /// `skip` values requested for a parent, in call order
    pub fn listing_skips(&self, parent_id: &str) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .skips
            .get(parent_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn children_of(&self, parent_id: &str) -> Vec<RemoteItem> {
        self.state
            .lock()
            .unwrap()
            .children
            .get(parent_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl RemoteTreeApi for FakeRemoteTree {
    async fn get_item(&self, item_id: &str) -> Result<RemoteItem> {
        let state = self.state.lock().unwrap();
        state
            .children
            .values()
            .flatten()
            .find(|item| item.id == item_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Item {item_id}")))
    }

    async fn list_children_page(
        &self,
        parent_id: &str,
        kind: Option<ItemKind>,
        skip: usize,
    ) -> Result<ChildrenPage> {
        let mut state = self.state.lock().unwrap();
        if state.failing_listings.contains(parent_id) {
            return Err(Error::Connectivity(format!(
                "Children request failed for {parent_id}"
            )));
        }
        state
            .skips
            .entry(parent_id.to_string())
            .or_default()
            .push(skip);

        let matching = state
            .children
            .get(parent_id)
            .map(|children| {
                children
                    .iter()
                    .filter(|item| kind.is_none_or(|kind| item.kind == kind))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(skip)
            .take(self.page_size)
            .collect();
        Ok(ChildrenPage { items, total })
    }

    async fn list_metadata(&self, item_id: &str) -> Result<Vec<RawMetadatum>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .metadata
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn download(&self, item_id: &str) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        if state.failing_downloads.contains(item_id) {
            return Err(Error::Connectivity(format!(
                "Download request failed for {item_id}"
            )));
        }
        Ok(state
            .contents
            .get(item_id)
            .cloned()
            .unwrap_or_else(|| item_id.as_bytes().to_vec()))
    }

    async fn upload(
        &self,
        folder_id: &str,
        file_name: &str,
        contents: Vec<u8>,
        options: UploadOptions,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let children = state.children.entry(folder_id.to_string()).or_default();
        let existing = children
            .iter()
            .position(|item| item.kind == ItemKind::File && item.name == file_name);
        let id = match existing {
            Some(_) if !options.overwrite => {
                return Err(Error::InvalidInput(format!("{file_name} already exists")));
            }
            Some(index) => children[index].id.clone(),
            None => {
                let id = format!("fi-upload-{}", children.len());
                let mut uploaded = file(&id, file_name, Utc::now());
                uploaded.parent_id = Some(folder_id.to_string());
                children.push(uploaded);
                id
            }
        };
        state.contents.insert(id, contents);
        Ok(())
    }
}

/// Mutating and reading archive calls, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveCall {
    SearchCaseFiles,
    CreateCaseFile(String),
    CreateDocument(String),
    CreateVersion(String),
    UpdateSettings(String, i64),
    DeleteDocument(String),
    ArchiveFormats,
}

impl ArchiveCall {
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::SearchCaseFiles | Self::ArchiveFormats)
    }
}

#[derive(Default)]
struct ArchiveState {
    sequence: usize,
    case_files: Vec<ArchiveCaseFile>,
    documents: Vec<ArchiveDocument>,
    payloads: HashMap<String, DocumentPayload>,
    calls: Vec<ArchiveCall>,
    failing_versions: HashSet<String>,
    failing_settings: HashSet<String>,
    failing_deletes: HashSet<String>,
}

impl ArchiveState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{}", self.sequence)
    }
}

/// Archive held in memory, recording every call
#[derive(Default)]
pub struct FakeArchive {
    state: Mutex<ArchiveState>,
}

impl FakeArchive {
    pub fn case_files(&self) -> Vec<ArchiveCaseFile> {
        self.state.lock().unwrap().case_files.clone()
    }

    /// Live documents in creation order
    pub fn documents(&self) -> Vec<ArchiveDocument> {
        self.state.lock().unwrap().documents.clone()
    }

    pub fn payload_format(&self, document_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .payloads
            .get(document_id)
            .map(|payload| payload.archive_format_code.clone())
    }

    pub fn payload_contents(&self, document_id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .payloads
            .get(document_id)
            .map(|payload| payload.contents.clone())
    }

    /// Add a case file without recording a call
    pub fn seed_case_file(&self, sequence_number: &str) -> ArchiveCaseFile {
        let mut state = self.state.lock().unwrap();
        let case_file = ArchiveCaseFile {
            id: state.next_id("cf"),
            title: format!("Case {sequence_number}"),
            sequence_number: sequence_number.to_string(),
            organisation_reference: Some("org-1".to_string()),
        };
        state.case_files.push(case_file.clone());
        case_file
    }

    pub fn calls(&self) -> Vec<ArchiveCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn fail_versions_for(&self, document_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_versions
            .insert(document_id.to_string());
    }

    pub fn fail_settings_for(&self, document_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_settings
            .insert(document_id.to_string());
    }

    pub fn fail_deletes_for(&self, document_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(document_id.to_string());
    }
}

impl ArchiveApi for FakeArchive {
    async fn search_case_files(&self, criteria: &CaseFileSearch) -> Result<Vec<ArchiveCaseFile>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ArchiveCall::SearchCaseFiles);
        Ok(state
            .case_files
            .iter()
            .filter(|case_file| {
                criteria
                    .case_file_id
                    .as_deref()
                    .is_none_or(|id| id == case_file.id)
                    && criteria
                        .sequence_number
                        .as_deref()
                        .is_none_or(|number| number == case_file.sequence_number)
                    && criteria
                        .title
                        .as_deref()
                        .is_none_or(|title| title == case_file.title)
            })
            .cloned()
            .collect())
    }

    async fn create_case_file(&self, request: &CaseFileRequest) -> Result<ArchiveCaseFile> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(ArchiveCall::CreateCaseFile(request.title.clone()));
        let id = state.next_id("cf");
        let case_file = ArchiveCaseFile {
            sequence_number: format!("24-{:06}", state.sequence),
            id,
            title: request.title.clone(),
            organisation_reference: request.organisation_reference.clone(),
        };
        state.case_files.push(case_file.clone());
        Ok(case_file)
    }

    async fn create_document_and_version(
        &self,
        case_file: &ArchiveCaseFile,
        payload: &DocumentPayload,
    ) -> Result<ArchiveDocument> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(ArchiveCall::CreateDocument(payload.title.clone()));
        let document = ArchiveDocument {
            id: state.next_id("doc"),
            case_file_id: case_file.id.clone(),
            version_id: state.next_id("ver"),
            title: payload.title.clone(),
            status_code: 6,
        };
        state.documents.push(document.clone());
        state.payloads.insert(document.id.clone(), payload.clone());
        Ok(document)
    }

    async fn create_document_version(
        &self,
        document: &ArchiveDocument,
        payload: &DocumentPayload,
    ) -> Result<ArchiveDocument> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(ArchiveCall::CreateVersion(document.id.clone()));
        if state.failing_versions.contains(&document.id) {
            return Err(Error::ArchiveApi(format!(
                "CreateDocumentVersion fault on {}",
                document.id
            )));
        }

        let version_id = state.next_id("ver");
        let stored = state
            .documents
            .iter_mut()
            .find(|stored| stored.id == document.id)
            .ok_or_else(|| Error::ArchiveApi(format!("Unknown document {}", document.id)))?;
        stored.version_id = version_id;
        stored.title = payload.title.clone();
        let updated = stored.clone();
        state.payloads.insert(updated.id.clone(), payload.clone());
        Ok(updated)
    }

    async fn update_document_settings(
        &self,
        document: &ArchiveDocument,
        settings: DocumentSettings,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ArchiveCall::UpdateSettings(
            document.id.clone(),
            settings.status_code,
        ));
        if state.failing_settings.contains(&document.id) {
            return Err(Error::ArchiveApi(format!(
                "UpdateDocument fault on {}",
                document.id
            )));
        }
        if let Some(stored) = state
            .documents
            .iter_mut()
            .find(|stored| stored.id == document.id)
        {
            stored.status_code = settings.status_code;
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<u16> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(ArchiveCall::DeleteDocument(document_id.to_string()));
        if state.failing_deletes.contains(document_id) {
            return Err(Error::ArchiveApi(format!(
                "DeleteDocument fault on {document_id}"
            )));
        }
        let before = state.documents.len();
        state.documents.retain(|document| document.id != document_id);
        Ok(if state.documents.len() < before {
            state.payloads.remove(document_id);
            204
        } else {
            404
        })
    }

    async fn archive_formats(&self) -> Result<Vec<ArchiveFormat>> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(ArchiveCall::ArchiveFormats);
        Ok([
            ("PDF", "application/pdf", "pdf"),
            ("ZIP", "application/zip", "zip"),
            (
                "XLSX",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "xlsx",
            ),
            (
                "DOCX",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "docx",
            ),
        ]
        .into_iter()
        .map(|(code, mime_type, extension)| ArchiveFormat {
            code: code.to_string(),
            mime_type: Some(mime_type.to_string()),
            file_extension: Some(extension.to_string()),
        })
        .collect())
    }
}

pub fn source_case(sequence_number: &str) -> SourceCase {
    SourceCase {
        sequence_number: sequence_number.to_string(),
        title: format!("Case {sequence_number}"),
        completed: false,
        property_reference: None,
    }
}

pub fn source_document(
    document_identifier: &str,
    document_number: &str,
    version_identifier: Option<&str>,
    status_code: i64,
) -> SourceDocument {
    SourceDocument {
        document_identifier: document_identifier.to_string(),
        document_number: document_number.to_string(),
        title: format!("{document_identifier}.pdf"),
        status_code,
        version_identifier: version_identifier.map(str::to_string),
        document_date: None,
        last_changed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

#[derive(Default)]
struct CaseSourceState {
    cases: Vec<SourceCase>,
    documents: HashMap<String, Vec<SourceDocument>>,
    attachments: HashMap<String, Vec<SourceDocument>>,
    versions: HashMap<String, SourceVersion>,
    failing_versions: HashSet<String>,
}

/// Property case system held in memory
#[derive(Default)]
pub struct FakeCaseSource {
    state: Mutex<CaseSourceState>,
}

impl FakeCaseSource {
    pub fn add_case(&self, case: SourceCase) {
        self.state.lock().unwrap().cases.push(case);
    }

    pub fn add_document(&self, sequence_number: &str, document: SourceDocument) {
        self.state
            .lock()
            .unwrap()
            .documents
            .entry(sequence_number.to_string())
            .or_default()
            .push(document);
    }

    pub fn add_attachment(&self, document_identifier: &str, attachment: SourceDocument) {
        self.state
            .lock()
            .unwrap()
            .attachments
            .entry(document_identifier.to_string())
            .or_default()
            .push(attachment);
    }

    pub fn add_version(&self, version_identifier: &str, extension: &str, contents: &[u8]) {
        self.state.lock().unwrap().versions.insert(
            version_identifier.to_string(),
            SourceVersion {
                version_identifier: version_identifier.to_string(),
                declared_type: None,
                file_extension: Some(extension.to_string()),
                contents: contents.to_vec(),
            },
        );
    }

    /// Point a primary document or attachment at another version
    pub fn set_version(&self, document_identifier: &str, version_identifier: &str) {
        self.replace_version(document_identifier, Some(version_identifier));
    }

    /// Leave a primary document or attachment without a current version
    pub fn clear_version(&self, document_identifier: &str) {
        self.replace_version(document_identifier, None);
    }

    fn replace_version(&self, document_identifier: &str, version_identifier: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        for document in state
            .documents
            .values_mut()
            .chain(state.attachments.values_mut())
            .flatten()
        {
            if document.document_identifier == document_identifier {
                document.version_identifier = version_identifier.map(str::to_string);
            }
        }
    }

    pub fn fail_version(&self, version_identifier: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_versions
            .insert(version_identifier.to_string());
    }
}

impl CaseDocumentSource for FakeCaseSource {
    async fn cases(&self, include_completed: bool) -> Result<Vec<SourceCase>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .cases
            .iter()
            .filter(|case| include_completed || !case.completed)
            .cloned()
            .collect())
    }

    async fn documents(&self, case: &SourceCase) -> Result<Vec<SourceDocument>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .documents
            .get(&case.sequence_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn attachments(&self, document: &SourceDocument) -> Result<Vec<SourceDocument>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .attachments
            .get(&document.document_identifier)
            .cloned()
            .unwrap_or_default())
    }

    async fn version(&self, version_identifier: &str) -> Result<SourceVersion> {
        let state = self.state.lock().unwrap();
        if state.failing_versions.contains(version_identifier) {
            return Err(Error::Connectivity(format!(
                "Version request failed for {version_identifier}"
            )));
        }
        state
            .versions
            .get(version_identifier)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Version {version_identifier}")))
    }
}

/// Collects alerts instead of sending them
#[derive(Default)]
pub struct RecordingDispatcher {
    alerts: Mutex<Vec<Alert>>,
    failing: bool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertDispatcher for RecordingDispatcher {
    async fn dispatch(&self, alert: &Alert) -> Result<()> {
        if self.failing {
            return Err(Error::Connectivity("Alert relay unavailable".to_string()));
        }
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub fn hearing_archiver() -> ArchiverConfig {
    let payload = json!({
        "id": "hearings",
        "name": "Hearing responses",
        "kind": "sharefile2edoc",
        "sharefile": {
            "hostname": "example.sharefile.com",
            "client_id": "client",
            "secret": "secret",
            "username": "sync@example.com",
            "password": "password",
            "root_id": "fo-root"
        },
        "edoc": {
            "ws_url": "https://edoc.example.com/api",
            "ws_username": "edoc",
            "ws_password": "password",
            "user_identifier": "sync-user",
            "organisation_references": {"1": "org-1"},
            "case_file": {"name": "Høring {{ item.name }}"}
        },
        "notifications": {
            "email": {"from": "sync@example.com", "to": ["ops@example.com"]}
        }
    });
    ArchiverConfig::from_json(&payload.to_string()).unwrap()
}

pub fn case_document_archiver() -> ArchiverConfig {
    let payload = json!({
        "id": "property-cases",
        "name": "Property case documents",
        "kind": "case_documents",
        "edoc": {
            "ws_url": "https://edoc.example.com/api",
            "ws_username": "edoc",
            "ws_password": "password",
            "user_identifier": "sync-user",
            "case_file": {"name": "Sag {{ item.name }}"},
            "document": {"name": "{{ item.act_number }} - {{ item.name }}"}
        },
        "case_documents": {
            "url": "https://cases.example.com",
            "api_key": "key"
        }
    });
    ArchiverConfig::from_json(&payload.to_string()).unwrap()
}
