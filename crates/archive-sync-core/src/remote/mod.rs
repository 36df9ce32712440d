//! Remote file tree access.
//!
//! [`RemoteTreeApi`] is the request/response boundary of the remote store;
//! [`RemoteTreeFetcher`] adds paging, client-side time filtering, metadata
//! decoding and the hearing/response naming conventions on top of it.

mod sharefile;

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::error::Result;
use crate::models::{ItemKind, Metadata, RemoteItem};

pub use sharefile::ShareFileClient;

/// One page of a child listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildrenPage {
    pub items: Vec<RemoteItem>,
    /// Total number of children the remote store reports for the listing
    pub total: usize,
}

/// Undecoded metadata entry as returned by the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMetadatum {
    pub name: String,
    pub value: String,
}

/// Flags passed with an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Replace an existing file with the same name
    pub overwrite: bool,
    /// Let the remote store notify folder subscribers
    pub notify: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            notify: true,
        }
    }
}

/// Remote store operations (async)
///
/// Transport and authentication failures surface as
/// [`Error::Connectivity`](crate::Error::Connectivity).
#[allow(async_fn_in_trait)]
pub trait RemoteTreeApi {
    /// Fetch a single item by id
    async fn get_item(&self, item_id: &str) -> Result<RemoteItem>;

    /// Fetch one page of children, starting at `skip`
    async fn list_children_page(
        &self,
        parent_id: &str,
        kind: Option<ItemKind>,
        skip: usize,
    ) -> Result<ChildrenPage>;

    /// List raw metadata entries of an item
    async fn list_metadata(&self, item_id: &str) -> Result<Vec<RawMetadatum>>;

    /// Download the binary content of an item (folders download as ZIP)
    async fn download(&self, item_id: &str) -> Result<Vec<u8>>;

    /// Upload a file into a folder
    async fn upload(
        &self,
        folder_id: &str,
        file_name: &str,
        contents: Vec<u8>,
        options: UploadOptions,
    ) -> Result<()>;
}

fn hearing_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^H[0-9]+$").expect("Invalid regex"))
}

fn response_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^HS[0-9]+$").expect("Invalid regex"))
}

/// Paging, filtering fetcher over a [`RemoteTreeApi`]
pub struct RemoteTreeFetcher<R> {
    api: R,
}

impl<R: RemoteTreeApi> RemoteTreeFetcher<R> {
    pub const fn new(api: R) -> Self {
        Self { api }
    }

    pub const fn api(&self) -> &R {
        &self.api
    }

    /// Fetch every child of `parent_id`, following pages transparently.
    ///
    /// The page size is the length of the first page and the page count is
    /// derived from the total reported with it. Children that change while
    /// paging may be missed or repeated. `changed_after` is applied here,
    /// after fetching, since the remote store cannot filter mixed listings.
    pub async fn fetch_children(
        &self,
        parent_id: &str,
        kind: Option<ItemKind>,
        changed_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteItem>> {
        let first = self.api.list_children_page(parent_id, kind, 0).await?;
        let page_size = first.items.len();
        let total = first.total;
        let mut items = first.items;

        if page_size > 0 && total > page_size {
            let pages = total.div_ceil(page_size);
            for page in 1..pages {
                let skip = page * page_size;
                let next = self.api.list_children_page(parent_id, kind, skip).await?;
                if next.items.is_empty() {
                    tracing::warn!(
                        parent = parent_id,
                        skip,
                        total,
                        "Remote listing ended before reported total"
                    );
                    break;
                }
                items.extend(next.items);
            }
        }

        tracing::debug!(
            parent = parent_id,
            total,
            fetched = items.len(),
            "Fetched remote children"
        );

        Ok(match changed_after {
            Some(since) => items
                .into_iter()
                .filter(|item| item.changed_since(since))
                .collect(),
            None => items,
        })
    }

    /// Fetch and decode metadata of an item.
    ///
    /// Values are decoded as JSON when possible and kept verbatim otherwise.
    /// With `keys`, only those entries are returned.
    pub async fn fetch_metadata(
        &self,
        item: &RemoteItem,
        keys: Option<&[&str]>,
    ) -> Result<Metadata> {
        let entries = self.api.list_metadata(&item.id).await?;
        Ok(decode_metadata(entries, keys))
    }

    /// Fetch a single item
    pub async fn fetch_item(&self, item_id: &str) -> Result<RemoteItem> {
        self.api.get_item(item_id).await
    }

    /// Hearing folders (`H<number>`) directly under `root_id`
    pub async fn fetch_roots(
        &self,
        root_id: &str,
        changed_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteItem>> {
        let folders = self
            .fetch_children(root_id, Some(ItemKind::Folder), changed_after)
            .await?;
        Ok(folders
            .into_iter()
            .filter(|item| hearing_name_pattern().is_match(&item.name))
            .collect())
    }

    /// Response folders (`HS<number>`) of a hearing, with metadata loaded
    pub async fn fetch_responses(
        &self,
        hearing_id: &str,
        changed_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteItem>> {
        let folders = self
            .fetch_children(hearing_id, Some(ItemKind::Folder), changed_after)
            .await?;

        let mut responses = Vec::new();
        for mut folder in folders {
            if !response_name_pattern().is_match(&folder.name) {
                continue;
            }
            folder.metadata = self.fetch_metadata(&folder, None).await?;
            responses.push(folder);
        }
        Ok(responses)
    }

    /// Files directly inside a folder, unfiltered
    pub async fn fetch_files(&self, folder_id: &str) -> Result<Vec<RemoteItem>> {
        self.fetch_children(folder_id, Some(ItemKind::File), None)
            .await
    }

    /// Download an item's binary content
    pub async fn download(&self, item: &RemoteItem) -> Result<Vec<u8>> {
        self.api.download(&item.id).await
    }

    /// Upload a file into a folder
    pub async fn upload_file(
        &self,
        folder_id: &str,
        file_name: &str,
        contents: Vec<u8>,
        options: UploadOptions,
    ) -> Result<()> {
        let size = contents.len();
        self.api
            .upload(folder_id, file_name, contents, options)
            .await?;
        tracing::info!(folder = folder_id, file_name, size, "Uploaded file");
        Ok(())
    }
}

/// Decode raw metadata entries, keeping undecodable values as strings.
pub fn decode_metadata(entries: Vec<RawMetadatum>, keys: Option<&[&str]>) -> Metadata {
    entries
        .into_iter()
        .filter(|entry| keys.is_none_or(|keys| keys.contains(&entry.name.as_str())))
        .map(|entry| {
            let value = serde_json::from_str::<Value>(&entry.value)
                .unwrap_or_else(|_| Value::String(entry.value.clone()));
            (entry.name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::testing::{folder, FakeRemoteTree};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_children_follows_pages_in_order() {
        let tree = FakeRemoteTree::default().with_page_size(100);
        let children = (0..250)
            .map(|index| folder(&format!("fo-{index}"), &format!("HS{index}"), at(1)))
            .collect::<Vec<_>>();
        tree.add_children("fo-root", children);

        let fetcher = RemoteTreeFetcher::new(tree);
        let items = fetcher
            .fetch_children("fo-root", Some(ItemKind::Folder), None)
            .await
            .unwrap();

        assert_eq!(items.len(), 250);
        assert_eq!(fetcher.api().listing_skips("fo-root"), vec![0, 100, 200]);
        let ids = items.iter().map(|item| item.id.clone()).collect::<Vec<_>>();
        let expected = (0..250).map(|index| format!("fo-{index}")).collect::<Vec<_>>();
        assert_eq!(ids, expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_children_single_page() {
        let tree = FakeRemoteTree::default().with_page_size(100);
        tree.add_children("fo-root", vec![folder("fo-1", "HS1", at(1))]);

        let fetcher = RemoteTreeFetcher::new(tree);
        let items = fetcher.fetch_children("fo-root", None, None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(fetcher.api().listing_skips("fo-root"), vec![0]);

        let empty = fetcher.fetch_children("fo-empty", None, None).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_children_filters_by_watermark_inclusive() {
        let tree = FakeRemoteTree::default();
        tree.add_children(
            "fo-root",
            vec![
                folder("fo-0", "HS0", at(1)),
                folder("fo-1", "HS1", at(2)),
                folder("fo-2", "HS2", at(3)),
            ],
        );

        let fetcher = RemoteTreeFetcher::new(tree);
        let items = fetcher
            .fetch_children("fo-root", None, Some(at(2)))
            .await
            .unwrap();
        let ids = items.iter().map(|item| item.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["fo-1", "fo-2"]);
    }

    #[test]
    fn test_decode_metadata_keeps_raw_strings() {
        let entries = vec![
            RawMetadatum {
                name: "ticket_data".to_string(),
                value: r#"{"department_id": 7}"#.to_string(),
            },
            RawMetadatum {
                name: "note".to_string(),
                value: "{not json".to_string(),
            },
            RawMetadatum {
                name: "count".to_string(),
                value: "12".to_string(),
            },
        ];

        let all = decode_metadata(entries.clone(), None);
        assert_eq!(all["ticket_data"], json!({"department_id": 7}));
        assert_eq!(all["note"], json!("{not json"));
        assert_eq!(all["count"], json!(12));

        let selected = decode_metadata(entries, Some(&["note"]));
        assert_eq!(selected.len(), 1);
        assert!(selected.contains_key("note"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_roots_and_responses_apply_name_patterns() {
        let tree = FakeRemoteTree::default();
        tree.add_children(
            "fo-root",
            vec![
                folder("fo-h1", "H1", at(1)),
                folder("fo-misc", "Misc", at(1)),
                folder("fo-h2", "H2x", at(1)),
            ],
        );
        tree.add_children(
            "fo-h1",
            vec![folder("fo-hs1", "HS1", at(1)), folder("fo-x", "Notes", at(1))],
        );
        tree.set_metadata(
            "fo-hs1",
            vec![("ticket_data", r#"{"department_id": "1"}"#)],
        );

        let fetcher = RemoteTreeFetcher::new(tree);
        let roots = fetcher.fetch_roots("fo-root", None).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, "fo-h1");

        let responses = fetcher.fetch_responses("fo-h1", None).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(
            responses[0].correlation().department_id.as_deref(),
            Some("1")
        );
    }
}
