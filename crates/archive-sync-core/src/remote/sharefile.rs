//! ShareFile REST client.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{multipart, Client, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{ChildrenPage, RawMetadatum, RemoteTreeApi, UploadOptions};
use crate::config::ShareFileSettings;
use crate::error::{Error, Result};
use crate::models::{ItemKind, Metadata, RemoteItem};
use crate::util::compact_text;

/// Refresh the access token this long before it expires
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    api_base_url: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.expires_at - chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) > Utc::now()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    subdomain: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct ListingResponse {
    #[serde(rename = "odata.count", default)]
    count: Option<usize>,
    #[serde(default)]
    value: Vec<ItemPayload>,
}

#[derive(Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    value: Vec<MetadatumPayload>,
}

#[derive(Deserialize)]
struct MetadatumPayload {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value", default)]
    value: Option<String>,
}

#[derive(Deserialize)]
struct UploadSpecification {
    #[serde(rename = "ChunkUri")]
    chunk_uri: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemPayload {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "FileName", default)]
    file_name: Option<String>,
    #[serde(rename = "odata.type", default)]
    odata_type: Option<String>,
    #[serde(rename = "CreationDate", default)]
    creation_date: Option<String>,
    #[serde(rename = "ProgenyEditDate", default)]
    progeny_edit_date: Option<String>,
    #[serde(rename = "Parent", default)]
    parent: Option<ParentPayload>,
}

#[derive(Debug, Deserialize)]
struct ParentPayload {
    #[serde(rename = "Id")]
    id: String,
}

impl ItemPayload {
    /// Map the wire item onto a `RemoteItem`.
    ///
    /// Folders change with their progeny; files with their creation.
    pub(crate) fn into_remote_item(self, fallback_kind: Option<ItemKind>) -> Result<RemoteItem> {
        let kind = self
            .odata_type
            .as_deref()
            .and_then(ItemKind::from_odata_type)
            .or(fallback_kind)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Unsupported item type {:?} for item {}",
                    self.odata_type, self.id
                ))
            })?;

        let created_at = parse_timestamp(self.creation_date.as_deref(), &self.id)?;
        let last_changed_at = match kind {
            ItemKind::Folder => match self.progeny_edit_date.as_deref() {
                Some(value) => parse_timestamp(Some(value), &self.id)?,
                None => created_at,
            },
            ItemKind::File => created_at,
        };

        let name = self
            .name
            .or(self.file_name)
            .unwrap_or_else(|| self.id.clone());

        Ok(RemoteItem {
            id: self.id,
            name,
            kind,
            parent_id: self.parent.map(|parent| parent.id),
            created_at,
            last_changed_at,
            metadata: Metadata::new(),
        })
    }
}

fn parse_timestamp(value: Option<&str>, item_id: &str) -> Result<DateTime<Utc>> {
    let value = value.ok_or_else(|| {
        Error::InvalidInput(format!("Item {item_id} has no creation date"))
    })?;
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            Error::InvalidInput(format!("Invalid timestamp '{value}' on item {item_id}: {error}"))
        })
}

/// ShareFile client authenticating with the OAuth password grant
pub struct ShareFileClient {
    client: Client,
    settings: ShareFileSettings,
    token: Mutex<Option<AccessToken>>,
}

impl ShareFileClient {
    pub fn new(settings: ShareFileSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                Error::Connectivity(format!("Failed to construct HTTP client: {error}"))
            })?;
        Ok(Self {
            client,
            settings,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<AccessToken> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.clone());
        }

        let url = format!("https://{}/oauth/token", self.settings.hostname);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.secret.as_str()),
                ("username", self.settings.username.as_str()),
                ("password", self.settings.password.as_str()),
            ])
            .send()
            .await
            .map_err(|error| Error::Connectivity(format!("Token request failed: {error}")))?;
        let response = check_status(response, "Token request").await?;
        let payload = response.json::<TokenResponse>().await.map_err(|error| {
            Error::Connectivity(format!("Failed to parse token response: {error}"))
        })?;

        let token = AccessToken {
            value: payload.access_token,
            api_base_url: format!("https://{}.sf-api.com/sf/v3", payload.subdomain),
            expires_at: Utc::now() + chrono::Duration::seconds(payload.expires_in.unwrap_or(3600)),
        };
        tracing::debug!(hostname = %self.settings.hostname, "Obtained remote access token");
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn get(&self, path: &str, context: &str) -> Result<Response> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/{path}", token.api_base_url))
            .bearer_auth(&token.value)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| Error::Connectivity(format!("{context} failed: {error}")))?;
        check_status(response, context).await
    }
}

async fn check_status(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!(
        "{context} failed with HTTP {}: {}",
        status.as_u16(),
        compact_text(&body)
    );
    if status == StatusCode::NOT_FOUND {
        Err(Error::NotFound(message))
    } else {
        Err(Error::Connectivity(message))
    }
}

impl RemoteTreeApi for ShareFileClient {
    async fn get_item(&self, item_id: &str) -> Result<RemoteItem> {
        let response = self
            .get(&format!("Items({item_id})"), "Item request")
            .await?;
        let payload = response.json::<ItemPayload>().await?;
        payload.into_remote_item(None)
    }

    async fn list_children_page(
        &self,
        parent_id: &str,
        kind: Option<ItemKind>,
        skip: usize,
    ) -> Result<ChildrenPage> {
        let mut query = vec![format!("$skip={skip}")];
        if let Some(kind) = kind {
            let filter = format!("isof('{}')", kind.odata_type());
            query.insert(0, format!("$filter={}", urlencoding::encode(&filter)));
        }
        let path = format!("Items({parent_id})/Children?{}", query.join("&"));

        let response = self.get(&path, "Children request").await?;
        let payload = response.json::<ListingResponse>().await?;

        let total = payload.count.unwrap_or(payload.value.len());
        let items = payload
            .value
            .into_iter()
            .map(|item| {
                let mut item = item.into_remote_item(kind)?;
                item.parent_id.get_or_insert_with(|| parent_id.to_string());
                Ok(item)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ChildrenPage { items, total })
    }

    async fn list_metadata(&self, item_id: &str) -> Result<Vec<RawMetadatum>> {
        let response = self
            .get(&format!("Items({item_id})/Metadata"), "Metadata request")
            .await?;
        let payload = response.json::<MetadataResponse>().await?;
        Ok(payload
            .value
            .into_iter()
            .map(|entry| RawMetadatum {
                name: entry.name,
                value: entry.value.unwrap_or_default(),
            })
            .collect())
    }

    async fn download(&self, item_id: &str) -> Result<Vec<u8>> {
        let response = self
            .get(&format!("Items({item_id})/Download"), "Download request")
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|error| Error::Connectivity(format!("Failed to read download: {error}")))?;
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        folder_id: &str,
        file_name: &str,
        contents: Vec<u8>,
        options: UploadOptions,
    ) -> Result<()> {
        let path = format!(
            "Items({folder_id})/Upload?method=standard&raw=false&fileName={}&overwrite={}&notify={}",
            urlencoding::encode(file_name),
            options.overwrite,
            options.notify
        );
        let specification = self
            .get(&path, "Upload request")
            .await?
            .json::<UploadSpecification>()
            .await?;

        let part = multipart::Part::bytes(contents).file_name(file_name.to_string());
        let form = multipart::Form::new().part("File1", part);
        let response = self
            .client
            .post(&specification.chunk_uri)
            .multipart(form)
            .send()
            .await
            .map_err(|error| Error::Connectivity(format!("Upload failed: {error}")))?;
        check_status(response, "Upload").await?;
        Ok(())
    }
}
