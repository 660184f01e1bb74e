//! Google Sheets v4 REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::json;

use super::{Row, SheetError, SheetService};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Authorized client for a single spreadsheet.
pub struct GoogleSheets {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GoogleSheets {
    pub fn new(
        spreadsheet_id: &str,
        access_token: &str,
        app_name: &str,
    ) -> Result<Self, SheetError> {
        let client = Client::builder()
            .user_agent(app_name)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            access_token: access_token.to_string(),
        })
    }

    /// Point the client at a different API root (e.g. a local stub server).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// `{base}/{spreadsheet_id}{suffix}` followed by each of `segments`,
    /// percent-encoded.
    fn url(&self, suffix: &str, segments: &[&str]) -> Result<Url, SheetError> {
        let mut url = Url::parse(&format!("{}/", self.base_url))
            .map_err(|_| SheetError::BaseUrl(self.base_url.clone()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SheetError::BaseUrl(self.base_url.clone()))?;
            path.pop_if_empty();
            path.push(&format!("{}{}", self.spreadsheet_id, suffix));
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SheetError> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status.as_u16(), &body))
    }
}

/// Build a [`SheetError::Api`] from a non-success response body, preferring
/// the message inside Google's `{"error": {...}}` envelope.
pub(crate) fn api_error(status: u16, body: &str) -> SheetError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => match env.error.status {
            Some(code) => format!("{} ({})", env.error.message, code),
            None => env.error.message,
        },
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response body".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        }
    };
    SheetError::Api { status, message }
}

#[async_trait]
impl SheetService for GoogleSheets {
    async fn sheet_titles(&self) -> Result<Vec<String>, SheetError> {
        let url = self.url("", &[])?;
        let request = self
            .client
            .get(url)
            .query(&[("fields", "sheets.properties.title")]);
        let spreadsheet: Spreadsheet = self.send(request).await?.json().await?;
        Ok(spreadsheet
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    async fn add_sheet(&self, title: &str) -> Result<(), SheetError> {
        let url = self.url(":batchUpdate", &[])?;
        let body = json!({
            "requests": [
                { "addSheet": { "properties": { "title": title } } }
            ]
        });
        self.send(self.client.post(url).json(&body)).await?;
        tracing::debug!(%title, "added sheet");
        Ok(())
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Row>, SheetError> {
        let url = self.url("", &["values", range])?;
        let values: ValueRange = self.send(self.client.get(url)).await?.json().await?;
        Ok(values.values)
    }

    async fn append_values(&self, range: &str, rows: Vec<Row>) -> Result<(), SheetError> {
        let target = format!("{}:append", range);
        let url = self.url("", &["values", target.as_str()])?;
        let request = self
            .client
            .post(url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "OVERWRITE"),
            ])
            .json(&json!({ "values": rows }));
        self.send(request).await?;
        Ok(())
    }

    async fn clear_values(&self, range: &str) -> Result<(), SheetError> {
        let target = format!("{}:clear", range);
        let url = self.url("", &["values", target.as_str()])?;
        self.send(self.client.post(url).json(&json!({}))).await?;
        Ok(())
    }
}
