use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;

const NOTION_VERSION: &str = "2022-06-28";

/// Where a page lives. Anything other than a database parent is outside the
/// pipeline's interest.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Parent {
    DatabaseId { database_id: String },
    PageId { page_id: String },
    Workspace {},
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RichText {
    pub plain_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectOption {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateValue {
    pub start: String,
}

/// Tagged-union decoding of the heterogeneous property bag. Kinds the
/// pipeline does not understand decode to `Unrecognized` and are rejected by
/// the accessors instead of silently reading as null.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title { title: Vec<RichText> },
    RichText { rich_text: Vec<RichText> },
    Number { number: Option<f64> },
    Select { select: Option<SelectOption> },
    Date { date: Option<DateValue> },
    Url { url: Option<String> },
    #[serde(other)]
    Unrecognized,
}

impl PropertyValue {
    fn kind(&self) -> &'static str {
        match self {
            PropertyValue::Title { .. } => "title",
            PropertyValue::RichText { .. } => "rich_text",
            PropertyValue::Number { .. } => "number",
            PropertyValue::Select { .. } => "select",
            PropertyValue::Date { .. } => "date",
            PropertyValue::Url { .. } => "url",
            PropertyValue::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("property `{name}` is missing")]
    Missing { name: String },
    #[error("property `{name}` is a {found}, expected {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("property `{name}` has no value")]
    Empty { name: String },
    #[error("property `{name}` has an invalid date `{value}`")]
    BadDate { name: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub parent: Option<Parent>,
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

impl Page {
    pub fn parent_database_id(&self) -> Option<&str> {
        match &self.parent {
            Some(Parent::DatabaseId { database_id }) => Some(database_id),
            _ => None,
        }
    }

    fn property<'a>(&'a self, name: &str) -> Result<&'a PropertyValue, PropertyError> {
        self.properties.get(name).ok_or_else(|| PropertyError::Missing {
            name: name.to_string(),
        })
    }

    fn wrong_kind(name: &str, expected: &'static str, value: &PropertyValue) -> PropertyError {
        PropertyError::WrongKind {
            name: name.to_string(),
            expected,
            found: value.kind(),
        }
    }

    pub fn title(&self, name: &str) -> Result<&str, PropertyError> {
        match self.property(name)? {
            PropertyValue::Title { title } => title
                .first()
                .map(|t| t.plain_text.as_str())
                .ok_or_else(|| PropertyError::Empty {
                    name: name.to_string(),
                }),
            other => Err(Self::wrong_kind(name, "title", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, PropertyError> {
        match self.property(name)? {
            PropertyValue::RichText { rich_text } => rich_text
                .first()
                .map(|t| t.plain_text.as_str())
                .ok_or_else(|| PropertyError::Empty {
                    name: name.to_string(),
                }),
            other => Err(Self::wrong_kind(name, "rich_text", other)),
        }
    }

    pub fn number(&self, name: &str) -> Result<f64, PropertyError> {
        match self.property(name)? {
            PropertyValue::Number { number } => number.ok_or_else(|| PropertyError::Empty {
                name: name.to_string(),
            }),
            other => Err(Self::wrong_kind(name, "number", other)),
        }
    }

    pub fn select(&self, name: &str) -> Result<&str, PropertyError> {
        match self.property(name)? {
            PropertyValue::Select { select } => select
                .as_ref()
                .map(|s| s.name.as_str())
                .ok_or_else(|| PropertyError::Empty {
                    name: name.to_string(),
                }),
            other => Err(Self::wrong_kind(name, "select", other)),
        }
    }

    /// Like `select`, but an absent property or empty select reads as `None`.
    /// The kind is still enforced when the property is present.
    pub fn select_opt(&self, name: &str) -> Result<Option<&str>, PropertyError> {
        match self.properties.get(name) {
            None => Ok(None),
            Some(PropertyValue::Select { select }) => {
                Ok(select.as_ref().map(|s| s.name.as_str()))
            }
            Some(other) => Err(Self::wrong_kind(name, "select", other)),
        }
    }

    pub fn date(&self, name: &str) -> Result<NaiveDateTime, PropertyError> {
        match self.property(name)? {
            PropertyValue::Date { date } => {
                let value = date.as_ref().ok_or_else(|| PropertyError::Empty {
                    name: name.to_string(),
                })?;
                parse_page_date(&value.start).ok_or_else(|| PropertyError::BadDate {
                    name: name.to_string(),
                    value: value.start.clone(),
                })
            }
            other => Err(Self::wrong_kind(name, "date", other)),
        }
    }

    pub fn url(&self, name: &str) -> Result<&str, PropertyError> {
        match self.property(name)? {
            PropertyValue::Url { url } => {
                url.as_deref().ok_or_else(|| PropertyError::Empty {
                    name: name.to_string(),
                })
            }
            other => Err(Self::wrong_kind(name, "url", other)),
        }
    }
}

/// Pages carry either a full RFC 3339 timestamp or a bare date.
fn parse_page_date(value: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Document-store collaborator. The workspace token is passed per call
/// because every wallet's workspace carries its own.
#[async_trait]
pub trait PageStore: Send + Sync {
    async fn retrieve_page(&self, token: &str, page_id: &str) -> anyhow::Result<Page>;

    /// Writes select-kind properties, used for the status mirror and for
    /// terminal-state reconciliation.
    async fn update_select_properties(
        &self,
        token: &str,
        page_id: &str,
        properties: &[(&str, &str)],
    ) -> anyhow::Result<()>;

    async fn create_page(
        &self,
        token: &str,
        database_id: &str,
        properties: serde_json::Value,
    ) -> anyhow::Result<Page>;

    async fn query_recent_pages(
        &self,
        token: &str,
        database_id: &str,
        page_size: u32,
    ) -> anyhow::Result<Vec<Page>>;
}

pub struct NotionApi {
    http: reqwest::Client,
    base_url: String,
}

impl NotionApi {
    pub fn new(base_url: &str) -> Self {
        NotionApi {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn check(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(anyhow::anyhow!("document store returned {status}: {body}"))
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<Page>,
}

#[async_trait]
impl PageStore for NotionApi {
    async fn retrieve_page(&self, token: &str, page_id: &str) -> anyhow::Result<Page> {
        let response = self
            .http
            .get(format!("{}/v1/pages/{page_id}", self.base_url))
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .with_context(|| format!("Failed to retrieve page {page_id}"))?;
        let page = Self::check(response)
            .await?
            .json::<Page>()
            .await
            .with_context(|| format!("Failed to decode page {page_id}"))?;
        Ok(page)
    }

    async fn update_select_properties(
        &self,
        token: &str,
        page_id: &str,
        properties: &[(&str, &str)],
    ) -> anyhow::Result<()> {
        let mut body = serde_json::Map::new();
        for (name, value) in properties {
            body.insert(name.to_string(), json!({ "select": { "name": value } }));
        }
        let response = self
            .http
            .patch(format!("{}/v1/pages/{page_id}", self.base_url))
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({ "properties": body }))
            .send()
            .await
            .with_context(|| format!("Failed to update page {page_id}"))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_page(
        &self,
        token: &str,
        database_id: &str,
        properties: serde_json::Value,
    ) -> anyhow::Result<Page> {
        let response = self
            .http
            .post(format!("{}/v1/pages", self.base_url))
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({
                "parent": { "database_id": database_id },
                "properties": properties,
            }))
            .send()
            .await
            .with_context(|| format!("Failed to create page in {database_id}"))?;
        let page = Self::check(response)
            .await?
            .json::<Page>()
            .await
            .context("Failed to decode created page")?;
        Ok(page)
    }

    async fn query_recent_pages(
        &self,
        token: &str,
        database_id: &str,
        page_size: u32,
    ) -> anyhow::Result<Vec<Page>> {
        let response = self
            .http
            .post(format!("{}/v1/databases/{database_id}/query", self.base_url))
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({ "page_size": page_size }))
            .send()
            .await
            .with_context(|| format!("Failed to query database {database_id}"))?;
        let decoded = Self::check(response)
            .await?
            .json::<QueryResponse>()
            .await
            .with_context(|| format!("Failed to decode query results for {database_id}"))?;
        Ok(decoded.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> Page {
        serde_json::from_value(serde_json::json!({
            "id": "page-1",
            "parent": { "type": "database_id", "database_id": "db-sched" },
            "properties": {
                "Transaction Name": { "type": "title", "title": [{ "plain_text": "Rent" }] },
                "To Address": { "type": "rich_text", "rich_text": [{ "plain_text": "0xABC" }] },
                "Amount": { "type": "number", "number": 10.0 },
                "Schedule Date": { "type": "date", "date": { "start": "2025-06-01T10:00:00.000+00:00" } },
                "Admin Status": { "type": "select", "select": { "name": "Approved" } },
                "Operata Status": { "type": "select", "select": null },
                "Receipt": { "type": "url", "url": null },
                "Rollup": { "type": "rollup", "rollup": {} }
            }
        }))
        .unwrap()
    }

    #[test]
    fn decodes_each_property_kind() {
        let page = sample_page();
        assert_eq!(page.parent_database_id(), Some("db-sched"));
        assert_eq!(page.title("Transaction Name").unwrap(), "Rent");
        assert_eq!(page.text("To Address").unwrap(), "0xABC");
        assert_eq!(page.number("Amount").unwrap(), 10.0);
        assert_eq!(page.select("Admin Status").unwrap(), "Approved");
        assert_eq!(
            page.date("Schedule Date").unwrap().to_string(),
            "2025-06-01 10:00:00"
        );
    }

    #[test]
    fn empty_and_missing_values_are_distinct_errors() {
        let page = sample_page();
        assert!(matches!(
            page.select("Operata Status"),
            Err(PropertyError::Empty { .. })
        ));
        assert_eq!(page.select_opt("Operata Status").unwrap(), None);
        assert_eq!(page.select_opt("Nonexistent").unwrap(), None);
        assert!(matches!(
            page.url("Receipt"),
            Err(PropertyError::Empty { .. })
        ));
        assert!(matches!(
            page.title("Nonexistent"),
            Err(PropertyError::Missing { .. })
        ));
    }

    #[test]
    fn unrecognized_kinds_are_rejected_not_null() {
        let page = sample_page();
        assert!(matches!(
            page.properties.get("Rollup"),
            Some(PropertyValue::Unrecognized)
        ));
        assert!(matches!(
            page.text("Rollup"),
            Err(PropertyError::WrongKind { found: "unrecognized", .. })
        ));
    }

    #[test]
    fn wrong_kind_names_both_sides() {
        let page = sample_page();
        let err = page.number("To Address").unwrap_err();
        assert!(matches!(
            err,
            PropertyError::WrongKind { expected: "number", found: "rich_text", .. }
        ));
    }

    #[test]
    fn date_only_values_parse_at_midnight() {
        assert_eq!(
            parse_page_date("2025-06-01").unwrap().to_string(),
            "2025-06-01 00:00:00"
        );
        assert!(parse_page_date("yesterday").is_none());
    }

    #[test]
    fn non_database_parents_have_no_container() {
        let page: Page = serde_json::from_value(serde_json::json!({
            "id": "page-2",
            "parent": { "type": "workspace", "workspace": true },
            "properties": {}
        }))
        .unwrap();
        assert_eq!(page.parent_database_id(), None);
    }
}
