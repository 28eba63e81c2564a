// src/services/trends.rs

//! Trending topics feed.

use std::cmp::Ordering;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::models::TrendsConfig;
use crate::utils::http::read_text;
use crate::utils::scalar_to_string;

/// Fields tried, in order, when picking a topic's display label.
const LABEL_FIELDS: [&str; 5] = ["title", "query", "keyword", "name", "topic"];

/// One row of the trends feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingTopic {
    pub fields: Map<String, Value>,
}

impl TrendingTopic {
    /// Best display label for the topic.
    pub fn label(&self) -> Option<&str> {
        LABEL_FIELDS
            .iter()
            .find_map(|key| self.fields.get(*key).and_then(Value::as_str))
    }

    /// Every field except the one used as the label, as display text.
    pub fn details(&self) -> Vec<(&str, String)> {
        let label_field = LABEL_FIELDS
            .iter()
            .find(|key| self.fields.get(**key).and_then(Value::as_str).is_some());
        self.fields
            .iter()
            .filter(|(name, _)| label_field.is_none_or(|field| *field != name.as_str()))
            .map(|(name, value)| {
                let text = scalar_to_string(value).unwrap_or_else(|| value.to_string());
                (name.as_str(), text)
            })
            .collect()
    }
}

/// Client for the trending topics feed.
pub struct TrendsClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl TrendsClient {
    pub fn new(client: Client, config: &TrendsConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Fetch the current topics.
    pub async fn fetch(&self) -> Result<Vec<TrendingTopic>> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;
        let body = read_text("trends", response).await?;
        let payload: Value = serde_json::from_str(&body)?;
        let topics = into_rows(payload)?;
        log::debug!("Fetched {} trending topics", topics.len());
        Ok(topics)
    }
}

/// Normalize the feed into rows.
///
/// The feed is either a list of records, a list of plain strings, or a
/// column-oriented object (`{"title": [...], "traffic": [...]}`).
fn into_rows(payload: Value) -> Result<Vec<TrendingTopic>> {
    match payload {
        Value::Array(items) => Ok(items.into_iter().map(row_from_item).collect()),
        Value::Object(columns) => {
            if let Some(Value::Array(items)) = columns.get("data") {
                return Ok(items.iter().cloned().map(row_from_item).collect());
            }
            let index = row_index(&columns);
            let rows = index
                .iter()
                .enumerate()
                .map(|(position, key)| {
                    let fields = columns
                        .iter()
                        .filter_map(|(name, column)| {
                            let cell = match column {
                                Value::Array(cells) => cells.get(position).cloned(),
                                Value::Object(cells) => cells.get(key).cloned(),
                                scalar => Some(scalar.clone()),
                            };
                            cell.map(|c| (name.clone(), c))
                        })
                        .collect();
                    TrendingTopic { fields }
                })
                .collect();
            Ok(rows)
        }
        other => Err(AppError::upstream(
            "trends",
            format!("unexpected feed shape: {other}"),
        )),
    }
}

/// Row keys of a column-oriented feed, in row order.
///
/// Columns keyed by row (`{"title": {"0": .., "1": ..}}`) are ordered by
/// numeric value where the key is a number, so row 10 follows row 9.
/// Array columns contribute positional keys.
fn row_index(columns: &Map<String, Value>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut height = 0;
    for column in columns.values() {
        match column {
            Value::Object(cells) => {
                for key in cells.keys() {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
            }
            Value::Array(cells) => height = height.max(cells.len()),
            _ => height = height.max(1),
        }
    }
    for position in 0..height {
        let key = position.to_string();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    keys.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
    keys
}

fn row_from_item(item: Value) -> TrendingTopic {
    let fields = match item {
        Value::Object(fields) => fields,
        other => {
            let mut fields = Map::new();
            fields.insert("title".into(), other);
            fields
        }
    };
    TrendingTopic { fields }
}
