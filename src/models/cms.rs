//! Newsroom CMS records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Authenticated CMS session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmsSession {
    pub token: String,
    pub user_id: String,
}

/// Desk and stage a draft is routed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskStageRef {
    pub desk_id: String,
    pub stage_id: String,
}

/// Workflow placement written into a draft's `task` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub desk: String,
    pub stage: String,
    pub user: String,
}

impl TaskRef {
    pub fn new(location: &DeskStageRef, session: &CmsSession) -> Self {
        Self {
            desk: location.desk_id.clone(),
            stage: location.stage_id.clone(),
            user: session.user_id.clone(),
        }
    }
}

/// Default shape of a new draft, loaded from an external JSON document.
///
/// The template is otherwise opaque: only `body_html` and the `task`
/// placement are filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftTemplate {
    fields: Map<String, Value>,
}

impl DraftTemplate {
    /// Wrap a parsed JSON document; it must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(AppError::config(format!(
                "draft template must be a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Produce the create payload; the template itself is left untouched.
    pub fn fill(&self, body_html: &str, task: &TaskRef) -> Result<Value> {
        let mut fields = self.fields.clone();
        fields.insert("body_html".into(), Value::String(body_html.to_string()));

        let task_entry = fields
            .entry("task")
            .or_insert_with(|| Value::Object(Map::new()));
        if task_entry.is_null() {
            *task_entry = Value::Object(Map::new());
        }
        let task_fields = task_entry.as_object_mut().ok_or_else(|| {
            AppError::config("draft template field 'task' must be an object")
        })?;
        task_fields.insert("desk".into(), Value::String(task.desk.clone()));
        task_fields.insert("stage".into(), Value::String(task.stage.clone()));
        task_fields.insert("user".into(), Value::String(task.user.clone()));

        Ok(Value::Object(fields))
    }
}

impl Default for DraftTemplate {
    /// A bare text item, for running without a template file.
    fn default() -> Self {
        let mut fields = Map::new();
        fields.insert("type".into(), Value::String("text".into()));
        fields.insert("task".into(), Value::Object(Map::new()));
        Self { fields }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A draft article stored in the CMS.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleDraft {
    pub id: String,
    /// Concurrency token for the next conditional write
    pub etag: String,
    pub body_html: String,
    pub task: TaskRef,
    pub slugline: Option<String>,
    /// Record as last returned by the CMS
    pub record: Value,
}

impl ArticleDraft {
    /// Build a draft from the CMS response to a create call.
    pub fn from_created(record: Value, body_html: &str, task: TaskRef) -> Result<Self> {
        let id = string_field(&record, "_id")?;
        let etag = string_field(&record, "_etag")?;
        let slugline = record
            .get("slugline")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            id,
            etag,
            body_html: body_html.to_string(),
            task,
            slugline,
            record,
        })
    }

    /// Fold a PATCH response and the fields sent with it into this draft.
    pub(crate) fn apply_patch(&mut self, fields: &Map<String, Value>, response: Value) {
        if let Some(etag) = response.get("_etag").and_then(Value::as_str) {
            self.etag = etag.to_string();
        }
        if let Some(slugline) = fields.get("slugline").and_then(Value::as_str) {
            self.slugline = Some(slugline.to_string());
        }
        if let Value::Object(record) = &mut self.record {
            for (key, value) in fields {
                record.insert(key.clone(), value.clone());
            }
            if let Value::Object(returned) = response {
                for (key, value) in returned {
                    record.insert(key, value);
                }
            }
        }
    }
}

fn string_field(record: &Value, key: &str) -> Result<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::upstream("cms", format!("created record has no '{key}'")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn task() -> TaskRef {
        TaskRef {
            desk: "desk-1".into(),
            stage: "stage-9".into(),
            user: "user-7".into(),
        }
    }

    #[test]
    fn test_fill_keeps_template_fields() {
        let template = DraftTemplate::from_value(json!({
            "type": "text",
            "language": "en",
            "task": {"desk": null, "stage": null, "user": null, "extra": 1}
        }))
        .unwrap();

        let payload = template.fill("<p>Hi</p>", &task()).unwrap();
        assert_eq!(payload["body_html"], "<p>Hi</p>");
        assert_eq!(payload["language"], "en");
        assert_eq!(payload["task"]["desk"], "desk-1");
        assert_eq!(payload["task"]["stage"], "stage-9");
        assert_eq!(payload["task"]["user"], "user-7");
        assert_eq!(payload["task"]["extra"], 1);
    }

    #[test]
    fn test_fill_creates_missing_task() {
        let template = DraftTemplate::from_value(json!({"type": "text"})).unwrap();
        let payload = template.fill("", &task()).unwrap();
        assert_eq!(payload["task"]["user"], "user-7");
    }

    #[test]
    fn test_fill_rejects_non_object_task() {
        let template = DraftTemplate::from_value(json!({"task": "desk-1"})).unwrap();
        assert!(template.fill("", &task()).is_err());
    }

    #[test]
    fn test_template_must_be_object() {
        assert!(DraftTemplate::from_value(json!(["x"])).is_err());
        assert!(DraftTemplate::from_slice(b"{\"type\": \"text\"}").is_ok());
    }

    #[test]
    fn test_draft_from_created_requires_etag() {
        let result = ArticleDraft::from_created(json!({"_id": "a1"}), "", task());
        assert!(matches!(result, Err(AppError::Upstream { .. })));
    }

    #[test]
    fn test_apply_patch_updates_etag_and_slugline() {
        let mut draft =
            ArticleDraft::from_created(json!({"_id": "a1", "_etag": "123"}), "<p/>", task())
                .unwrap();
        let mut fields = Map::new();
        fields.insert("slugline".into(), json!("typhoon"));

        draft.apply_patch(&fields, json!({"_id": "a1", "_etag": "456", "_status": "OK"}));

        assert_eq!(draft.etag, "456");
        assert_eq!(draft.slugline.as_deref(), Some("typhoon"));
        assert_eq!(draft.record["slugline"], "typhoon");
        assert_eq!(draft.record["_status"], "OK");
    }
}
