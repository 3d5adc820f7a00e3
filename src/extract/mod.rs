//! Extraction of text fragments from a conversation-flow JSON document.
//!
//! The document is an object with a `nodes` map. Each pass below walks the
//! nodes of one kind and turns the user-visible strings into [`Fragment`]s,
//! which are appended to the extraction store with deduplication. Running
//! extraction again over the same document adds nothing.

mod html;

use std::io::Write;
use std::path::Path;

use serde_json::{Map, Value};

use crate::errors::ExtractError;
use crate::store::{Fragment, MessageRow, RowStore};

/// One extraction pass, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Message,
    QuickReply,
    Card,
    List,
    Email,
    OtherErrors,
}

impl Pass {
    pub const ALL: [Pass; 6] = [
        Pass::Message,
        Pass::QuickReply,
        Pass::Card,
        Pass::List,
        Pass::Email,
        Pass::OtherErrors,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::QuickReply => "SELECTION/QUICKREPLY",
            Self::Card => "SELECTION/CARD",
            Self::List => "SELECTION/LIST",
            Self::Email => "EMAIL",
            Self::OtherErrors => "OTHER ERROR MESSAGES",
        }
    }

    /// Fragments this pass produces for the given nodes.
    pub fn collect(&self, nodes: &Map<String, Value>) -> Vec<Fragment> {
        let mut out = Vec::new();
        for (key, value) in nodes {
            let Some(obj) = value.as_object() else {
                continue;
            };
            let node = Node { key, obj };
            match self {
                Self::Message if node.kind() == "MESSAGE" => message_fragments(&node, &mut out),
                Self::QuickReply if node.is_selection("QUICKREPLY") => {
                    quickreply_fragments(&node, &mut out)
                }
                Self::Card if node.is_selection("CARD") => card_fragments(&node, &mut out),
                Self::List if node.is_selection("LIST") => list_fragments(&node, &mut out),
                Self::Email if node.kind() == "EMAIL" => email_fragments(&node, &mut out),
                Self::OtherErrors if !matches!(node.kind(), "MESSAGE" | "SELECTION") => {
                    other_error_fragments(&node, &mut out)
                }
                _ => {}
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub before: usize,
    pub after: usize,
    pub failed_passes: usize,
}

impl ExtractSummary {
    pub fn added(&self) -> usize {
        self.after.saturating_sub(self.before)
    }
}

/// Read the source document and return its `nodes` map.
pub fn load_nodes(path: &Path) -> Result<Map<String, Value>, ExtractError> {
    let content = std::fs::read_to_string(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Value = serde_json::from_str(&content).map_err(|source| ExtractError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match doc.get("nodes") {
        Some(Value::Object(nodes)) => Ok(nodes.clone()),
        _ => Err(ExtractError::MissingNodes),
    }
}

/// Run every pass against `source` and append new fragments to `store`,
/// reporting each pass on `out`. A failing pass is reported and does not
/// stop the remaining ones.
pub fn build_messages<W: Write>(
    source: &Path,
    store: &RowStore<MessageRow>,
    out: &mut W,
) -> Result<ExtractSummary, ExtractError> {
    let nodes = load_nodes(source)?;
    store.ensure_header()?;
    let mut summary = ExtractSummary {
        before: store.load()?.len(),
        ..Default::default()
    };

    for pass in Pass::ALL {
        match store.append_all(pass.collect(&nodes)) {
            Ok(appended) => {
                let _ = writeln!(out, "[extract] {}: {} new rows", pass.label(), appended.inserted);
            }
            Err(e) => {
                summary.failed_passes += 1;
                let _ = writeln!(out, "[extract] {} failed: {}", pass.label(), e);
            }
        }
    }

    summary.after = store.load()?.len();
    let _ = writeln!(
        out,
        "[extract] Done. {} new rows ({} -> {}) in {}",
        summary.added(),
        summary.before,
        summary.after,
        store.path().display()
    );
    Ok(summary)
}

// ── Node helpers ──────────────────────────────────────────────────────

struct Node<'a> {
    key: &'a str,
    obj: &'a Map<String, Value>,
}

impl<'a> Node<'a> {
    fn kind(&self) -> &'a str {
        self.obj.get("type").and_then(Value::as_str).unwrap_or("")
    }

    fn is_selection(&self, selection_type: &str) -> bool {
        self.kind() == "SELECTION" && raw_str(self.obj, "selectionType") == Some(selection_type)
    }

    fn id(&self) -> String {
        match self.obj.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => self.key.to_string(),
        }
    }

    fn name(&self) -> String {
        raw_str(self.obj, "name").unwrap_or("").to_string()
    }

    fn fragment(&self, module_type: &str, source: &str, text: String) -> Fragment {
        Fragment {
            node_id: self.id(),
            node_name: self.name(),
            node_type: self.kind().to_string(),
            module_type: module_type.to_string(),
            source: source.to_string(),
            text,
        }
    }
}

fn raw_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    obj.get(field).and_then(Value::as_str)
}

/// Trimmed string field, `None` when absent, not a string or blank.
fn text_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    raw_str(obj, field)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn objects<'a>(value: Option<&'a Value>) -> impl Iterator<Item = &'a Map<String, Value>> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn push_field(
    out: &mut Vec<Fragment>,
    node: &Node<'_>,
    module_type: &str,
    obj: &Map<String, Value>,
    field: &str,
    source: &str,
) {
    if let Some(text) = text_field(obj, field) {
        out.push(node.fragment(module_type, source, text));
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ── Passes ────────────────────────────────────────────────────────────

/// Every payload entry is a row; a node without payloads still gets one
/// row with empty text so it shows up in the report.
fn message_fragments(node: &Node<'_>, out: &mut Vec<Fragment>) {
    let module_type = raw_str(node.obj, "messageType").unwrap_or("");
    let texts: Vec<String> = match node.obj.get("payloads") {
        Some(Value::Array(items)) if !items.is_empty() => items.iter().map(scalar_text).collect(),
        Some(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => vec![scalar_text(v)],
        _ => vec![String::new()],
    };
    for text in texts {
        out.push(node.fragment(module_type, module_type, text));
    }
}

fn quickreply_fragments(node: &Node<'_>, out: &mut Vec<Fragment>) {
    let module_type = "QUICKREPLY";
    for payload in objects(node.obj.get("payloads")) {
        if let Some(text) = text_field(payload, "text") {
            out.push(node.fragment(module_type, &button_source(payload), text));
        }
    }
    push_field(out, node, module_type, node.obj, "prompt", "PROMPT");
    push_field(out, node, module_type, node.obj, "errorMessage", "ERRORMESSAGE");
}

fn card_fragments(node: &Node<'_>, out: &mut Vec<Fragment>) {
    let module_type = "CARD";
    for card in objects(node.obj.get("payloads")) {
        for button in objects(card.get("buttons")) {
            if let Some(text) = text_field(button, "text") {
                out.push(node.fragment(module_type, &button_source(button), text));
            }
        }
        push_field(out, node, module_type, card, "title", "CARD/TITLE");
        push_field(out, node, module_type, card, "subtitle", "CARD/SUBTITLE");
        push_field(out, node, module_type, card, "text", "CARD/TEXT");
    }
    push_field(out, node, module_type, node.obj, "errorMessage", "ERRORMESSAGE");
}

fn list_fragments(node: &Node<'_>, out: &mut Vec<Fragment>) {
    let module_type = "LIST";
    list_box_fields(node, module_type, node.obj, out);
    for section in objects(node.obj.get("payloads")) {
        push_field(out, node, module_type, section, "listSectionTitle", "LIST/SECTION/TITLE");
        let rows = section.get("listCardRow").or_else(|| section.get("lisrCardRow"));
        for row in objects(rows) {
            push_field(out, node, module_type, row, "listRowTitle", "LIST/ROW/TITLE");
            push_field(out, node, module_type, row, "listRowDescription", "LIST/ROW/DESCRIPTION");
        }
        list_box_fields(node, module_type, section, out);
    }
    push_field(out, node, module_type, node.obj, "errorMessage", "ERRORMESSAGE");
}

fn list_box_fields(
    node: &Node<'_>,
    module_type: &str,
    obj: &Map<String, Value>,
    out: &mut Vec<Fragment>,
) {
    push_field(out, node, module_type, obj, "messageBoxOptionsButtonText", "BUTTON/TEXT");
    push_field(out, node, module_type, obj, "messageBoxBody", "LIST/MESSAGE");
    push_field(out, node, module_type, obj, "listHeader", "LIST/HEADER");
}

fn email_fragments(node: &Node<'_>, out: &mut Vec<Fragment>) {
    let module_type = text_field(node.obj, "emailType").unwrap_or_else(|| node.kind().to_string());
    push_field(out, node, &module_type, node.obj, "emailSubject", "EMAIL/SUBJECT");
    if let Some(body) = raw_str(node.obj, "emailTemplate") {
        let clean = html::to_plain_text(body);
        if !clean.is_empty() {
            out.push(node.fragment(&module_type, "EMAIL/BODY", clean));
        }
    }
}

fn other_error_fragments(node: &Node<'_>, out: &mut Vec<Fragment>) {
    let module_type = ["inputType", "messageType", "selectionType", "moduleType"]
        .iter()
        .find_map(|f| text_field(node.obj, f))
        .unwrap_or_else(|| node.kind().to_string());
    push_field(out, node, &module_type, node.obj, "errorMessage", "ERRORMESSAGE");
}

fn button_source(obj: &Map<String, Value>) -> String {
    match text_field(obj, "type") {
        Some(kind) => format!("BUTTON/{}", kind),
        None => "BUTTON".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn nodes(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn pairs(fragments: &[Fragment]) -> Vec<(String, String)> {
        fragments
            .iter()
            .map(|f| (f.source.clone(), f.text.clone()))
            .collect()
    }

    fn sample_document() -> Value {
        json!({
            "nodes": {
                "k1": {"id": "m1", "type": "MESSAGE", "name": "Welcome", "messageType": "TEXT",
                       "payloads": ["Merhaba!", "  Hoş geldiniz  "]},
                "k2": {"type": "MESSAGE", "name": "Empty", "messageType": "TEXT"},
                "k3": {"id": "q1", "type": "SELECTION", "selectionType": "QUICKREPLY", "name": "Ask",
                       "payloads": [{"text": "Evet", "type": "POSTBACK"}, {"text": "Hayır"}],
                       "prompt": "Devam edelim mi?", "errorMessage": "Lütfen seçin."},
                "k4": {"id": "i1", "type": "INPUT", "inputType": "PHONE", "errorMessage": "Geçersiz numara"}
            }
        })
    }

    #[test]
    fn test_message_payload_forms() {
        let n = nodes(json!({
            "a": {"id": "m1", "type": "MESSAGE", "messageType": "TEXT", "payloads": ["x", " y "]},
            "b": {"id": "m2", "type": "MESSAGE", "messageType": "TEXT", "payloads": "single"},
            "c": {"type": "MESSAGE", "messageType": "TEXT", "payloads": []}
        }));
        let out = Pass::Message.collect(&n);
        let texts: Vec<&str> = out.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["x", "y", "single", ""]);
        assert_eq!(out[0].source, "TEXT");
        assert_eq!(out[0].module_type, "TEXT");
        // node id falls back to the map key
        assert_eq!(out[3].node_id, "c");
    }

    #[test]
    fn test_quickreply_fields() {
        let n = nodes(sample_document()["nodes"].clone());
        let out = Pass::QuickReply.collect(&n);
        assert_eq!(
            pairs(&out),
            vec![
                ("BUTTON/POSTBACK".into(), "Evet".into()),
                ("BUTTON".into(), "Hayır".into()),
                ("PROMPT".into(), "Devam edelim mi?".into()),
                ("ERRORMESSAGE".into(), "Lütfen seçin.".into()),
            ]
        );
        assert!(out.iter().all(|f| f.module_type == "QUICKREPLY"));
    }

    #[test]
    fn test_card_fields() {
        let n = nodes(json!({
            "c": {"id": "c1", "type": "SELECTION", "selectionType": "CARD",
                  "payloads": [{"title": "Kampanya", "subtitle": "Yeni", "text": "Detay",
                                "buttons": [{"text": "İncele", "type": "URL"}, {"text": " "}]}],
                  "errorMessage": "Hata"}
        }));
        assert_eq!(
            pairs(&Pass::Card.collect(&n)),
            vec![
                ("BUTTON/URL".into(), "İncele".into()),
                ("CARD/TITLE".into(), "Kampanya".into()),
                ("CARD/SUBTITLE".into(), "Yeni".into()),
                ("CARD/TEXT".into(), "Detay".into()),
                ("ERRORMESSAGE".into(), "Hata".into()),
            ]
        );
    }

    #[test]
    fn test_list_fields_including_misspelt_rows() {
        let n = nodes(json!({
            "l": {"id": "l1", "type": "SELECTION", "selectionType": "LIST",
                  "listHeader": "Mağazalar", "messageBoxBody": "Seçiniz",
                  "messageBoxOptionsButtonText": "Liste",
                  "payloads": [
                      {"listSectionTitle": "Giyim",
                       "lisrCardRow": [{"listRowTitle": "Mavi", "listRowDescription": "Kat 1"}]}
                  ]}
        }));
        assert_eq!(
            pairs(&Pass::List.collect(&n)),
            vec![
                ("BUTTON/TEXT".into(), "Liste".into()),
                ("LIST/MESSAGE".into(), "Seçiniz".into()),
                ("LIST/HEADER".into(), "Mağazalar".into()),
                ("LIST/SECTION/TITLE".into(), "Giyim".into()),
                ("LIST/ROW/TITLE".into(), "Mavi".into()),
                ("LIST/ROW/DESCRIPTION".into(), "Kat 1".into()),
            ]
        );
    }

    #[test]
    fn test_email_body_is_plain_text() {
        let n = nodes(json!({
            "e": {"id": "e1", "type": "EMAIL", "emailSubject": " Rezervasyon ",
                  "emailTemplate": "<p>Merhaba&nbsp;<b>Ali</b>,</p>\n<p>Te&#351;ekk&uuml;rler &amp; iyi g&uuml;nler</p>"}
        }));
        let out = Pass::Email.collect(&n);
        assert_eq!(
            pairs(&out),
            vec![
                ("EMAIL/SUBJECT".into(), "Rezervasyon".into()),
                ("EMAIL/BODY".into(), "Merhaba Ali , Teşekkürler & iyi günler".into()),
            ]
        );
        assert_eq!(out[0].module_type, "EMAIL");
    }

    #[test]
    fn test_other_error_messages_module_type_fallback() {
        let n = nodes(json!({
            "a": {"id": "i1", "type": "INPUT", "inputType": "PHONE", "errorMessage": "Geçersiz"},
            "b": {"id": "x1", "type": "API", "errorMessage": "Servis hatası"},
            "c": {"id": "s1", "type": "SELECTION", "errorMessage": "skip"}
        }));
        let out = Pass::OtherErrors.collect(&n);
        let modules: Vec<&str> = out.iter().map(|f| f.module_type.as_str()).collect();
        assert_eq!(modules, vec!["PHONE", "API"]);
    }

    #[test]
    fn test_build_messages_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("flow.json");
        std::fs::write(&source, sample_document().to_string()).unwrap();
        let store = RowStore::<MessageRow>::new(dir.path().join("out/messages.csv"));

        let mut out = Vec::new();
        let first = build_messages(&source, &store, &mut out).unwrap();
        assert_eq!(first.before, 0);
        assert_eq!(first.after, 8);
        assert_eq!(first.failed_passes, 0);
        let log = String::from_utf8(out).unwrap();
        assert!(log.contains("[extract] MESSAGE: 3 new rows"));
        assert!(log.contains("[extract] OTHER ERROR MESSAGES: 1 new rows"));

        let bytes_before = std::fs::read(store.path()).unwrap();
        let mut out = Vec::new();
        let second = build_messages(&source, &store, &mut out).unwrap();
        assert_eq!(second.added(), 0);
        assert_eq!(std::fs::read(store.path()).unwrap(), bytes_before);
    }

    #[test]
    fn test_missing_nodes_is_an_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("flow.json");
        std::fs::write(&source, r#"{"flows": []}"#).unwrap();
        let store = RowStore::<MessageRow>::new(dir.path().join("m.csv"));
        let err = build_messages(&source, &store, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ExtractError::MissingNodes));
    }

    #[test]
    fn test_unreadable_source_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = RowStore::<MessageRow>::new(dir.path().join("m.csv"));
        let err = build_messages(&dir.path().join("nope.json"), &store, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ExtractError::Read { .. }));
    }
}
