//! Conversions between chunks and Qdrant points.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{ListValue, PointId, Struct, Value as QdrantValue};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use ragway_core::types::{Chunk, ChunkMetadata, Cursor};

/// Qdrant only accepts integers and UUIDs as point ids, so chunk ids are
/// mapped onto a name-based UUID that is stable per `(collection, chunk)`.
pub fn point_id(collection_id: &str, chunk_id: &str) -> PointId {
    let name = format!("{collection_id}/{chunk_id}");
    PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string())
}

pub fn cursor_from_point(id: PointId) -> Option<Cursor> {
    match id.point_id_options? {
        PointIdOptions::Uuid(uuid) => Some(Cursor::Opaque(uuid)),
        PointIdOptions::Num(n) => Some(Cursor::Opaque(n.to_string())),
    }
}

pub fn point_from_cursor(cursor: Cursor) -> PointId {
    match cursor {
        Cursor::Numeric(n) => PointId::from(n),
        Cursor::Opaque(token) => match token.parse::<u64>() {
            Ok(n) => PointId::from(n),
            Err(_) => PointId::from(token),
        },
    }
}

pub fn json_to_qdrant(json: JsonValue) -> QdrantValue {
    let kind = match json {
        JsonValue::Null => Kind::NullValue(0),
        JsonValue::Bool(b) => Kind::BoolValue(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => Kind::StringValue(s),
        JsonValue::Array(items) => Kind::ListValue(ListValue { values: items.into_iter().map(json_to_qdrant).collect() }),
        JsonValue::Object(map) => Kind::StructValue(Struct {
            fields: map.into_iter().map(|(k, v)| (k, json_to_qdrant(v))).collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

pub fn qdrant_to_json(value: QdrantValue) -> JsonValue {
    match value.kind {
        None | Some(Kind::NullValue(_)) => JsonValue::Null,
        Some(Kind::BoolValue(b)) => JsonValue::Bool(b),
        Some(Kind::IntegerValue(i)) => JsonValue::from(i),
        Some(Kind::DoubleValue(f)) => serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        Some(Kind::StringValue(s)) => JsonValue::String(s),
        Some(Kind::ListValue(list)) => JsonValue::Array(list.values.into_iter().map(qdrant_to_json).collect()),
        Some(Kind::StructValue(s)) => JsonValue::Object(s.fields.into_iter().map(|(k, v)| (k, qdrant_to_json(v))).collect()),
    }
}

pub fn chunk_to_payload(chunk: &Chunk) -> HashMap<String, QdrantValue> {
    let meta = &chunk.metadata;
    let mut payload = HashMap::new();
    payload.insert("chunk_id".to_string(), QdrantValue::from(chunk.id.clone()));
    payload.insert("content".to_string(), QdrantValue::from(chunk.content.clone()));
    payload.insert("document_id".to_string(), QdrantValue::from(meta.document_id.clone()));
    payload.insert("document_name".to_string(), QdrantValue::from(meta.document_name.clone()));
    payload.insert("document_part".to_string(), QdrantValue::from(i64::from(meta.document_part)));
    payload.insert("collection_id".to_string(), QdrantValue::from(meta.collection_id.clone()));
    payload.insert("created_at".to_string(), QdrantValue::from(meta.created_at.to_rfc3339()));
    let extra = JsonValue::Object(meta.extra.clone().into_iter().collect());
    payload.insert("extra".to_string(), json_to_qdrant(extra));
    payload
}

pub fn payload_to_chunk(payload: HashMap<String, QdrantValue>) -> Chunk {
    let mut json: serde_json::Map<String, JsonValue> =
        payload.into_iter().map(|(k, v)| (k, qdrant_to_json(v))).collect();
    let mut take_str = |key: &str| match json.remove(key) {
        Some(JsonValue::String(s)) => s,
        _ => String::new(),
    };
    let id = take_str("chunk_id");
    let content = take_str("content");
    let document_id = take_str("document_id");
    let document_name = take_str("document_name");
    let collection_id = take_str("collection_id");
    let created_at = DateTime::parse_from_rfc3339(&take_str("created_at"))
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default();
    let document_part = json
        .remove("document_part")
        .and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or_default();
    let extra = match json.remove("extra") {
        Some(JsonValue::Object(map)) => map.into_iter().collect(),
        _ => Default::default(),
    };
    Chunk {
        id,
        content,
        metadata: ChunkMetadata { document_id, document_name, document_part, collection_id, created_at, extra },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Chunk {
        let created_at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").expect("date").with_timezone(&Utc);
        Chunk {
            id: "manual:7".into(),
            content: "Torque the bolts to 40 Nm.".into(),
            metadata: ChunkMetadata {
                document_id: "manual".into(),
                document_name: "manual.pdf".into(),
                document_part: 7,
                collection_id: "garage".into(),
                created_at,
                extra: [
                    ("page".to_string(), serde_json::json!(12)),
                    ("tags".to_string(), serde_json::json!(["engine", "bolts"])),
                    ("ratio".to_string(), serde_json::json!(0.25)),
                ]
                .into_iter()
                .collect(),
            },
        }
    }

    #[test]
    fn payload_preserves_chunk() {
        let chunk = sample();
        assert_eq!(payload_to_chunk(chunk_to_payload(&chunk)), chunk);
    }

    #[test]
    fn point_ids_are_stable_per_collection() {
        assert_eq!(point_id("garage", "manual:7"), point_id("garage", "manual:7"));
        assert_ne!(point_id("garage", "manual:7"), point_id("kitchen", "manual:7"));
    }

    #[test]
    fn cursor_round_trips_point_ids() {
        let id = point_id("garage", "manual:7");
        let cursor = cursor_from_point(id.clone()).expect("cursor");
        assert!(matches!(cursor, Cursor::Opaque(_)));
        assert_eq!(point_from_cursor(cursor), id);
        assert_eq!(point_from_cursor(Cursor::Numeric(9)), PointId::from(9u64));
    }
}
