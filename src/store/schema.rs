//! Article collection schema and vector index definition

use serde_json::{json, Value};

/// Field data types used by the article collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int64,
    VarChar { max_length: usize },
    FloatVector { dim: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub data_type: DataType,
    pub is_primary: bool,
}

impl FieldSchema {
    fn new(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            is_primary: false,
        }
    }

    fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    fn to_milvus_json(&self) -> Value {
        let (data_type, params) = match self.data_type {
            DataType::Int64 => ("Int64", None),
            DataType::VarChar { max_length } => {
                ("VarChar", Some(json!({ "max_length": max_length.to_string() })))
            }
            DataType::FloatVector { dim } => ("FloatVector", Some(json!({ "dim": dim.to_string() }))),
        };
        let mut field = json!({
            "fieldName": self.name,
            "dataType": data_type,
            "isPrimary": self.is_primary,
        });
        if let (Some(params), Some(obj)) = (params, field.as_object_mut()) {
            obj.insert("elementTypeParams".to_string(), params);
        }
        field
    }
}

/// Schema of a destination collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    pub fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    /// Schema for stored article chunks with `dim`-wide embeddings
    pub fn article(dim: usize) -> Self {
        Self {
            fields: vec![
                FieldSchema::new("id", DataType::VarChar { max_length: 64 }).primary(),
                FieldSchema::new("url", DataType::VarChar { max_length: 2048 }),
                FieldSchema::new("title", DataType::VarChar { max_length: 512 }),
                FieldSchema::new("content", DataType::VarChar { max_length: 65535 }),
                FieldSchema::new("content_emb", DataType::FloatVector { dim }),
                FieldSchema::new("create_time", DataType::Int64),
            ],
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn to_milvus_json(&self) -> Value {
        json!({
            "autoId": false,
            "enableDynamicField": false,
            "fields": self.fields.iter().map(FieldSchema::to_milvus_json).collect::<Vec<_>>(),
        })
    }
}

/// Vector index built on a destination collection
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub field: &'static str,
    pub index_name: &'static str,
    pub metric_type: &'static str,
    pub index_type: &'static str,
    pub params: Value,
}

impl IndexParams {
    /// HNSW cosine index on the article embedding field
    pub fn article() -> Self {
        Self {
            field: "content_emb",
            index_name: "content_emb_index",
            metric_type: "COSINE",
            index_type: "HNSW",
            params: json!({ "M": 16, "efConstruction": 200 }),
        }
    }

    pub fn to_milvus_json(&self) -> Value {
        json!([{
            "fieldName": self.field,
            "indexName": self.index_name,
            "metricType": self.metric_type,
            "params": merge_index_type(&self.params, self.index_type),
        }])
    }
}

fn merge_index_type(params: &Value, index_type: &str) -> Value {
    let mut merged = params.as_object().cloned().unwrap_or_default();
    merged.insert("index_type".to_string(), Value::String(index_type.to_string()));
    Value::Object(merged)
}
