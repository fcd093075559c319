//! Firestore REST backend
//!
//! Talks to the Firestore v1 REST API. A document's `updateTime` is used as its
//! version, so conditional deletes map onto the `currentDocument.updateTime`
//! precondition.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{Document, DocumentStore, Fields, StoreError};

const PAGE_SIZE: &str = "300";

pub struct FirestoreDocumentStore {
    client: Client,
    documents_url: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    update_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

impl FirestoreDocumentStore {
    #[must_use]
    pub fn new(base_url: &str, project_id: &str, access_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            documents_url: documents_url(base_url, project_id),
            access_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.documents_url, path.trim_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn decode_document(doc: FirestoreDocument) -> Result<(String, Document), StoreError> {
        let id = doc
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let fields = decode_fields(doc.fields)?;
        Ok((
            id,
            Document {
                fields,
                version: doc.update_time,
            },
        ))
    }
}

#[async_trait]
impl DocumentStore for FirestoreDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        debug!("firestore: GET {path}");
        let response = self.send(self.client.get(self.url(path))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: FirestoreDocument = check(response).await?.json().await.map_err(|e| {
            StoreError::InvalidData(format!("Failed to parse Firestore document: {e}"))
        })?;
        Ok(Some(Self::decode_document(doc)?.1))
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<(), StoreError> {
        debug!("firestore: PATCH {path}");
        let body = json!({ "fields": encode_fields(&fields) });
        let response = self
            .send(self.client.patch(self.url(path)).json(&body))
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete(
        &self,
        path: &str,
        expected_version: Option<&str>,
    ) -> Result<bool, StoreError> {
        debug!("firestore: DELETE {path}");
        let precondition = match expected_version {
            Some(version) => ("currentDocument.updateTime", version),
            None => ("currentDocument.exists", "true"),
        };
        let response = self
            .send(self.client.delete(self.url(path)).query(&[precondition]))
            .await?;
        match response.status() {
            // Missing document or failed precondition: somebody else got there first
            StatusCode::NOT_FOUND
            | StatusCode::BAD_REQUEST
            | StatusCode::CONFLICT
            | StatusCode::PRECONDITION_FAILED => Ok(false),
            _ => {
                check(response).await?;
                Ok(true)
            }
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        debug!("firestore: LIST {collection}");
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(self.url(collection))
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = self.send(request).await?;
            if response.status() == StatusCode::NOT_FOUND {
                break;
            }
            let page: ListResponse = check(response).await?.json().await.map_err(|e| {
                StoreError::InvalidData(format!("Failed to parse Firestore list: {e}"))
            })?;
            for doc in page.documents {
                out.push(Self::decode_document(doc)?);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(out)
    }
}

async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(StoreError::Unavailable(format!("{status}: {message}")))
    } else {
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn documents_url(base_url: &str, project_id: &str) -> String {
    format!(
        "{}/projects/{project_id}/databases/(default)/documents",
        base_url.trim_end_matches('/')
    )
}

fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// Convert plain JSON into a Firestore typed value
fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<_> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

fn decode_fields(fields: Map<String, Value>) -> Result<Fields, StoreError> {
    fields
        .into_iter()
        .map(|(k, v)| decode_value(v).map(|v| (k, v)))
        .collect()
}

/// Convert a Firestore typed value back into plain JSON
fn decode_value(value: Value) -> Result<Value, StoreError> {
    let Value::Object(mut typed) = value else {
        return Err(StoreError::InvalidData("Firestore value is not an object".into()));
    };
    let Some((kind, inner)) = typed.iter_mut().next().map(|(k, v)| (k.clone(), v.take())) else {
        return Err(StoreError::InvalidData("Empty Firestore value".into()));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "stringValue" | "timestampValue" | "bytesValue" | "referenceValue"
        | "geoPointValue" => Ok(inner),
        "integerValue" => {
            let parsed = match &inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| StoreError::InvalidData(format!("Invalid integerValue {inner}")))
        }
        "doubleValue" => Ok(inner),
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(values)) => values.clone(),
                _ => Vec::new(),
            };
            values
                .into_iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "mapValue" => {
            let fields = match inner.get("fields") {
                Some(Value::Object(fields)) => fields.clone(),
                _ => Map::new(),
            };
            decode_fields(fields).map(Value::Object)
        }
        other => Err(StoreError::InvalidData(format!(
            "Unsupported Firestore value type {other}"
        ))),
    }
}
