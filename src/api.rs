//! JSON endpoint layer.
//!
//! Routes `http::Request<Value>` values onto the gateway and answers with the
//! `{success, error?, ...}` envelope. Bodies are decoded into the typed drafts
//! and patches here, so malformed input is rejected at the edge with a 400.
//!
//! | Route | Gateway call |
//! |---|---|
//! | `GET /projects?uid=` | `list_projects` |
//! | `POST /projects` | `create_project` |
//! | `GET/PATCH/DELETE /projects/{id}` | `get_project_with_tasks` / `patch_project` / `delete_project` |
//! | `GET /tasks?projectId=` | `list_tasks` |
//! | `POST /tasks` | `create_task`, or `create_tasks` for `{tasks: [...]}` |
//! | `PATCH /tasks` | `bulk_patch_tasks` |
//! | `PATCH/DELETE /tasks/{id}` | `patch_task` / `delete_task` |

use std::sync::Arc;

use http::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::SyncError;
use crate::gateway::SyncGateway;
use crate::project::{ProjectDraft, ProjectPatch};
use crate::task::{TaskDraft, TaskPatch, TaskUpdate};

pub type ApiResponse = Response<Value>;

pub struct Router {
    gateway: Arc<SyncGateway>,
}

impl Router {
    pub fn new(gateway: Arc<SyncGateway>) -> Self {
        Router { gateway }
    }

    /// Dispatch one request. Never fails: every error becomes an envelope.
    pub async fn handle(&self, request: Request<Value>) -> ApiResponse {
        let method = request.method().clone();
        let path = request.uri().path().trim_end_matches('/').to_string();
        let query = request.uri().query().unwrap_or_default().to_string();
        let body = request.into_body();
        tracing::debug!("{} {}", method, path);

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let result = match (segments.as_slice(), &method) {
            (["projects"], &Method::GET) => self.list_projects(&query).await,
            (["projects"], &Method::POST) => self.create_project(body).await,
            (["projects", id], &Method::GET) => self.get_project(id).await,
            (["projects", id], &Method::PATCH) => self.patch_project(id, body).await,
            (["projects", id], &Method::DELETE) => self.delete_project(id).await,
            (["tasks"], &Method::GET) => self.list_tasks(&query).await,
            (["tasks"], &Method::POST) => self.create_tasks(body).await,
            (["tasks"], &Method::PATCH) => self.bulk_patch(body).await,
            (["tasks", id], &Method::PATCH) => self.patch_task(id, body).await,
            (["tasks", id], &Method::DELETE) => self.delete_task(id).await,
            (["projects"] | ["projects", _] | ["tasks"] | ["tasks", _], _) => {
                return failure(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            }
            _ => return failure(StatusCode::NOT_FOUND, &format!("no route for {path}")),
        };

        match result {
            Ok(payload) => success(payload),
            Err(e) => {
                if !e.is_validation() {
                    tracing::warn!("{} {} failed: {}", method, path, e);
                }
                failure(e.status_code(), &e.user_message())
            }
        }
    }

    async fn list_projects(&self, query: &str) -> Result<Map<String, Value>, SyncError> {
        let uid = query_param(query, "uid").ok_or_else(|| SyncError::Validation("uid is required".into()))?;
        let projects = self.gateway.list_projects(&uid).await?;
        Ok(payload([("projects", to_value(&projects)?)]))
    }

    async fn create_project(&self, body: Value) -> Result<Map<String, Value>, SyncError> {
        let draft: ProjectDraft = decode(body)?;
        let launch = self.gateway.create_project(draft).await?;
        Ok(payload([
            ("project", to_value(&launch.project)?),
            ("tasksCreated", json!(launch.tasks_created)),
        ]))
    }

    async fn get_project(&self, id: &str) -> Result<Map<String, Value>, SyncError> {
        let (project, tasks) = self.gateway.get_project_with_tasks(id).await?;
        Ok(payload([("project", to_value(&project)?), ("tasks", to_value(&tasks)?)]))
    }

    async fn patch_project(&self, id: &str, body: Value) -> Result<Map<String, Value>, SyncError> {
        let patch: ProjectPatch = decode(body)?;
        self.gateway.patch_project(id, &patch).await?;
        Ok(Map::new())
    }

    async fn delete_project(&self, id: &str) -> Result<Map<String, Value>, SyncError> {
        let removed = self.gateway.delete_project(id).await?;
        Ok(payload([("tasksDeleted", json!(removed))]))
    }

    async fn list_tasks(&self, query: &str) -> Result<Map<String, Value>, SyncError> {
        let project_id = query_param(query, "projectId")
            .ok_or_else(|| SyncError::Validation("projectId is required".into()))?;
        let tasks = self.gateway.list_tasks(&project_id).await?;
        Ok(payload([("tasks", to_value(&tasks)?)]))
    }

    /// A `tasks` array is a batch: drafts that fail to decode or validate
    /// are skipped, never fatal. Anything else is a single task.
    async fn create_tasks(&self, body: Value) -> Result<Map<String, Value>, SyncError> {
        if let Some(items) = body.get("tasks").and_then(Value::as_array) {
            let mut drafts = Vec::with_capacity(items.len());
            let mut undecodable = 0;
            for item in items {
                match serde_json::from_value::<TaskDraft>(item.clone()) {
                    Ok(d) => drafts.push(d),
                    Err(e) => {
                        tracing::warn!("Skipping undecodable task draft: {}", e);
                        undecodable += 1;
                    }
                }
            }
            let batch = self.gateway.create_tasks(drafts).await?;
            return Ok(payload([
                ("count", json!(batch.created.len())),
                ("skipped", json!(batch.skipped + undecodable)),
                ("ids", json!(batch.created)),
            ]));
        }

        let draft: TaskDraft = decode(body)?;
        draft.validate()?;
        let task = self.gateway.create_task(&draft).await?;
        Ok(payload([("task", to_value(&task)?)]))
    }

    async fn bulk_patch(&self, body: Value) -> Result<Map<String, Value>, SyncError> {
        let updates = match body.get("updates") {
            Some(v @ Value::Array(_)) => v.clone(),
            _ => return Err(SyncError::Validation("updates must be an array".into())),
        };
        let updates: Vec<TaskUpdate> = decode(updates)?;
        self.gateway.bulk_patch_tasks(&updates).await?;
        Ok(Map::new())
    }

    async fn patch_task(&self, id: &str, body: Value) -> Result<Map<String, Value>, SyncError> {
        let patch: TaskPatch = decode(body)?;
        self.gateway.patch_task(id, &patch).await?;
        Ok(Map::new())
    }

    async fn delete_task(&self, id: &str) -> Result<Map<String, Value>, SyncError> {
        self.gateway.delete_task(id).await?;
        Ok(Map::new())
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, SyncError> {
    let body = if body.is_null() { Value::Object(Map::new()) } else { body };
    serde_json::from_value(body).map_err(|e| SyncError::Validation(format!("invalid request body: {e}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, SyncError> {
    serde_json::to_value(value).map_err(|e| SyncError::Persistence(e.to_string()))
}

fn payload<const N: usize>(fields: [(&str, Value); N]) -> Map<String, Value> {
    fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// First non-empty value of `key` in a `a=1&b=2` query string.
fn query_param(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn respond(status: StatusCode, body: Value) -> ApiResponse {
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp
}

fn success(mut fields: Map<String, Value>) -> ApiResponse {
    fields.insert("success".into(), Value::Bool(true));
    respond(StatusCode::OK, Value::Object(fields))
}

fn failure(status: StatusCode, message: &str) -> ApiResponse {
    respond(status, json!({ "success": false, "error": message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use std::time::Duration;

    fn router() -> (Arc<MemoryStore>, Router) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(SyncGateway::new(store.clone(), Duration::from_secs(5)));
        (store, Router::new(gateway))
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri).body(body).unwrap();
        let resp = router.handle(request).await;
        (resp.status(), resp.into_body())
    }

    #[tokio::test]
    async fn test_project_lifecycle_over_routes() {
        let (_, r) = router();
        let (status, body) =
            call(&r, Method::POST, "/projects", json!({"uid": "u1", "title": "Atlas", "scale": 3})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["tasksCreated"], json!(0));
        let id = body["project"]["id"].as_str().unwrap().to_string();

        let (_, listed) = call(&r, Method::GET, "/projects?uid=u1", Value::Null).await;
        assert_eq!(listed["projects"].as_array().unwrap().len(), 1);

        let (status, _) = call(&r, Method::PATCH, &format!("/projects/{id}"), json!({"color": "#fff000"})).await;
        assert_eq!(status, StatusCode::OK);
        let (_, fetched) = call(&r, Method::GET, &format!("/projects/{id}"), Value::Null).await;
        assert_eq!(fetched["project"]["color"], json!("#fff000"));
        assert_eq!(fetched["tasks"], json!([]));

        let (status, _) = call(&r, Method::DELETE, &format!("/projects/{id}"), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        let (status, gone) = call(&r, Method::GET, &format!("/projects/{id}"), Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(gone["success"], json!(false));
    }

    #[tokio::test]
    async fn test_missing_required_fields_are_400() {
        let (_, r) = router();
        let (status, body) = call(&r, Method::GET, "/projects", Value::Null).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("uid is required"));

        let (status, _) = call(&r, Method::POST, "/projects", json!({"uid": "u1"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&r, Method::GET, "/tasks?projectId=", Value::Null).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&r, Method::POST, "/tasks", json!({"content": "x"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_create_reports_count_and_skipped() {
        let (_, r) = router();
        let body = json!({"tasks": [
            {"content": "x", "project_id": "p1"},
            {"content": "", "project_id": "p1"},
            {"content": "y", "project_id": "p1", "status": "NOT_A_STATUS"}
        ]});
        let (status, resp) = call(&r, Method::POST, "/tasks", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["count"], json!(1));
        assert_eq!(resp["skipped"], json!(2));
    }

    #[tokio::test]
    async fn test_bulk_patch_requires_array() {
        let (_, r) = router();
        let (status, body) = call(&r, Method::PATCH, "/tasks", json!({"updates": {"id": "a"}})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("updates must be an array"));
    }

    #[tokio::test]
    async fn test_task_routes() {
        let (_, r) = router();
        let (_, created) =
            call(&r, Method::POST, "/tasks", json!({"content": "Dock", "project_id": "p1", "desc": "bay 4"})).await;
        let id = created["task"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["task"]["description"], json!("bay 4"));

        let (status, _) = call(
            &r,
            Method::PATCH,
            "/tasks",
            json!({"updates": [{"id": id, "status": "DONE", "order": 0}]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&r, Method::PATCH, &format!("/tasks/{id}"), json!({"priority": "HIGH"})).await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = call(&r, Method::GET, "/tasks?projectId=p1", Value::Null).await;
        assert_eq!(listed["tasks"][0]["status"], json!("DONE"));
        assert_eq!(listed["tasks"][0]["priority"], json!("HIGH"));

        let (status, _) = call(&r, Method::DELETE, &format!("/tasks/{id}"), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        let (_, listed) = call(&r, Method::GET, "/tasks?projectId=p1", Value::Null).await;
        assert_eq!(listed["tasks"], json!([]));
    }

    #[tokio::test]
    async fn test_backend_failures_collapse_to_500() {
        let (store, r) = router();
        store.set_unavailable(true);
        let (status, body) = call(&r, Method::GET, "/projects?uid=u1", Value::Null).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], json!(crate::error::SYNC_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let (_, r) = router();
        assert_eq!(call(&r, Method::GET, "/planets", Value::Null).await.0, StatusCode::NOT_FOUND);
        assert_eq!(call(&r, Method::PUT, "/tasks/a", Value::Null).await.0, StatusCode::METHOD_NOT_ALLOWED);
    }
}
