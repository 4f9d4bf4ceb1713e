use std::path::Path as FsPath;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value as JsonValue};
use tower_http::trace::TraceLayer;

use pita_store::{MergeMode, NodePath};

use crate::error::ApiError;
use crate::state::{blocking, AppState};

type ApiResult = Result<Json<JsonValue>, ApiError>;

lazy_static! {
    static ref KEY_FILENAME: Regex =
        Regex::new(r"^(?P<path>.+)/key/(?P<key>[^/]+)\.filename$").unwrap();
    static ref KEY: Regex = Regex::new(r"^(?P<path>.+)/key/(?P<key>[^/]+)$").unwrap();
    static ref EACHPAIR: Regex = Regex::new(r"^(?P<path>.+)/eachpair(?P<ext>[^/]*)$").unwrap();
}

/// What a `GET /properties/...` tail asks for.
#[derive(Debug, PartialEq, Eq)]
enum PropertiesRoute<'a> {
    Filename { path: &'a str, key: &'a str },
    Key { path: &'a str, key: &'a str },
    EachPair { path: &'a str, ext: &'a str },
    Listing { path: &'a str },
}

impl<'a> PropertiesRoute<'a> {
    fn parse(tail: &'a str) -> Self {
        if let Some(caps) = KEY_FILENAME.captures(tail) {
            return PropertiesRoute::Filename {
                path: caps.name("path").map_or("", |m| m.as_str()),
                key: caps.name("key").map_or("", |m| m.as_str()),
            };
        }
        if let Some(caps) = KEY.captures(tail) {
            return PropertiesRoute::Key {
                path: caps.name("path").map_or("", |m| m.as_str()),
                key: caps.name("key").map_or("", |m| m.as_str()),
            };
        }
        if let Some(caps) = EACHPAIR.captures(tail) {
            return PropertiesRoute::EachPair {
                path: caps.name("path").map_or("", |m| m.as_str()),
                ext: caps.name("ext").map_or("", |m| m.as_str()),
            };
        }
        PropertiesRoute::Listing { path: tail }
    }
}

/// `port.json` is `("port", Some("json"))`, `port` is `("port", None)`.
fn split_extension(key: &str) -> (String, Option<String>) {
    let file = FsPath::new(key);
    match (file.file_stem(), file.extension()) {
        (Some(stem), Some(ext)) => (
            stem.to_string_lossy().into_owned(),
            Some(ext.to_string_lossy().into_owned()),
        ),
        _ => (key.to_string(), None),
    }
}

fn parse_body(body: &Bytes) -> Result<JsonValue, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("{}", e);
        ApiError::bad_request("Bad JSON received")
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_root).post(create_node).fallback(no_route))
        .route(
            "/properties",
            get(list_root).post(create_node).fallback(no_route),
        )
        .route(
            "/properties/{*tail}",
            get(read_properties)
                .put(update_node)
                .delete(delete_key)
                .post(create_node)
                .fallback(no_route),
        )
        .route("/views", get(list_views).post(create_node).fallback(no_route))
        .route("/view", post(evaluate_payload).fallback(no_route))
        .route(
            "/view/{*name}",
            get(evaluate_named).post(create_node).fallback(no_route),
        )
        .route("/{*rest}", post(create_node).fallback(no_route))
        .fallback(no_route)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn no_route() -> ApiError {
    ApiError::no_route()
}

async fn list_root(State(state): State<Arc<AppState>>) -> ApiResult {
    list(&state, String::new()).await
}

async fn list(state: &Arc<AppState>, raw: String) -> ApiResult {
    blocking(state, move |state| {
        let listing = state.lister.list(&NodePath::parse(&raw)?)?;
        Ok(Json(json!(listing)))
    })
    .await
}

async fn read_properties(
    State(state): State<Arc<AppState>>,
    Path(tail): Path<String>,
) -> ApiResult {
    match PropertiesRoute::parse(&tail) {
        PropertiesRoute::Filename { path, key } => {
            let (path, key) = (path.to_string(), key.to_string());
            blocking(&state, move |state| {
                let ancestor = state
                    .resolver
                    .relevant_ancestor(&NodePath::parse(&path)?, &key)?;
                Ok(Json(json!({ key: ancestor.file.to_string_lossy() })))
            })
            .await
        }
        PropertiesRoute::Key { path, key } => {
            let path = path.to_string();
            let (name, ext) = split_extension(key);
            blocking(&state, move |state| {
                let node = NodePath::parse(&path)?;
                let mut properties = state.resolver.resolve(&node, MergeMode::Merge)?;
                let value = properties
                    .remove(&name)
                    .ok_or_else(|| ApiError::not_found(format!("Key '{}' not found", name)))?;
                match ext.as_deref() {
                    None | Some("json") => Ok(Json(json!({ name: value }))),
                    Some(_) => Err(ApiError::bad_request("Output format not supported")),
                }
            })
            .await
        }
        PropertiesRoute::EachPair { path, ext } => {
            let (path, ext) = (path.to_string(), ext.to_string());
            blocking(&state, move |state| {
                let properties = state
                    .resolver
                    .resolve(&NodePath::parse(&path)?, MergeMode::Merge)?;
                match ext.as_str() {
                    "" | ".json" => Ok(Json(JsonValue::Object(properties))),
                    _ => Err(ApiError::bad_request("Output format not supported")),
                }
            })
            .await
        }
        PropertiesRoute::Listing { path } => list(&state, path.to_string()).await,
    }
}

async fn update_node(
    State(state): State<Arc<AppState>>,
    Path(tail): Path<String>,
    body: Bytes,
) -> ApiResult {
    let patch = parse_body(&body)?;
    blocking(&state, move |state| {
        state.writer.update_node(&NodePath::parse(&tail)?, &patch)?;
        Ok(Json(json!({ "status": 0 })))
    })
    .await
}

async fn create_node(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let payload = parse_body(&body)?;
    let Some(path) = payload.get("path").and_then(JsonValue::as_str) else {
        return Err(ApiError::bad_request("Missing path"));
    };
    let node = NodePath::parse(path)?;

    blocking(&state, move |state| {
        let steps = state.writer.create_node(&node);
        Ok(Json(json!({ "status": 0, "steps": steps })))
    })
    .await
}

async fn delete_key(State(state): State<Arc<AppState>>, Path(tail): Path<String>) -> ApiResult {
    let tail = tail.trim_end_matches('/');
    let Some((path, key)) = tail.rsplit_once('/') else {
        return Err(ApiError::no_route());
    };
    let (path, key) = (path.to_string(), key.to_string());

    blocking(&state, move |state| {
        let outcome = state.writer.delete_key(&NodePath::parse(&path)?, &key)?;
        Ok(Json(json!({ "status": 0, "outcome": outcome })))
    })
    .await
}

async fn list_views(State(state): State<Arc<AppState>>) -> ApiResult {
    blocking(&state, |state| Ok(Json(json!(state.lister.list_views()?)))).await
}

async fn evaluate_named(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ApiResult {
    blocking(&state, move |state| {
        Ok(Json(json!(state.views.evaluate(&name)?)))
    })
    .await
}

async fn evaluate_payload(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let source = String::from_utf8_lossy(&body).into_owned();
    blocking(&state, move |state| {
        Ok(Json(json!(state.views.evaluate(&source)?)))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_tails_are_classified() {
        assert_eq!(
            PropertiesRoute::parse("org/team/key/port.filename"),
            PropertiesRoute::Filename {
                path: "org/team",
                key: "port"
            }
        );
        assert_eq!(
            PropertiesRoute::parse("org/team/key/port.json"),
            PropertiesRoute::Key {
                path: "org/team",
                key: "port.json"
            }
        );
        assert_eq!(
            PropertiesRoute::parse("org/eachpair.json"),
            PropertiesRoute::EachPair {
                path: "org",
                ext: ".json"
            }
        );
        assert_eq!(
            PropertiesRoute::parse("org/team"),
            PropertiesRoute::Listing { path: "org/team" }
        );
    }

    #[test]
    fn key_extensions_are_split_off() {
        assert_eq!(
            split_extension("port.json"),
            ("port".to_string(), Some("json".to_string()))
        );
        assert_eq!(split_extension("port"), ("port".to_string(), None));
        assert_eq!(
            split_extension("a.b.xml"),
            ("a.b".to_string(), Some("xml".to_string()))
        );
    }
}
