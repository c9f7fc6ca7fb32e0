// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::sync::Arc;

use actix_web::error::{ErrorBadRequest, ErrorInternalServerError};
use actix_web::{get, web, Error, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use runs_core::{EnablementEngine, EngineError, RunStateMap};

use crate::delimiter::strip_delimiters;

type Engine = web::Data<Arc<EnablementEngine>>;

/// Run a blocking engine call off the async workers.
async fn blocking<F, R>(engine: &Engine, f: F) -> Result<R, Error>
where
    F: FnOnce(&EnablementEngine) -> R + Send + 'static,
    R: Send + 'static,
{
    let engine = engine.get_ref().clone();
    web::block(move || f(&engine))
        .await
        .map_err(ErrorInternalServerError)
}

fn parse_bool(raw: &str) -> Result<bool, Error> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        other => Err(ErrorBadRequest(format!(
            "invalid boolean parameter: {other}"
        ))),
    }
}

fn state_response(result: Result<RunStateMap, EngineError>) -> HttpResponse {
    match result {
        Ok(state) => HttpResponse::Ok().json(state),
        Err(e) => {
            error!("Run discovery failed: {}", e);
            HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    }
}

fn empty() -> HttpResponse {
    HttpResponse::Ok().json(json!({}))
}

#[derive(Deserialize)]
pub struct RunsQuery {
    #[serde(rename = "enableNewRuns")]
    pub enable_new_runs: Option<String>,
}

#[get("/runs")]
pub async fn runs(query: web::Query<RunsQuery>, engine: Engine) -> Result<HttpResponse, Error> {
    let enable_new_runs = match query.enable_new_runs.as_deref() {
        Some(raw) => parse_bool(raw)?,
        None => false,
    };
    let result = blocking(&engine, move |e| e.run_state(enable_new_runs)).await?;
    Ok(state_response(result))
}

#[derive(Deserialize)]
pub struct RunQuery {
    pub run: Option<String>,
}

#[get("/enablerun")]
pub async fn enable_run(
    query: web::Query<RunQuery>,
    engine: Engine,
) -> Result<HttpResponse, Error> {
    let Some(run) = query.into_inner().run else {
        return Ok(empty());
    };
    let result = blocking(&engine, move |e| {
        if let Err(err) = e.enable_run(&run) {
            warn!("Could not enable run '{}': {}", run, err);
        }
        e.current_state()
    })
    .await?;
    Ok(state_response(result))
}

#[get("/disablerun")]
pub async fn disable_run(
    query: web::Query<RunQuery>,
    engine: Engine,
) -> Result<HttpResponse, Error> {
    let Some(run) = query.into_inner().run else {
        return Ok(empty());
    };
    let result = blocking(&engine, move |e| {
        if let Err(err) = e.disable_run(&run) {
            warn!("Could not disable run '{}': {}", run, err);
        }
        e.current_state()
    })
    .await?;
    Ok(state_response(result))
}

#[derive(Deserialize)]
pub struct RegexQuery {
    pub regex: Option<String>,
}

#[get("/enableall")]
pub async fn enable_all(
    query: web::Query<RegexQuery>,
    engine: Engine,
) -> Result<HttpResponse, Error> {
    if let Some(regex) = query.into_inner().regex {
        let pattern = strip_delimiters(&regex);
        blocking(&engine, move |e| e.enable_all(&pattern)).await?;
    }
    Ok(empty())
}

#[get("/disableall")]
pub async fn disable_all(
    query: web::Query<RegexQuery>,
    engine: Engine,
) -> Result<HttpResponse, Error> {
    if let Some(regex) = query.into_inner().regex {
        let pattern = strip_delimiters(&regex);
        blocking(&engine, move |e| e.disable_all(&pattern)).await?;
    }
    Ok(empty())
}

#[get("/disablenonmatching")]
pub async fn disable_non_matching(
    query: web::Query<RegexQuery>,
    engine: Engine,
) -> Result<HttpResponse, Error> {
    if let Some(regex) = query.into_inner().regex {
        let pattern = strip_delimiters(&regex);
        blocking(&engine, move |e| e.disable_non_matching(&pattern)).await?;
    }
    Ok(empty())
}

#[derive(Deserialize)]
pub struct SubstringQuery {
    pub subregex: Option<String>,
    pub substring: Option<String>,
}

#[get("/enableallsubstring")]
pub async fn enable_all_substring(
    query: web::Query<SubstringQuery>,
    engine: Engine,
) -> Result<HttpResponse, Error> {
    let SubstringQuery {
        subregex,
        substring,
    } = query.into_inner();
    if let Some(regex) = subregex {
        let pattern = strip_delimiters(&regex);
        let substring = substring.unwrap_or_default();
        blocking(&engine, move |e| e.enable_all_substring(&pattern, &substring)).await?;
    }
    Ok(empty())
}

#[get("/disableallsubstring")]
pub async fn disable_all_substring(
    query: web::Query<SubstringQuery>,
    engine: Engine,
) -> Result<HttpResponse, Error> {
    let SubstringQuery {
        subregex,
        substring,
    } = query.into_inner();
    if let Some(regex) = subregex {
        let pattern = strip_delimiters(&regex);
        let substring = substring.unwrap_or_default();
        blocking(&engine, move |e| e.disable_all_substring(&pattern, &substring)).await?;
    }
    Ok(empty())
}

#[get("/defaultregex")]
pub async fn default_regex(engine: Engine) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "regex": engine.default_regex() }))
}

#[derive(Deserialize)]
pub struct UpdateQuery {
    #[serde(rename = "runState")]
    pub run_state: Option<String>,
}

#[get("/updaterunstate")]
pub async fn update_run_state(
    query: web::Query<UpdateQuery>,
    engine: Engine,
) -> Result<HttpResponse, Error> {
    let Some(raw) = query.into_inner().run_state else {
        return Ok(empty());
    };
    let desired: RunStateMap = match serde_json::from_str(&raw) {
        Ok(desired) => desired,
        Err(e) => {
            warn!("Ignoring malformed runState: {}", e);
            return Ok(empty());
        }
    };
    let result = blocking(&engine, move |e| e.update_run_state(&desired)).await?;
    Ok(state_response(result))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(runs)
        .service(enable_run)
        .service(disable_run)
        .service(enable_all)
        .service(disable_all)
        .service(disable_non_matching)
        .service(enable_all_substring)
        .service(disable_all_substring)
        .service(default_regex)
        .service(update_run_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use runs_core::{DirectController, EventFileAccumulatorFactory, RunRegistry, WorkerPool};
    use serde_json::Value;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn make_run(root: &Path, rel: &str) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).expect("mkdir run");
        fs::write(dir.join("events.out.tfevents.1700000000.host"), b"evt").expect("write");
    }

    fn engine(root: &Path) -> Arc<EnablementEngine> {
        let registry = Arc::new(RunRegistry::new(
            root,
            Arc::new(EventFileAccumulatorFactory),
        ));
        let controller = DirectController::new(registry, WorkerPool::new(2));
        Arc::new(EnablementEngine::new(Arc::new(controller)).with_default_regex("b/.*"))
    }

    macro_rules! app {
        ($engine:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($engine.clone()))
                    .configure(configure),
            )
            .await
        };
    }

    macro_rules! get_json {
        ($app:expr, $uri:expr) => {{
            let req = test::TestRequest::get().uri($uri).to_request();
            let body: Value = test::call_and_read_body_json(&$app, req).await;
            body
        }};
    }

    fn json_map(pairs: &[(&str, bool)]) -> Value {
        Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::Bool(*v)))
                .collect(),
        )
    }

    #[actix_web::test]
    async fn test_scenario_over_http() {
        let root = TempDir::new().expect("tempdir");
        for name in ["d", "b/c", "a"] {
            make_run(root.path(), name);
            std::thread::sleep(Duration::from_millis(50));
        }
        let engine = engine(root.path());
        engine.preload_most_recent(2).expect("preload");
        let app = app!(engine);

        let state = get_json!(app, "/runs?enableNewRuns=false");
        assert_eq!(state, json_map(&[("a", true), ("b/c", true), ("d", false)]));

        let body = get_json!(app, "/enableallsubstring?subregex=(%3F:)&substring=b");
        assert_eq!(body, json!({}));
        assert!(engine.registry().is_enabled("b/c"));

        get_json!(app, "/disablenonmatching?regex=a");
        assert_eq!(engine.registry().enabled_names(), vec!["a"]);
    }

    #[actix_web::test]
    async fn test_single_run_routes_return_state() {
        let root = TempDir::new().expect("tempdir");
        make_run(root.path(), "a");
        make_run(root.path(), "b/c");
        let engine = engine(root.path());
        let app = app!(engine);

        let state = get_json!(app, "/enablerun?run=b/c");
        assert_eq!(state, json_map(&[("a", false), ("b/c", true)]));

        let state = get_json!(app, "/disablerun?run=b/c");
        assert_eq!(state, json_map(&[("a", false), ("b/c", false)]));

        // Bad names leave state untouched.
        let state = get_json!(app, "/enablerun?run=../a");
        assert_eq!(state, json_map(&[("a", false), ("b/c", false)]));

        assert_eq!(get_json!(app, "/enablerun"), json!({}));
    }

    #[actix_web::test]
    async fn test_bulk_routes_strip_delimiters() {
        let root = TempDir::new().expect("tempdir");
        for name in ["a", "b/c", "b/d"] {
            make_run(root.path(), name);
        }
        let engine = engine(root.path());
        let app = app!(engine);
        get_json!(app, "/runs");

        get_json!(app, "/enableall?regex=%2Fb%2F.*%2F");
        assert_eq!(engine.registry().enabled_names(), vec!["b/c", "b/d"]);

        get_json!(app, "/disableallsubstring?subregex=%2F%2F&substring=d");
        assert_eq!(engine.registry().enabled_names(), vec!["b/c"]);

        get_json!(app, "/disableall?regex=%2F(%3F%3A)%2F");
        assert!(engine.registry().enabled_names().is_empty());
    }

    #[actix_web::test]
    async fn test_runs_auto_enables_new_runs() {
        let root = TempDir::new().expect("tempdir");
        make_run(root.path(), "a");
        let engine = engine(root.path());
        let app = app!(engine);

        let state = get_json!(app, "/runs?enableNewRuns=true");
        assert_eq!(state, json_map(&[("a", true)]));

        let req = test::TestRequest::get()
            .uri("/runs?enableNewRuns=maybe")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_runs_reports_discovery_error() {
        let root = TempDir::new().expect("tempdir");
        let gone = root.path().join("gone");
        let engine = engine(&gone);
        let app = app!(engine);

        let req = test::TestRequest::get().uri("/runs").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.status(),
            actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
        );
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().expect("error").contains("gone"));
    }

    #[actix_web::test]
    async fn test_default_regex_and_update_run_state() {
        let root = TempDir::new().expect("tempdir");
        make_run(root.path(), "a");
        make_run(root.path(), "d");
        let engine = engine(root.path());
        let app = app!(engine);

        assert_eq!(
            get_json!(app, "/defaultregex"),
            json!({ "regex": "b/.*" })
        );

        let state = get_json!(
            app,
            "/updaterunstate?runState=%7B%22a%22%3Atrue%2C%22zzz%22%3Atrue%7D"
        );
        assert_eq!(state, json_map(&[("a", true), ("d", false)]));

        assert_eq!(
            get_json!(app, "/updaterunstate?runState=not-json"),
            json!({})
        );
    }
}
