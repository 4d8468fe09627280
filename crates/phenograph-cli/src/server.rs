//! HTTP surface over the cohort query service.
//!
//! Read-only GET routes:
//! - `/healthz`
//! - `/cohorts`
//! - `/patients/all`, `/patients/patient/{id}`
//! - `/patients/like/{id}`, `/patients/with/{label}`
//! - `/graph/like/{id}`, `/graph/with/{label}`
//!
//! Query parameters: `fuzz` (required by the traversal routes), `cutoff`,
//! `limitation`, `cohort`.
//!
//! Trust boundary
//! -------------
//! Callers are authenticated upstream. The gateway forwards the caller's
//! verified claims in a header (`x-permissions` by default); this server only
//! reads it. Error bodies never carry store detail.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use phenograph_core::{
    ClaimSet, CohortQueryService, GraphStoreClient, PatientSearch, PhenotypeSearch, QueryError,
};
use serde::Serialize;
use tokio::net::TcpListener;
use url::form_urlencoded;

pub struct ServerState<S> {
    pub service: CohortQueryService<S>,
    pub claims_header: String,
}

pub async fn serve<S>(listen: SocketAddr, state: ServerState<S>) -> Result<()>
where
    S: GraphStoreClient + 'static,
{
    let state = Arc::new(state);
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let bound = listener.local_addr().context("failed to read bound addr")?;
    tracing::info!(addr = %bound, "listening");

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_request<S: GraphStoreClient>(
    req: Request<Incoming>,
    state: Arc<ServerState<S>>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let claims = claims_from(req.headers(), &state.claims_header);
    let resp = route(&state, req.method(), req.uri().path(), req.uri().query(), &claims).await;
    tracing::debug!(
        method = %req.method(),
        path = req.uri().path(),
        status = resp.status().as_u16(),
        "request"
    );
    Ok(resp)
}

fn claims_from(headers: &HeaderMap, name: &str) -> ClaimSet {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ClaimSet::parse_list)
        .unwrap_or_default()
}

pub(crate) async fn route<S: GraphStoreClient>(
    state: &ServerState<S>,
    method: &Method,
    path: &str,
    query: Option<&str>,
    claims: &ClaimSet,
) -> Response<Full<Bytes>> {
    if *method != Method::GET {
        return json_error(StatusCode::NOT_FOUND, "not found");
    }
    let Some(segments) = decode_segments(path) else {
        return json_error(StatusCode::BAD_REQUEST, "path is not valid UTF-8");
    };
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    let params = parse_query_params(query);
    let param = |key: &str| params.get(key).map(String::as_str);
    let service = &state.service;

    match segments.as_slice() {
        ["healthz"] => text_response(StatusCode::OK, "ok\n"),
        ["cohorts"] => respond(service.list_authorized_cohorts(claims).await),
        ["patients", "all"] => respond(service.list_patients(param("cohort"), claims).await),
        ["patients", "patient", id] => respond(service.get_patient(id, claims).await),
        ["patients", "like", id] => {
            match PatientSearch::from_params(id, param("fuzz"), param("cohort")) {
                Ok(search) => respond(service.find_similar_patients(&search, claims).await),
                Err(e) => error_response(&e),
            }
        }
        ["patients", "with", label] => match phenotype_search(label, &param) {
            Ok(search) => respond(service.find_patients_with_phenotype(&search, claims).await),
            Err(e) => error_response(&e),
        },
        ["graph", "like", id] => {
            match PatientSearch::from_params(id, param("fuzz"), param("cohort")) {
                Ok(search) => respond(service.project_similarity_graph(&search, claims).await),
                Err(e) => error_response(&e),
            }
        }
        ["graph", "with", label] => match phenotype_search(label, &param) {
            Ok(search) => respond(service.project_phenotype_graph(&search, claims).await),
            Err(e) => error_response(&e),
        },
        _ => json_error(StatusCode::NOT_FOUND, "not found"),
    }
}

fn phenotype_search<'a>(
    label: &str,
    param: &impl Fn(&str) -> Option<&'a str>,
) -> Result<PhenotypeSearch, QueryError> {
    PhenotypeSearch::from_params(
        label,
        param("fuzz"),
        param("cutoff"),
        param("limitation"),
        param("cohort"),
    )
}

fn decode_segments(path: &str) -> Option<Vec<String>> {
    path.trim_matches('/')
        .split('/')
        .map(|seg| urlencoding::decode(seg).ok().map(|s| s.into_owned()))
        .collect()
}

fn parse_query_params(query: Option<&str>) -> HashMap<String, String> {
    let Some(q) = query else {
        return HashMap::new();
    };
    form_urlencoded::parse(q.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

// ============================================================================
// Responses
// ============================================================================

fn status_for(err: &QueryError) -> StatusCode {
    match err {
        QueryError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
        QueryError::NotFound(_) => StatusCode::NOT_FOUND,
        QueryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        QueryError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: Result<T, QueryError>) -> Response<Full<Bytes>> {
    match result {
        Ok(v) => json_response(StatusCode::OK, &v),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &QueryError) -> Response<Full<Bytes>> {
    if let QueryError::StoreUnavailable(source) = err {
        tracing::error!(error = %source, "request failed on the graph store");
    }
    json_error(status_for(err), &err.to_string())
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": msg }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use phenograph_core::{CohortPermissions, StoreError};
    use phenograph_store::{MemoryStore, QueryPattern};
    use serde_json::{json, Value};

    fn state(store: MemoryStore) -> ServerState<MemoryStore> {
        let permissions = CohortPermissions::default().with_claim("Acute Care", "acutecare");
        ServerState {
            service: CohortQueryService::new(store, permissions),
            claims_header: "x-permissions".into(),
        }
    }

    async fn get(
        state: &ServerState<MemoryStore>,
        path: &str,
        query: Option<&str>,
        claims: &str,
    ) -> (StatusCode, Value) {
        let resp = route(state, &Method::GET, path, query, &ClaimSet::parse_list(claims)).await;
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn bad_fuzz_is_rejected_before_the_store() {
        let s = state(MemoryStore::new().with_cohorts(&["Demo"]));
        let (status, body) = get(&s, "/patients/like/P1", Some("fuzz=2abc"), "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("fuzz"));

        let (status, _) = get(&s, "/graph/with/Seizures", None, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(s.service.store().executed().is_empty());
    }

    #[tokio::test]
    async fn patient_lookup_maps_errors_to_statuses() {
        let store = MemoryStore::new().respond_json(
            QueryPattern::contains("OPTIONAL MATCH").with_param("patientId", "AC 1"),
            vec![json!({"patientId": "AC 1", "cohort": "Acute Care"})],
        );
        let s = state(store);

        let (status, _) = get(&s, "/patients/patient/AC%201", None, "").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = get(&s, "/patients/patient/AC%201", None, "acutecare/pheno").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["patientId"], "AC 1");
        let (status, _) = get(&s, "/patients/patient/nobody", None, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn store_failure_is_opaque() {
        let store = MemoryStore::new().fail(
            QueryPattern::contains("MATCH (c:Cohort)"),
            StoreError::Connection("bolt://secret-host:7687 refused".into()),
        );
        let (status, body) = get(&state(store), "/cohorts", None, "").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "graph store unavailable");
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let s = state(MemoryStore::new());
        let (status, _) = get(&s, "/patients", None, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let resp = route(&s, &Method::POST, "/cohorts", None, &ClaimSet::empty()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn phenotype_route_returns_aggregated_json() {
        let store = MemoryStore::new()
            .with_cohorts(&["Demo"])
            .respond_count(QueryPattern::contains("AS matches").with_param("cohort", "Demo"), 1)
            .respond_json(
                QueryPattern::contains("relphen{").with_param("cohort", "Demo"),
                vec![json!({"name": "HP_0001250", "label": "Seizures", "patients": [{"patientId": "P1"}]})],
            );
        let s = state(store);
        let (status, body) = get(&s, "/patients/with/Seizures", Some("fuzz=1&cutoff=x"), "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["numPatients"], 1);
        assert_eq!(body["perCohort"][0]["cohort"], "Demo");
        assert_eq!(body["overall"][0]["patients"][0]["patientId"], "P1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn routes_run_on_spawned_tasks() {
        let store = MemoryStore::new()
            .with_cohorts(&["Demo", "Acute Care"])
            .respond_count(QueryPattern::contains("AS matches").with_param("cohort", "Demo"), 1)
            .respond_json(
                QueryPattern::contains("relphen{").with_param("cohort", "Demo"),
                vec![json!({"name": "HP_0001250", "label": "Seizures", "patients": [{"patientId": "P1"}]})],
            )
            .respond_json(
                QueryPattern::contains("(ph:Class) RETURN p{").with_param("cohort", "Demo"),
                vec![json!({"patientId": "P1", "cohort": "Demo"})],
            );
        let mut s = state(store);
        s.service = s.service.with_options(phenograph_core::ServiceOptions {
            max_concurrent_cohorts: 2,
            ..Default::default()
        });
        let s = Arc::new(s);

        let handles: Vec<_> = [
            "/patients/all",
            "/patients/like/P1",
            "/patients/with/Seizures",
            "/graph/like/P1",
            "/graph/with/Seizures",
        ]
        .into_iter()
        .map(|path| {
            let s = s.clone();
            tokio::spawn(async move {
                let resp = route(&*s, &Method::GET, path, Some("fuzz=1&cohort="), &ClaimSet::empty()).await;
                let status = resp.status();
                let bytes = resp.into_body().collect().await.unwrap().to_bytes();
                (path, status, serde_json::from_slice::<Value>(&bytes).unwrap())
            })
        })
        .collect();

        for handle in handles {
            let (path, status, body) = handle.await.unwrap();
            assert_eq!(status, StatusCode::OK, "{path}");
            if path.starts_with("/patients/") {
                assert_eq!(body["perCohort"][0]["cohort"], "Demo", "{path}");
            }
        }
    }

    #[tokio::test]
    async fn empty_cohort_parameter_is_no_filter() {
        let store = MemoryStore::new()
            .with_cohorts(&["Demo"])
            .respond_count(QueryPattern::contains("AS matches"), 1)
            .respond_json(
                QueryPattern::contains("(ph:Class) RETURN p{"),
                vec![json!({"patientId": "P1", "cohort": "Demo"})],
            );
        let s = state(store);
        let (status, body) = get(&s, "/patients/all", Some("cohort="), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["numPatients"], 1);
        assert_eq!(body["overall"][0]["patientId"], "P1");
    }

    #[test]
    fn claims_header_accepts_commas_and_spaces() {
        let mut headers = HeaderMap::new();
        headers.insert("x-permissions", "acutecare/pheno, mito/pheno".parse().unwrap());
        let claims = claims_from(&headers, "x-permissions");
        assert!(claims.contains("mito/pheno"));
        assert!(claims_from(&HeaderMap::new(), "x-permissions").is_empty());
    }
}
