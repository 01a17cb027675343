use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::db::{SnapshotInfo, Store};
use crate::graph::{BandGraph, BuildOptions};
use crate::query::{self, Filters, QueryError, Recommendation, SortKey};

/// A loaded graph together with the bookkeeping of the build that made it.
pub struct Snapshot {
    pub graph: BandGraph,
    pub info: SnapshotInfo,
}

/// Shared application state.
///
/// Queries read whatever snapshot is current; a rebuild persists the new
/// graph first and only then swaps it in.
pub struct AppState {
    store_path: PathBuf,
    build: BuildOptions,
    defaults: Filters,
    snapshot: ArcSwapOption<Snapshot>,
    rebuild_lock: Mutex<()>,
}

impl AppState {
    pub fn new(
        store_path: PathBuf,
        build: BuildOptions,
        defaults: Filters,
        snapshot: Option<Snapshot>,
    ) -> Self {
        Self {
            store_path,
            build,
            defaults,
            snapshot: ArcSwapOption::from(snapshot.map(Arc::new)),
            rebuild_lock: Mutex::new(()),
        }
    }

    fn current(&self) -> Result<Arc<Snapshot>, ApiError> {
        self.snapshot.load_full().ok_or_else(|| {
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "no graph snapshot loaded; run `ffo build` or POST /api/rebuild",
            )
        })
    }
}

// ---------- request / response types ----------

#[derive(Serialize)]
pub struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggestions: Vec<String>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: msg.into(),
            suggestions: Vec::new(),
        }),
    )
}

#[derive(Deserialize)]
pub struct RecommendParams {
    band: Option<String>,
    max_followers: Option<u64>,
    max_popularity: Option<u8>,
    min_connections: Option<u32>,
    /// Comma-separated.
    countries: Option<String>,
    sort: Option<SortKey>,
}

impl RecommendParams {
    fn filters(&self, defaults: &Filters) -> Result<Filters, ApiError> {
        let mut filters = defaults.clone();
        if let Some(f) = self.max_followers {
            filters.max_followers = f;
        }
        if let Some(p) = self.max_popularity {
            if p > 100 {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "max_popularity must be between 0 and 100",
                ));
            }
            filters.max_popularity = p;
        }
        if let Some(c) = self.min_connections {
            filters.min_connections = c;
        }
        if let Some(list) = &self.countries {
            filters.countries = list
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(filters)
    }
}

#[derive(Serialize)]
pub struct BandsResponse {
    bands: Vec<String>,
}

#[derive(Serialize)]
pub struct CountriesResponse {
    countries: Vec<String>,
}

#[derive(Serialize)]
pub struct TopBand {
    name: String,
    weighted_degree: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    bands: usize,
    connections: usize,
    records: usize,
    skipped_empty: usize,
    skipped_self_loops: usize,
    built_at: String,
    top: Vec<TopBand>,
}

#[derive(Serialize)]
pub struct RebuildResponse {
    bands: usize,
    connections: usize,
    records: usize,
    skipped: usize,
}

// ---------- handlers ----------

async fn handle_bands(State(state): State<Arc<AppState>>) -> Result<Json<BandsResponse>, ApiError> {
    let snap = state.current()?;
    Ok(Json(BandsResponse {
        bands: snap.graph.names(),
    }))
}

async fn handle_countries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountriesResponse>, ApiError> {
    let snap = state.current()?;
    Ok(Json(CountriesResponse {
        countries: snap.graph.countries(),
    }))
}

async fn handle_recommend(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<Vec<Recommendation>>, ApiError> {
    let band = params
        .band
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "missing `band` parameter"))?;
    let filters = params.filters(&state.defaults)?;
    let snap = state.current()?;
    match query::recommend(&snap.graph, band, &filters, params.sort.unwrap_or_default()) {
        Ok(results) => Ok(Json(results)),
        Err(e @ QueryError::UnknownBand { .. }) => {
            let msg = e.to_string();
            let QueryError::UnknownBand { suggestions, .. } = e;
            Err((
                StatusCode::NOT_FOUND,
                Json(ErrorBody {
                    error: msg,
                    suggestions,
                }),
            ))
        }
    }
}

async fn handle_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let snap = state.current()?;
    let report = &snap.info.report;
    let top = snap
        .graph
        .top_bands(10)
        .into_iter()
        .map(|(b, weighted_degree)| TopBand {
            name: b.name.clone(),
            weighted_degree,
        })
        .collect();
    Ok(Json(StatsResponse {
        bands: snap.graph.band_count(),
        connections: snap.graph.connection_count(),
        records: report.records,
        skipped_empty: report.skipped_empty,
        skipped_self_loops: report.skipped_self_loops,
        built_at: snap.info.built_at.to_string(),
        top,
    }))
}

async fn handle_rebuild(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RebuildResponse>, ApiError> {
    let _guard = state.rebuild_lock.lock().await;
    let path = state.store_path.clone();
    let options = state.build;
    let snap = tokio::task::spawn_blocking(move || -> anyhow::Result<Snapshot> {
        let store = Store::open(&path)?;
        let outcome = store.rebuild(&options)?;
        let info = store
            .snapshot_info()?
            .ok_or_else(|| anyhow::anyhow!("snapshot vanished after rebuild"))?;
        Ok(Snapshot {
            graph: outcome.graph,
            info,
        })
    })
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(|e| {
        warn!(error = %e, "rebuild failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("rebuild failed: {e:#}"))
    })?;

    let resp = RebuildResponse {
        bands: snap.graph.band_count(),
        connections: snap.graph.connection_count(),
        records: snap.info.report.records,
        skipped: snap.info.report.skipped(),
    };
    state.snapshot.store(Some(Arc::new(snap)));
    info!(bands = resp.bands, connections = resp.connections, "graph snapshot swapped");
    Ok(Json(resp))
}

async fn handle_dashboard(State(state): State<Arc<AppState>>) -> Html<String> {
    let (bands, connections) = match state.snapshot.load_full() {
        Some(snap) => (snap.graph.band_count(), snap.graph.connection_count()),
        None => (0, 0),
    };
    let f = &state.defaults;
    // Embedded in a script block, so `<` must not appear literally.
    let preset_countries = serde_json::to_string(&f.countries)
        .unwrap_or_else(|_| "[]".to_string())
        .replace('<', "\\u003c");
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>ffo — band recommendations</title>
<style>
  body {{ font-family: system-ui, sans-serif; max-width: 800px; margin: 2rem auto; padding: 0 1rem; background: #0d1117; color: #c9d1d9; }}
  h1 {{ color: #58a6ff; }}
  .stats {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(120px, 1fr)); gap: 1rem; margin: 1.5rem 0; }}
  .stat {{ background: #161b22; border: 1px solid #30363d; border-radius: 8px; padding: 1rem; text-align: center; }}
  .stat .num {{ font-size: 2rem; font-weight: bold; color: #58a6ff; }}
  .stat .label {{ font-size: 0.85rem; color: #8b949e; }}
  input, select {{ padding: 0.5rem; font-size: 1rem; background: #161b22; border: 1px solid #30363d; border-radius: 6px; color: #c9d1d9; }}
  .controls {{ display: flex; flex-wrap: wrap; gap: 0.5rem; }}
  #band {{ flex: 1 1 100%; }}
  table {{ width: 100%; margin-top: 1rem; border-collapse: collapse; font-size: 0.9rem; }}
  th, td {{ text-align: left; padding: 0.3rem 0.5rem; border-bottom: 1px solid #30363d; }}
  #msg {{ margin-top: 1rem; color: #8b949e; }}
</style>
</head>
<body>
<h1>🎸 ffo</h1>
<div class="stats">
  <div class="stat"><div class="num">{bands}</div><div class="label">Bands</div></div>
  <div class="stat"><div class="num">{connections}</div><div class="label">Connections</div></div>
</div>
<div class="controls">
  <input type="text" id="band" list="names" placeholder="Pick a band…" autofocus>
  <datalist id="names"></datalist>
  <label>max followers <input type="number" id="max_followers" value="{max_followers}" min="0"></label>
  <label>max popularity <input type="number" id="max_popularity" value="{max_popularity}" min="0" max="100"></label>
  <label>min connections <input type="number" id="min_connections" value="{min_connections}" min="1"></label>
  <select id="sort">
    <option value="connections">connections</option>
    <option value="popularity">popularity</option>
    <option value="followers">followers</option>
  </select>
  <label>countries <select id="countries" multiple size="4"></select></label>
</div>
<table id="results"></table>
<div id="msg"></div>
<script>
const $ = id => document.getElementById(id);
const presetCountries = {preset_countries};
fetch('/api/bands').then(r => r.json()).then(d => {{
  for (const b of d.bands || []) {{ const o = document.createElement('option'); o.value = b; $('names').appendChild(o); }}
}});
fetch('/api/countries').then(r => r.json()).then(d => {{
  for (const c of d.countries || []) {{
    const o = document.createElement('option');
    o.value = c;
    o.textContent = c;
    o.selected = presetCountries.includes(c);
    $('countries').appendChild(o);
  }}
}});
function cell(tag, text) {{
  const el = document.createElement(tag);
  el.textContent = text;
  return el;
}}
async function refresh() {{
  const band = $('band').value.trim();
  $('results').replaceChildren();
  if (!band) {{ $('msg').textContent = ''; return; }}
  const p = new URLSearchParams({{ band, sort: $('sort').value }});
  for (const k of ['max_followers', 'max_popularity', 'min_connections']) p.set(k, $(k).value);
  const countries = Array.from($('countries').selectedOptions, o => o.value);
  if (countries.length) p.set('countries', countries.join(','));
  const resp = await fetch('/api/recommend?' + p);
  const data = await resp.json();
  if (!resp.ok) {{
    const hint = data.suggestions ? ' Did you mean: ' + data.suggestions.join(', ') + '?' : '';
    $('msg').textContent = data.error + '.' + hint;
    return;
  }}
  $('msg').textContent = data.length ? '' : 'No bands match these filters.';
  if (!data.length) return;
  const head = document.createElement('tr');
  for (const h of ['Band', 'Connections', 'Popularity', 'Followers', 'Country']) head.appendChild(cell('th', h));
  $('results').appendChild(head);
  for (const r of data) {{
    const row = document.createElement('tr');
    for (const v of [r.band, r.connections, r.popularity ?? '', r.followers ?? '', r.country]) row.appendChild(cell('td', String(v)));
    $('results').appendChild(row);
  }}
}}
for (const id of ['band', 'max_followers', 'max_popularity', 'min_connections', 'sort', 'countries'])
  $(id).addEventListener('change', refresh);
</script>
</body>
</html>"#,
        preset_countries = preset_countries,
        max_followers = f.max_followers,
        max_popularity = f.max_popularity,
        min_connections = f.min_connections,
    );
    Html(html)
}

// ---------- router ----------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_dashboard))
        .route("/api/bands", get(handle_bands))
        .route("/api/countries", get(handle_countries))
        .route("/api/recommend", get(handle_recommend))
        .route("/api/stats", get(handle_stats))
        .route("/api/rebuild", post(handle_rebuild))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server on the given port.
pub async fn run_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!(port, "http server listening");
    println!("🌐 Serving on http://0.0.0.0:{port}");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::record::{BandMention, RelationRecord};
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn mention(name: &str, popularity: u8, country: &str) -> BandMention {
        BandMention::new(name)
            .popularity(popularity)
            .followers(1_000)
            .country(country)
    }

    fn records() -> Vec<RelationRecord> {
        vec![
            RelationRecord::new(mention("Cult Of Luna", 40, "Sweden"), mention("Isis", 45, "USA")),
            RelationRecord::new(mention("Cult Of Luna", 40, "Sweden"), mention("Isis", 45, "USA")),
            RelationRecord::new(
                mention("Cult Of Luna", 40, "Sweden"),
                mention("Neurosis", 90, "USA"),
            ),
            RelationRecord::new(
                mention("Cult Of Luna", 40, "Sweden"),
                mention("Breach", 10, "Sweden"),
            ),
        ]
    }

    fn loaded_state() -> AppState {
        let outcome = GraphBuilder::new(BuildOptions::default()).build(&records());
        let info = SnapshotInfo {
            built_at: chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            report: outcome.report,
            options: BuildOptions::default(),
        };
        AppState::new(
            PathBuf::from("unused.db"),
            BuildOptions::default(),
            Filters::default(),
            Some(Snapshot {
                graph: outcome.graph,
                info,
            }),
        )
    }

    fn test_router() -> Router {
        build_router(Arc::new(loaded_state()))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_dashboard() {
        let resp = test_router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("ffo"));
        assert!(text.contains("Connections"));
        assert!(text.contains(r#"<select id="countries" multiple"#));
        assert!(text.contains("/api/countries"));
        // Result rows are built from text nodes only.
        assert!(!text.contains("innerHTML"));
    }

    #[tokio::test]
    async fn test_dashboard_escapes_preset_countries() {
        let mut defaults = Filters::default();
        defaults.countries.insert("</script><b>".to_string());
        let state = AppState::new(
            PathBuf::from("unused.db"),
            BuildOptions::default(),
            defaults,
            None,
        );
        let resp = build_router(Arc::new(state))
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("</script><b>"));
        assert!(text.contains(r#"["\u003c/script>\u003cb>"]"#));
    }

    #[tokio::test]
    async fn test_api_bands_sorted() {
        let (status, json) = get_json(test_router(), "/api/bands").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["bands"],
            serde_json::json!(["Breach", "Cult Of Luna", "Isis", "Neurosis"])
        );
    }

    #[tokio::test]
    async fn test_api_countries() {
        let (status, json) = get_json(test_router(), "/api/countries").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["countries"], serde_json::json!(["Sweden", "USA"]));
    }

    #[tokio::test]
    async fn test_api_recommend_defaults() {
        let (status, json) = get_json(test_router(), "/api/recommend?band=Cult%20Of%20Luna").await;
        assert_eq!(status, StatusCode::OK);
        let results = json.as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["band"], "Isis");
        assert_eq!(results[0]["connections"], 2);
        assert_eq!(results[1]["band"], "Breach");
    }

    #[tokio::test]
    async fn test_api_recommend_filters_and_sort() {
        let (status, json) = get_json(
            test_router(),
            "/api/recommend?band=cult-of-luna&max_popularity=100&countries=USA&sort=popularity",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["band"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Isis", "Neurosis"]);
    }

    #[tokio::test]
    async fn test_api_recommend_empty_is_ok() {
        let (status, json) =
            get_json(test_router(), "/api/recommend?band=Breach&min_connections=5").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_api_recommend_unknown_band() {
        let (status, json) = get_json(test_router(), "/api/recommend?band=Cult%20Of%20Lun").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["suggestions"][0], "Cult Of Luna");
    }

    #[tokio::test]
    async fn test_api_recommend_bad_popularity() {
        let (status, _) =
            get_json(test_router(), "/api/recommend?band=Isis&max_popularity=101").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_stats() {
        let (status, json) = get_json(test_router(), "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["bands"], 4);
        assert_eq!(json["connections"], 3);
        assert_eq!(json["records"], 4);
        assert_eq!(json["top"][0]["name"], "Cult Of Luna");
        assert_eq!(json["top"][0]["weighted_degree"], 4);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_unavailable() {
        let state = AppState::new(
            PathBuf::from("unused.db"),
            BuildOptions::default(),
            Filters::default(),
            None,
        );
        let (status, json) = get_json(build_router(Arc::new(state)), "/api/bands").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(json["error"].as_str().unwrap().contains("ffo build"));
    }

    #[tokio::test]
    async fn test_rebuild_swaps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffo.db");
        Store::open(&path).unwrap().append_records(&records()).unwrap();

        let state = AppState::new(path, BuildOptions::default(), Filters::default(), None);
        let app = build_router(Arc::new(state));

        let resp = app
            .clone()
            .oneshot(Request::post("/api/rebuild").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["bands"], 4);
        assert_eq!(json["records"], 4);

        let (status, json) = get_json(app, "/api/bands").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["bands"].as_array().unwrap().len(), 4);
    }
}
