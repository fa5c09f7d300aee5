use std::fs;
use std::io::Read as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use catalogscout::formats::{AFFILIATE_GOOD, AFFILIATE_ISSUE, ArticleRecord, BackendRequest};
use predicates::prelude::*;

const CATALOG_PAGE_1: &str = r#"<!doctype html>
<html><body>
  <select name="per_page">
    <option value="20">20</option>
    <option value="100">100</option>
  </select>
  <table id="articles">
    <tr><th>ID</th><th>Title</th><th>Author</th><th>Posted</th><th>Edited</th><th>Details</th><th>Image</th></tr>
    <tr>
      <td>#1</td>
      <td><a href="/posts/1">Best  kettles</a></td>
      <td>Ann</td>
      <td>2024-03-01</td>
      <td>2024-03-05</td>
      <td><div>Content Type: Review</div><div>Editorial: Yes</div><div>Word Count: 1,200</div></td>
      <td><img src="/thumbs/1.jpg"></td>
    </tr>
    <tr>
      <td>2</td>
      <td><a href="/posts/2">Budget toasters</a></td>
      <td>Bo</td>
      <td>2024-03-02</td>
      <td>2024-03-02</td>
      <td><div>Content Type: Roundup</div></td>
      <td></td>
    </tr>
  </table>
  <a rel="next" href="?page=2">Next</a>
</body></html>
"#;

const CATALOG_PAGE_2: &str = r#"<!doctype html>
<html><body>
  <select name="per_page"><option value="100">100</option></select>
  <table id="articles">
    <tr>
      <td>3</td>
      <td><a href="/posts/3">Blender guide</a></td>
      <td>Cy</td>
      <td>2024-03-03</td>
      <td>2024-03-04</td>
      <td><div>Editorial: No</div></td>
      <td></td>
    </tr>
  </table>
</body></html>
"#;

const POST_1: &str = r#"<!doctype html>
<html><head>
  <meta property="og:title" content="Kettles, ranked">
  <meta name="description" content="We boiled a lot of water.">
  <meta property="og:description" content="Kettle roundup">
</head><body>
  <a href="https://www.amazon.com/dp/B001?tag=catalogscout-20&amp;ascsubtag=cs1">Buy</a>
</body></html>
"#;

const POST_2: &str = r#"<!doctype html>
<html><head><meta property="og:title" content="Toasters"></head><body>
  <a href="https://www.amazon.com/dp/B002?tag=someone-else-20">Buy</a>
</body></html>
"#;

const POST_3: &str = r#"<!doctype html>
<html><head><meta name="description" content="No links here."></head><body></body></html>
"#;

const REPORT_EMPTY: &str = r#"<!doctype html>
<html><body>
  <a id="ad-creative-report" href="/report">Ad creatives</a>
  <a id="export-report" href="/report/export">Export</a>
  <p>Generating...</p>
</body></html>
"#;

const REPORT_READY: &str = r#"<!doctype html>
<html><body>
  <a id="ad-creative-report" href="/report">Ad creatives</a>
  <a id="export-report" href="/report/export">Export</a>
  <table id="report">
    <tr><th>ID</th><th>Post</th><th>Creatives</th></tr>
    <tr><td>1</td><td>Best kettles</td><td>3</td></tr>
    <tr><td>3</td><td>Blender guide</td><td>1</td></tr>
  </table>
</body></html>
"#;

const WRONG_PAGE: &str = "<!doctype html><html><body><p>Dashboard</p></body></html>";

struct Stub {
    base_url: String,
    visited: Arc<Mutex<Vec<String>>>,
    backend_rx: mpsc::Receiver<BackendRequest>,
    hooks_rx: mpsc::Receiver<(String, serde_json::Value)>,
    shutdown_tx: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl Stub {
    fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.join();
    }
}

fn spawn_site_server() -> Stub {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let base_url = format!("http://{}", server.server_addr());

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let (backend_tx, backend_rx) = mpsc::channel::<BackendRequest>();
    let (hooks_tx, hooks_rx) = mpsc::channel::<(String, serde_json::Value)>();
    let visited = Arc::new(Mutex::new(Vec::new()));
    let exported = Arc::new(AtomicBool::new(false));

    let visited_in = Arc::clone(&visited);
    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let url = request.url().to_string();
            visited_in.lock().unwrap().push(url.clone());
            let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
            let second_page = query.split('&').any(|pair| pair == "page=2");

            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);

            let (status, content_type, response) = match (request.method(), path) {
                (tiny_http::Method::Get, "/articles") if second_page => {
                    (200, "text/html", CATALOG_PAGE_2.to_string())
                }
                (tiny_http::Method::Get, "/articles") => {
                    (200, "text/html", CATALOG_PAGE_1.to_string())
                }
                (tiny_http::Method::Get, "/posts/1") => (200, "text/html", POST_1.to_string()),
                (tiny_http::Method::Get, "/posts/2") => (200, "text/html", POST_2.to_string()),
                (tiny_http::Method::Get, "/posts/3") => (200, "text/html", POST_3.to_string()),
                (tiny_http::Method::Get, "/dashboard") => {
                    (200, "text/html", WRONG_PAGE.to_string())
                }
                (tiny_http::Method::Get, "/report") => {
                    let page = if exported.load(Ordering::SeqCst) {
                        REPORT_READY
                    } else {
                        REPORT_EMPTY
                    };
                    (200, "text/html", page.to_string())
                }
                (tiny_http::Method::Get, "/report/export") => {
                    exported.store(true, Ordering::SeqCst);
                    (200, "text/plain", "queued".to_string())
                }
                (tiny_http::Method::Post, "/api/scrape") => {
                    let req: BackendRequest =
                        serde_json::from_str(&body).expect("parse backend request");
                    let results = req
                        .amazon_urls
                        .iter()
                        .map(|link| serde_json::json!({ "id": link.id, "pageCount": link.id * 10 }))
                        .collect::<Vec<_>>();
                    let _ = backend_tx.send(req);
                    (
                        200,
                        "application/json",
                        serde_json::Value::Array(results).to_string(),
                    )
                }
                (tiny_http::Method::Post, hook) if hook.starts_with("/hooks/") => {
                    let value: serde_json::Value =
                        serde_json::from_str(&body).expect("parse webhook body");
                    let _ = hooks_tx.send((hook.to_string(), value));
                    (200, "text/plain", "ok".to_string())
                }
                _ => (404, "text/plain", "not found".to_string()),
            };

            let header =
                tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
                    .expect("content-type header");
            let _ = request.respond(
                tiny_http::Response::from_string(response)
                    .with_status_code(status)
                    .with_header(header),
            );
        }
    });

    Stub {
        base_url,
        visited,
        backend_rx,
        hooks_rx,
        shutdown_tx,
        handle,
    }
}

fn read_records(store: &Path) -> anyhow::Result<Vec<ArticleRecord>> {
    let raw = fs::read_to_string(store.join("records.json"))?;
    Ok(serde_json::from_str(&raw)?)
}

fn read_status(store: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = fs::read_to_string(store.join("data.json"))?;
    Ok(serde_json::from_str(&raw)?)
}

#[test]
fn catalog_then_report_produces_reconciled_records() -> anyhow::Result<()> {
    let stub = spawn_site_server();
    let temp = tempfile::tempdir()?;
    let store = temp.path().join("store");
    let store_arg = store.to_str().unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("catalogscout");
    cmd.args([
        "scrape-catalog",
        "--catalog-url",
        &format!("{}/articles", stub.base_url),
        "--store",
        store_arg,
        "--settle-ms",
        "0",
    ])
    .assert()
    .success();

    assert!(
        stub.visited
            .lock()
            .unwrap()
            .iter()
            .any(|url| url == "/articles?per_page=100")
    );

    let records = read_records(&store)?;
    assert_eq!(
        records.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    let first = &records[0];
    assert_eq!(first.title, "Best kettles");
    assert_eq!(first.source_url, format!("{}/posts/1", stub.base_url));
    assert_eq!(first.content_type, "Review");
    assert_eq!(first.is_editorial, "Yes");
    assert_eq!(first.word_count, "1,200");
    assert_eq!(first.thumbnail_url, format!("{}/thumbs/1.jpg", stub.base_url));
    assert_eq!(first.seo_title, "Kettles, ranked");
    assert_eq!(first.description, "We boiled a lot of water.");
    assert_eq!(first.description2, "Kettle roundup");
    assert_eq!(first.affiliate_validation, AFFILIATE_GOOD);
    assert_eq!(first.affiliate_base_url, "https://www.amazon.com/dp/B001");
    assert_eq!(records[1].affiliate_validation, AFFILIATE_ISSUE);
    assert_eq!(records[2].affiliate_url, "");
    assert_eq!(records[2].affiliate_validation, "");
    assert!(records.iter().all(|r| !r.is_active && r.page_count == 0));

    let status = read_status(&store)?;
    assert_eq!(status["type"], "awaiting_second_trigger");
    assert_eq!(status["data"]["records"], 3);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("catalogscout");
    cmd.args([
        "reconcile-report",
        "--report-url",
        &format!("{}/report", stub.base_url),
        "--backend-url",
        &format!("{}/", stub.base_url),
        "--records-webhook",
        &format!("{}/hooks/records", stub.base_url),
        "--report-webhook",
        &format!("{}/hooks/report", stub.base_url),
        "--store",
        store_arg,
        "--poll-ms",
        "20",
        "--timeout-secs",
        "10",
    ])
    .assert()
    .success();

    let records = read_records(&store)?;
    let by_id = |id: u64| records.iter().find(|r| r.id == id).unwrap();
    assert!(by_id(1).is_active);
    assert_eq!(by_id(1).page_count, 10);
    assert!(!by_id(2).is_active);
    assert_eq!(by_id(2).page_count, 0);
    assert!(by_id(3).is_active);
    assert_eq!(by_id(3).page_count, 0);

    // Only record 1 is active with an affiliate link.
    let request = stub.backend_rx.recv_timeout(Duration::from_secs(2))?;
    assert_eq!(request.amazon_urls.len(), 1);
    assert_eq!(request.amazon_urls[0].id, 1);
    assert!(request.current_timestamp > 0);
    assert!(stub.backend_rx.try_recv().is_err());

    let mut hooks = Vec::new();
    while let Ok(hook) = stub.hooks_rx.recv_timeout(Duration::from_millis(500)) {
        hooks.push(hook);
    }
    hooks.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(hooks.len(), 2);
    assert_eq!(hooks[0].0, "/hooks/records");
    assert_eq!(hooks[0].1.as_array().map(Vec::len), Some(3));
    assert_eq!(hooks[1].0, "/hooks/report");
    assert_eq!(hooks[1].1[0]["creativeCount"], 3);

    let status = read_status(&store)?;
    assert_eq!(status["type"], "done");
    assert_eq!(status["data"]["active"], 2);
    assert_eq!(status["data"]["augmented"], 1);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("catalogscout");
    cmd.args(["status", "--store", store_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"type\": \"done\""));

    stub.stop();
    Ok(())
}

#[test]
fn report_without_anchor_fails_and_keeps_records() -> anyhow::Result<()> {
    let stub = spawn_site_server();
    let temp = tempfile::tempdir()?;
    let store = temp.path().join("store");
    let store_arg = store.to_str().unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("catalogscout");
    cmd.args([
        "scrape-catalog",
        "--catalog-url",
        &format!("{}/articles", stub.base_url),
        "--store",
        store_arg,
        "--settle-ms",
        "0",
        "--max-pages",
        "1",
    ])
    .assert()
    .success();
    let before = fs::read(store.join("records.json"))?;
    assert_eq!(read_records(&store)?.len(), 2);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("catalogscout");
    cmd.args([
        "reconcile-report",
        "--report-url",
        &format!("{}/dashboard", stub.base_url),
        "--backend-url",
        &stub.base_url,
        "--store",
        store_arg,
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("report link not found"));

    assert_eq!(fs::read(store.join("records.json"))?, before);
    let status = read_status(&store)?;
    assert_eq!(status["type"], "error");
    assert_eq!(status["color"], "error");
    assert!(stub.backend_rx.try_recv().is_err());

    stub.stop();
    Ok(())
}

#[test]
fn report_before_any_catalog_scan_is_refused() -> anyhow::Result<()> {
    let stub = spawn_site_server();
    let temp = tempfile::tempdir()?;
    let store = temp.path().join("store");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("catalogscout");
    cmd.args([
        "reconcile-report",
        "--report-url",
        &format!("{}/report", stub.base_url),
        "--backend-url",
        &stub.base_url,
        "--store",
        store.to_str().unwrap(),
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("scrape the catalog first"));

    assert!(!store.join("records.json").exists());
    assert_eq!(read_status(&store)?["type"], "error");

    stub.stop();
    Ok(())
}

#[test]
fn catalog_without_page_size_control_fails() -> anyhow::Result<()> {
    let stub = spawn_site_server();
    let temp = tempfile::tempdir()?;
    let store = temp.path().join("store");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("catalogscout");
    cmd.args([
        "scrape-catalog",
        "--catalog-url",
        &format!("{}/dashboard", stub.base_url),
        "--store",
        store.to_str().unwrap(),
        "--settle-ms",
        "0",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Page size control not found"));

    assert!(!store.join("records.json").exists());

    stub.stop();
    Ok(())
}
