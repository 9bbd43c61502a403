//! End-to-end harvest tests over a scripted fake browser and a mock asset host.
//!
//! The fake page holds one DOM snapshot per scroll step; every scroll script
//! advances to the next snapshot (the last one repeats).

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pin_harvest::orchestrator::{sentinel_probe_script, SCROLL_TO_BOTTOM_SCRIPT};
use pin_harvest::{
    harvest, BrowserSession, DedupLedger, HarvestError, HarvestOptions, HarvestReport,
    HarvestResult, LayoutStrategy, ScrollOptions,
};

const TARGET: &str = "https://www.pinterest.com/pin/819655200967018689/";
const SENTINEL: &str = "More to explore";

// ─────────────────────── fake browser ───────────────────────

#[derive(Debug, Clone, Default)]
struct FakeImg {
    srcset: Option<String>,
    src: Option<String>,
}

#[derive(Debug, Clone)]
enum FakeElement {
    Container(Option<FakeImg>),
    Image(FakeImg),
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    grid: Vec<Option<FakeImg>>,
    video: Vec<Option<FakeImg>>,
    non_story: Vec<Option<FakeImg>>,
    sentinel: bool,
}

#[derive(Debug, Default)]
struct FakeLog {
    navigations: Vec<String>,
    scrolls: Vec<String>,
    locates: usize,
}

struct FakeSession {
    snapshots: Vec<Snapshot>,
    closed: bool,
    /// When set, `navigate` fails with this browser error.
    navigate_error: Option<String>,
    log: Mutex<FakeLog>,
}

impl FakeSession {
    fn new(snapshots: Vec<Snapshot>) -> Self {
        assert!(!snapshots.is_empty());
        Self {
            snapshots,
            closed: false,
            navigate_error: None,
            log: Mutex::new(FakeLog::default()),
        }
    }

    fn current(&self) -> Snapshot {
        let step = self.log.lock().unwrap().scrolls.len();
        self.snapshots[step.min(self.snapshots.len() - 1)].clone()
    }

    fn scrolls(&self) -> Vec<String> {
        self.log.lock().unwrap().scrolls.clone()
    }

    fn locates(&self) -> usize {
        self.log.lock().unwrap().locates
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    type Element = FakeElement;

    async fn navigate(&self, url: &str) -> HarvestResult<()> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        match &self.navigate_error {
            Some(message) => Err(HarvestError::Browser(message.clone())),
            None => Ok(()),
        }
    }

    async fn query_all(&self, selector: &str) -> HarvestResult<Vec<FakeElement>> {
        let snapshot = self.current();
        let items = if selector == LayoutStrategy::GridItem.selector() {
            self.log.lock().unwrap().locates += 1;
            snapshot.grid
        } else if selector == LayoutStrategy::VideoPin.selector() {
            snapshot.video
        } else if selector == LayoutStrategy::NonStoryPinImage.selector() {
            snapshot.non_story
        } else {
            Vec::new()
        };
        Ok(items.into_iter().map(FakeElement::Container).collect())
    }

    async fn query_selector(
        &self,
        element: &FakeElement,
        selector: &str,
    ) -> HarvestResult<Option<FakeElement>> {
        match (element, selector) {
            (FakeElement::Container(Some(img)), "img") => Ok(Some(FakeElement::Image(img.clone()))),
            _ => Ok(None),
        }
    }

    async fn get_attribute(
        &self,
        element: &FakeElement,
        name: &str,
    ) -> HarvestResult<Option<String>> {
        match (element, name) {
            (FakeElement::Image(img), "srcset") => Ok(img.srcset.clone()),
            (FakeElement::Image(img), "src") => Ok(img.src.clone()),
            _ => Ok(None),
        }
    }

    async fn evaluate(&self, script: &str) -> HarvestResult<serde_json::Value> {
        if script == sentinel_probe_script(SENTINEL) {
            return Ok(serde_json::Value::Bool(self.current().sentinel));
        }
        if script.starts_with("window.scrollTo") {
            self.log.lock().unwrap().scrolls.push(script.to_string());
            return Ok(serde_json::Value::Null);
        }
        Err(HarvestError::Browser(format!("unexpected script: {script}")))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

// ─────────────────────── helpers ───────────────────────

/// Create an NxN black PNG.
fn make_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::new_rgb8(width, height);
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    img.write_with_encoder(encoder).unwrap();
    buf
}

/// Image with a three-entry candidate list hosted on `base`.
fn srcset_img(base: &str, id: &str) -> Option<FakeImg> {
    Some(FakeImg {
        srcset: Some(format!(
            "{base}/236x/{id}.png 1x, {base}/474x/{id}.png 2x, {base}/originals/{id}.png 4x"
        )),
        src: Some(format!("{base}/236x/{id}.png")),
    })
}

/// Image with only a single source.
fn src_img(base: &str, id: &str) -> Option<FakeImg> {
    Some(FakeImg {
        srcset: None,
        src: Some(format!("{base}/single/{id}.png")),
    })
}

fn grid(items: Vec<Option<FakeImg>>) -> Snapshot {
    Snapshot {
        grid: items,
        ..Snapshot::default()
    }
}

async fn serve(server: &MockServer, asset_path: &str, status: u16, times: u64) {
    let template = if status == 200 {
        ResponseTemplate::new(200).set_body_bytes(make_png(4, 4))
    } else {
        ResponseTemplate::new(status)
    };
    Mock::given(method("GET"))
        .and(path(asset_path))
        .respond_with(template)
        .expect(times)
        .mount(server)
        .await;
}

fn options(workdir: &Path, max_iterations: u32) -> HarvestOptions {
    let mut opts = HarvestOptions::new(
        TARGET,
        workdir.join("db").join("ledger.db"),
        workdir.join("runs"),
    );
    opts.scroll = ScrollOptions {
        increment_px: 1000,
        settle_delay: Duration::ZERO,
        max_iterations,
        sentinel_text: SENTINEL.to_string(),
    };
    opts.fetch.timeout = Duration::from_secs(5);
    opts
}

fn ledger_of(opts: &HarvestOptions) -> DedupLedger {
    DedupLedger::open(&opts.ledger_path).unwrap()
}

fn run_label(report: &HarvestReport) -> String {
    report.run_directory.display().to_string()
}

// ─────────────────────── tests ───────────────────────

#[tokio::test]
async fn test_candidate_list_records_every_variant_fetches_largest() {
    let server = MockServer::start().await;
    serve(&server, "/236x/a.png", 200, 0).await;
    serve(&server, "/474x/a.png", 200, 0).await;
    serve(&server, "/originals/a.png", 200, 1).await;

    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 0);
    let session = FakeSession::new(vec![grid(vec![srcset_img(&server.uri(), "a")])]);

    let report = harvest(&session, &opts).await.unwrap();
    assert_eq!(report.downloaded, 1);
    assert!(report.run_directory.join("a.png").exists());

    let ledger = ledger_of(&opts);
    let run = run_label(&report);
    for (variant, descriptor) in [("236x", "1x"), ("474x", "2x"), ("originals", "4x")] {
        let record = ledger
            .exists(&format!("{}/{variant}/a.png", server.uri()))
            .unwrap()
            .expect("variant recorded");
        assert_eq!(record.origin_run_directory, run);
        assert_eq!(record.resolution_descriptor.as_deref(), Some(descriptor));
    }
    assert_eq!(ledger.count().unwrap(), 3);
}

#[tokio::test]
async fn test_second_run_over_same_page_inserts_nothing() {
    let server = MockServer::start().await;
    serve(&server, "/originals/a.png", 200, 1).await;
    serve(&server, "/single/b.png", 200, 1).await;

    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 2);
    let page = vec![grid(vec![
        srcset_img(&server.uri(), "a"),
        src_img(&server.uri(), "b"),
    ])];

    let first = harvest(&FakeSession::new(page.clone()), &opts).await.unwrap();
    assert_eq!(first.downloaded, 2);
    let rows_after_first = ledger_of(&opts).count().unwrap();
    assert_eq!(rows_after_first, 4);

    let second = harvest(&FakeSession::new(page), &opts).await.unwrap();
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.already_collected, 2);
    assert_ne!(first.run_directory, second.run_directory);

    let ledger = ledger_of(&opts);
    assert_eq!(ledger.count().unwrap(), rows_after_first);
    assert!(ledger.records_for_run(&run_label(&second)).unwrap().is_empty());
}

#[tokio::test]
async fn test_runs_exactly_max_iterations_without_sentinel() {
    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 5);
    let session = FakeSession::new(vec![grid(vec![None])]);

    let report = harvest(&session, &opts).await.unwrap();

    assert_eq!(report.scroll_cycles, 5);
    assert!(!report.sentinel_reached);
    assert_eq!(session.locates(), 6);
    assert_eq!(
        session.scrolls(),
        vec![
            "window.scrollTo(0, 1000)",
            "window.scrollTo(0, 2000)",
            "window.scrollTo(0, 3000)",
            "window.scrollTo(0, 4000)",
            "window.scrollTo(0, 5000)",
        ]
    );
}

#[tokio::test]
async fn test_sentinel_on_third_iteration_takes_one_final_pass() {
    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 10);

    let mut snapshots: Vec<Snapshot> = (0..5).map(|n| grid(vec![None; n + 1])).collect();
    snapshots[3].sentinel = true;
    snapshots[4].sentinel = true;
    let session = FakeSession::new(snapshots);

    let report = harvest(&session, &opts).await.unwrap();

    assert!(report.sentinel_reached);
    assert_eq!(report.scroll_cycles, 4);
    assert_eq!(session.locates(), 5);
    assert_eq!(
        session.scrolls(),
        vec![
            "window.scrollTo(0, 1000)".to_string(),
            "window.scrollTo(0, 2000)".to_string(),
            "window.scrollTo(0, 3000)".to_string(),
            SCROLL_TO_BOTTOM_SCRIPT.to_string(),
        ]
    );
    // One new container per snapshot, each processed exactly once.
    assert_eq!(report.containers_processed, 5);
}

#[tokio::test]
async fn test_only_new_suffix_is_processed_after_scroll() {
    let server = MockServer::start().await;
    for id in ["p1", "p2", "p3"] {
        serve(&server, &format!("/single/{id}.png"), 200, 1).await;
    }

    let base = server.uri();
    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 3);
    let session = FakeSession::new(vec![
        grid(vec![src_img(&base, "p1"), src_img(&base, "p2")]),
        grid(vec![src_img(&base, "p1"), src_img(&base, "p2"), src_img(&base, "p3")]),
    ]);

    let report = harvest(&session, &opts).await.unwrap();
    assert_eq!(report.containers_processed, 3);
    assert_eq!(report.downloaded, 3);
    assert_eq!(report.already_collected, 0);
}

#[tokio::test]
async fn test_shrinking_container_count_is_an_empty_suffix() {
    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 2);
    let session = FakeSession::new(vec![
        grid(vec![None; 3]),
        grid(vec![None; 1]),
        grid(vec![None; 2]),
    ]);

    let report = harvest(&session, &opts).await.unwrap();
    assert_eq!(report.scroll_cycles, 2);
    // 3 initially, none after shrinking to 1, then the one beyond index 1.
    assert_eq!(report.containers_processed, 4);
    assert_eq!(report.skipped, 4);
}

#[tokio::test]
async fn test_failed_download_keeps_sibling_rows() {
    let server = MockServer::start().await;
    serve(&server, "/originals/x.png", 500, 1).await;

    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 0);
    let session = FakeSession::new(vec![grid(vec![srcset_img(&server.uri(), "x")])]);

    let report = harvest(&session, &opts).await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(!report.run_directory.join("x.png").exists());

    // The rows are written before the download; a failed asset stays recorded.
    let ledger = ledger_of(&opts);
    assert_eq!(ledger.count().unwrap(), 3);
    assert!(ledger
        .exists(&format!("{}/originals/x.png", server.uri()))
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_closed_page_fails_navigation() {
    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 3);
    let mut session = FakeSession::new(vec![grid(vec![None])]);
    session.closed = true;

    let err = harvest(&session, &opts).await.unwrap_err();
    assert!(matches!(err, HarvestError::NavigationFailure(_)));
    assert!(session.log.lock().unwrap().navigations.is_empty());
    assert_eq!(session.locates(), 0);

    // The ledger was released and can be reopened.
    assert_eq!(ledger_of(&opts).count().unwrap(), 0);
}

#[tokio::test]
async fn test_unreachable_target_is_a_navigation_failure() {
    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 3);
    let mut session = FakeSession::new(vec![grid(vec![None])]);
    session.navigate_error = Some("net::ERR_NAME_NOT_RESOLVED".into());

    let err = harvest(&session, &opts).await.unwrap_err();
    match err {
        HarvestError::NavigationFailure(message) => {
            assert!(message.contains("ERR_NAME_NOT_RESOLVED"));
        }
        other => panic!("expected NavigationFailure, got {other:?}"),
    }
    assert_eq!(session.log.lock().unwrap().navigations, vec![TARGET.to_string()]);
    assert_eq!(session.locates(), 0);
    assert!(session.scrolls().is_empty());

    // The ledger was released and can be reopened.
    let ledger = ledger_of(&opts);
    assert_eq!(ledger.count().unwrap(), 0);
    ledger.close().unwrap();
}

#[tokio::test]
async fn test_unusable_containers_are_skipped() {
    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 0);
    let session = FakeSession::new(vec![grid(vec![None, Some(FakeImg::default())])]);

    let report = harvest(&session, &opts).await.unwrap();
    assert_eq!(report.skipped, 2);
    assert_eq!(ledger_of(&opts).count().unwrap(), 0);
}

#[tokio::test]
async fn test_single_source_duplicate_honours_overwrite() {
    let server = MockServer::start().await;
    serve(&server, "/single/s.png", 200, 1).await;

    let work = tempfile::tempdir().unwrap();
    let mut opts = options(work.path(), 0);
    let url = format!("{}/single/s.png", server.uri());
    {
        let ledger = ledger_of(&opts);
        ledger.insert(&url, "runs/older", None).unwrap();
        ledger.close().unwrap();
    }
    let page = vec![grid(vec![src_img(&server.uri(), "s")])];

    let skipped = harvest(&FakeSession::new(page.clone()), &opts).await.unwrap();
    assert_eq!(skipped.already_collected, 1);
    assert_eq!(skipped.downloaded, 0);

    opts.overwrite_existing = true;
    let forced = harvest(&FakeSession::new(page), &opts).await.unwrap();
    assert_eq!(forced.downloaded, 1);
    assert!(forced.run_directory.join("s.png").exists());

    let record = ledger_of(&opts).exists(&url).unwrap().unwrap();
    assert_eq!(record.origin_run_directory, "runs/older");
}

#[tokio::test]
async fn test_overwrite_does_not_refetch_recorded_candidate_list() {
    let server = MockServer::start().await;
    serve(&server, "/236x/c.png", 200, 0).await;
    serve(&server, "/474x/c.png", 200, 0).await;
    serve(&server, "/originals/c.png", 200, 0).await;

    let work = tempfile::tempdir().unwrap();
    let mut opts = options(work.path(), 0);
    opts.overwrite_existing = true;
    let largest = format!("{}/originals/c.png", server.uri());
    {
        let ledger = ledger_of(&opts);
        ledger.insert(&largest, "runs/older", Some("4x")).unwrap();
        ledger.close().unwrap();
    }
    let session = FakeSession::new(vec![grid(vec![srcset_img(&server.uri(), "c")])]);

    let report = harvest(&session, &opts).await.unwrap();
    assert_eq!(report.already_collected, 1);
    assert_eq!(report.downloaded, 0);
    assert!(!report.run_directory.join("c.png").exists());

    // Smaller variants are not recorded either.
    let ledger = ledger_of(&opts);
    assert_eq!(ledger.count().unwrap(), 1);
    assert_eq!(
        ledger.exists(&largest).unwrap().unwrap().origin_run_directory,
        "runs/older"
    );
}

#[tokio::test]
async fn test_falls_back_to_non_story_selector() {
    let server = MockServer::start().await;
    serve(&server, "/single/n.png", 200, 1).await;

    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 0);
    let session = FakeSession::new(vec![Snapshot {
        non_story: vec![src_img(&server.uri(), "n")],
        ..Snapshot::default()
    }]);

    let report = harvest(&session, &opts).await.unwrap();
    assert_eq!(report.strategy, Some(LayoutStrategy::NonStoryPinImage));
    assert_eq!(report.downloaded, 1);
}

#[tokio::test]
async fn test_video_layout_wins_when_it_matches_more() {
    let server = MockServer::start().await;
    serve(&server, "/single/v1.png", 200, 1).await;
    serve(&server, "/single/v2.png", 200, 1).await;
    serve(&server, "/single/g1.png", 200, 0).await;

    let base = server.uri();
    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 0);
    let session = FakeSession::new(vec![Snapshot {
        grid: vec![src_img(&base, "g1")],
        video: vec![src_img(&base, "v1"), src_img(&base, "v2")],
        ..Snapshot::default()
    }]);

    let report = harvest(&session, &opts).await.unwrap();
    assert_eq!(report.strategy, Some(LayoutStrategy::VideoPin));
    assert_eq!(report.downloaded, 2);
}

#[tokio::test]
async fn test_equal_counts_use_grid_items() {
    let server = MockServer::start().await;
    serve(&server, "/single/g1.png", 200, 1).await;
    serve(&server, "/single/v1.png", 200, 0).await;

    let base = server.uri();
    let work = tempfile::tempdir().unwrap();
    let opts = options(work.path(), 0);
    let session = FakeSession::new(vec![Snapshot {
        grid: vec![src_img(&base, "g1")],
        video: vec![src_img(&base, "v1")],
        ..Snapshot::default()
    }]);

    let report = harvest(&session, &opts).await.unwrap();
    assert_eq!(report.strategy, Some(LayoutStrategy::GridItem));
}

#[tokio::test]
async fn test_invalid_target_is_rejected_before_run_starts() {
    let work = tempfile::tempdir().unwrap();
    let mut opts = options(work.path(), 0);
    opts.target_url = "not-a-url".into();
    let session = FakeSession::new(vec![grid(vec![None])]);

    let err = harvest(&session, &opts).await.unwrap_err();
    assert!(matches!(err, HarvestError::InvalidConfig(_)));
    assert!(!work.path().join("runs").exists());
}
