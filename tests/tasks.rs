//! Integration tests for task execution: upload, submission, the worker's
//! state machine, source resolution and the built-in handlers.
//!
//! Everything here runs on the in-memory stores. Only image and PDF inputs
//! are used, and none of them needs pdfium.

use async_trait::async_trait;
use edgequake_docpipe::task::handlers::{OcrEngine, OcrOutputDirs};
use edgequake_docpipe::{
    DocPipeError, FileRecord, FileStatus, MemoryObjectStore, MemoryRecordStore, ObjectStore,
    RecordStore, RunOutcome, Submitter, TaskContext, TaskHandler, TaskRegistry, TaskRun, TaskStatus,
    TaskTrigger, Worker,
};
use serde_json::{json, Map, Value};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

const BUCKET: &str = "test-bucket";
const MINI_PDF: &[u8] = b"%PDF-1.4\n1 0 obj<<>>endobj\ntrailer<<>>\n%%EOF\n";

// ── Test helpers ─────────────────────────────────────────────────────────────

struct Harness {
    objects: Arc<MemoryObjectStore>,
    records: Arc<MemoryRecordStore>,
    submitter: Submitter,
    worker: Worker,
    rx: mpsc::Receiver<TaskTrigger>,
}

fn harness(registry: TaskRegistry) -> Harness {
    let objects = Arc::new(MemoryObjectStore::new(BUCKET));
    let records = Arc::new(MemoryRecordStore::new());
    let (tx, rx) = mpsc::channel(16);
    Harness {
        submitter: Submitter::new(objects.clone(), records.clone(), tx),
        worker: Worker::new(Arc::new(registry), objects.clone(), records.clone()),
        objects,
        records,
        rx,
    }
}

fn defaults() -> TaskRegistry {
    TaskRegistry::with_defaults(None).unwrap()
}

fn params(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap_or_default()
}

fn png(w: u32, h: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    image::RgbImage::from_pixel(w, h, image::Rgb([10, 20, 30]))
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Records how often it ran and fails on demand.
struct Recorder {
    calls: AtomicUsize,
    fail_with: Option<&'static str>,
}

impl Recorder {
    fn new(fail_with: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_with,
        })
    }
}

#[async_trait]
impl TaskHandler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn run(&self, ctx: &TaskContext<'_>, data: &[u8]) -> Result<(), DocPipeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(ctx.run.status, TaskStatus::Running);
        assert!(!data.is_empty());
        match self.fail_with {
            Some(msg) => Err(DocPipeError::Internal(msg.to_string())),
            None => Ok(()),
        }
    }
}

fn recorder_registry(recorder: Arc<Recorder>) -> TaskRegistry {
    let mut reg = TaskRegistry::new();
    reg.register(recorder).unwrap();
    reg
}

async fn run_of(h: &Harness, id: &str) -> TaskRun {
    h.records.get_run(id).await.unwrap().unwrap()
}

// ── State machine ────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_run_goes_pending_running_succeeded() {
    let recorder = Recorder::new(None);
    let mut h = harness(recorder_registry(recorder.clone()));
    let file = h.submitter.upload("alice", "a.pdf", MINI_PDF.to_vec(), None).await.unwrap();
    let runs = h.submitter.submit(&[file.id.clone()], "recorder", Map::new()).await.unwrap();
    assert_eq!(run_of(&h, &runs[0].id).await.status, TaskStatus::Pending);

    let trigger = h.rx.recv().await.unwrap();
    let outcome = h.worker.run_task(&trigger.task_run_id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Succeeded);

    let run = run_of(&h, &runs[0].id).await;
    assert_eq!(run.status, TaskStatus::Succeeded);
    assert!(run.started_at.is_some());
    assert!(run.finished_at >= run.started_at);
    assert_eq!(run.error, None);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_error_marks_failed_and_propagates() {
    let recorder = Recorder::new(Some("disk on fire"));
    let h = harness(recorder_registry(recorder));
    let file = h.submitter.upload("alice", "a.pdf", MINI_PDF.to_vec(), None).await.unwrap();
    let runs = h.submitter.submit(&[file.id.clone()], "recorder", Map::new()).await.unwrap();

    let err = h.worker.run_task(&runs[0].id).await.unwrap_err();
    assert!(err.to_string().contains("disk on fire"));

    let run = run_of(&h, &runs[0].id).await;
    assert_eq!(run.status, TaskStatus::Failed);
    assert!(run.error.unwrap().contains("disk on fire"));
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn terminal_runs_are_not_re_executed() {
    let recorder = Recorder::new(None);
    let h = harness(recorder_registry(recorder.clone()));
    let file = h.submitter.upload("alice", "a.pdf", MINI_PDF.to_vec(), None).await.unwrap();
    let runs = h.submitter.submit(&[file.id.clone()], "recorder", Map::new()).await.unwrap();

    h.worker.run_task(&runs[0].id).await.unwrap();
    let first = run_of(&h, &runs[0].id).await;
    assert_eq!(h.worker.run_task(&runs[0].id).await.unwrap(), RunOutcome::Skipped);
    assert_eq!(run_of(&h, &runs[0].id).await, first);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn interrupted_running_run_is_redriven_keeping_start_time() {
    let recorder = Recorder::new(None);
    let h = harness(recorder_registry(recorder.clone()));
    let file = h.submitter.upload("alice", "a.pdf", MINI_PDF.to_vec(), None).await.unwrap();
    let runs = h.submitter.submit(&[file.id.clone()], "recorder", Map::new()).await.unwrap();

    let mut crashed = run_of(&h, &runs[0].id).await;
    let t0 = chrono::Utc::now() - chrono::Duration::minutes(5);
    crashed.mark_running(t0).unwrap();
    h.records.update_run(&crashed).await.unwrap();

    assert_eq!(h.worker.run_task(&runs[0].id).await.unwrap(), RunOutcome::Succeeded);
    let run = run_of(&h, &runs[0].id).await;
    assert_eq!(run.started_at, Some(t0));
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_run_is_a_no_op() {
    let h = harness(defaults());
    assert_eq!(h.worker.run_task("nope").await.unwrap(), RunOutcome::Skipped);
}

#[tokio::test]
async fn deleted_file_fails_the_run_without_dispatch() {
    let recorder = Recorder::new(None);
    let h = harness(recorder_registry(recorder.clone()));
    let file = h.submitter.upload("alice", "a.pdf", MINI_PDF.to_vec(), None).await.unwrap();
    let runs = h.submitter.submit(&[file.id.clone()], "recorder", Map::new()).await.unwrap();
    h.records.set_file_status(&file.id, FileStatus::Deleted).await.unwrap();

    assert_eq!(h.worker.run_task(&runs[0].id).await.unwrap(), RunOutcome::FileMissing);
    let run = run_of(&h, &runs[0].id).await;
    assert_eq!(run.status, TaskStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("file not found"));
    assert!(run.started_at.is_some() && run.finished_at.is_some());
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_task_name_fails_the_run() {
    let h = harness(defaults());
    let file = h.submitter.upload("alice", "a.pdf", MINI_PDF.to_vec(), None).await.unwrap();
    let runs = h.submitter.submit(&[file.id.clone()], "Mystery", Map::new()).await.unwrap();

    let err = h.worker.run_task(&runs[0].id).await.unwrap_err();
    assert!(matches!(err, DocPipeError::UnknownTask(ref n) if n == "mystery"));
    assert_eq!(
        run_of(&h, &runs[0].id).await.error.as_deref(),
        Some("unknown task: mystery")
    );
}

#[tokio::test]
async fn missing_source_bytes_fail_with_attempt_list() {
    let recorder = Recorder::new(None);
    let h = harness(recorder_registry(recorder.clone()));
    let mut file = FileRecord::new("bob", "lost.pdf");
    file.storage_uri = Some(format!("s3://{BUCKET}/somewhere/else.pdf"));
    h.records.insert_file(file.clone()).await.unwrap();
    let run = TaskRun::new(&file.id, "recorder", Map::new());
    h.records.insert_run(run.clone()).await.unwrap();

    let err = h.worker.run_task(&run.id).await.unwrap_err();
    let diag = err.diagnostic().expect("structured diagnostic");
    let froms: Vec<&str> = diag["tried"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["from"].as_str().unwrap())
        .collect();
    assert_eq!(froms, vec!["db.storage_uri", "new_rule", "old_rule"]);

    let stored = run_of(&h, &run.id).await;
    assert_eq!(stored.status, TaskStatus::Failed);
    let msg = stored.error.unwrap();
    assert!(msg.contains(&format!("old_rule={BUCKET}/uploads/{}/lost.pdf", file.id)), "{msg}");
    assert!(msg.contains(&format!("new_rule={BUCKET}/bob/source_files/{}/lost.pdf", file.id)), "{msg}");
    assert!(msg.contains("db.storage_uri=test-bucket/somewhere/else.pdf"), "{msg}");
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stale_record_uri_falls_back_to_canonical_key() {
    let recorder = Recorder::new(None);
    let h = harness(recorder_registry(recorder.clone()));
    let mut file = FileRecord::new("bob", "moved.pdf");
    file.storage_uri = Some(format!("s3://{BUCKET}/stale/moved.pdf"));
    h.objects
        .insert(BUCKET, &format!("bob/source_files/{}/moved.pdf", file.id), MINI_PDF.to_vec())
        .await;
    h.records.insert_file(file.clone()).await.unwrap();
    let run = TaskRun::new(&file.id, "recorder", Map::new());
    h.records.insert_run(run.clone()).await.unwrap();

    assert_eq!(h.worker.run_task(&run.id).await.unwrap(), RunOutcome::Succeeded);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn legacy_upload_location_is_found() {
    let recorder = Recorder::new(None);
    let h = harness(recorder_registry(recorder.clone()));
    let file = FileRecord::new("bob", "old.pdf");
    h.objects
        .insert(BUCKET, &format!("uploads/{}/old.pdf", file.id), MINI_PDF.to_vec())
        .await;
    h.records.insert_file(file.clone()).await.unwrap();
    let run = TaskRun::new(&file.id, "recorder", Map::new());
    h.records.insert_run(run.clone()).await.unwrap();

    assert_eq!(h.worker.run_task(&run.id).await.unwrap(), RunOutcome::Succeeded);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn serve_drains_the_queue() {
    let recorder = Recorder::new(None);
    let h = harness(recorder_registry(recorder.clone()));
    let a = h.submitter.upload("alice", "a.pdf", MINI_PDF.to_vec(), None).await.unwrap();
    let b = h.submitter.upload("alice", "b.pdf", MINI_PDF.to_vec(), None).await.unwrap();
    let runs = h
        .submitter
        .submit(&[a.id.clone(), b.id.clone()], "recorder", Map::new())
        .await
        .unwrap();

    let Harness { worker, submitter, rx, records, .. } = h;
    drop(submitter);
    worker.serve(rx).await;

    for run in runs {
        let stored = records.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Succeeded);
    }
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 2);
}

// ── Built-in handlers ────────────────────────────────────────────────────────

#[tokio::test]
async fn doc_convert_zips_pages_with_jpg_names() {
    let h = harness(defaults());
    let file = h.submitter.upload("alice", "scan.final.png", png(40, 20), None).await.unwrap();
    let runs = h
        .submitter
        .submit(&[file.id.clone()], "doc_convert", params(json!({"image_format": "jpeg", "max_side": 10})))
        .await
        .unwrap();
    h.worker.run_task(&runs[0].id).await.unwrap();

    let artifacts = h.records.list_artifacts(&runs[0].id).await.unwrap();
    assert_eq!(artifacts.len(), 1);
    let art = &artifacts[0];
    assert_eq!(art.kind, "images_zip");
    assert_eq!(art.meta, json!({"pages": 1, "format": "JPEG"}));

    let key = format!("alice/artifacts/{}/{}/zip/scan.final.images.zip", file.id, runs[0].id);
    assert_eq!(art.storage_uri, format!("s3://{BUCKET}/{key}"));
    let zip_bytes = h.objects.get(BUCKET, &key).await.unwrap().unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes)).unwrap();
    assert_eq!(archive.len(), 1);
    let mut entry = archive.by_index(0).unwrap();
    assert_eq!(entry.name(), "page_0001.jpg");
    let mut data = Vec::new();
    entry.read_to_end(&mut data).unwrap();
    let page = image::load_from_memory(&data).unwrap();
    assert_eq!((page.width(), page.height()), (10, 5));
}

#[tokio::test]
async fn doc_convert_rejects_bad_params() {
    let h = harness(defaults());
    let file = h.submitter.upload("alice", "a.png", png(4, 4), None).await.unwrap();
    let runs = h
        .submitter
        .submit(&[file.id.clone()], "doc_convert", params(json!({"image_format": "gif"})))
        .await
        .unwrap();
    let err = h.worker.run_task(&runs[0].id).await.unwrap_err();
    assert!(matches!(err, DocPipeError::InvalidParams(_)), "got {err}");
    assert_eq!(run_of(&h, &runs[0].id).await.status, TaskStatus::Failed);
}

#[tokio::test]
async fn to_pdf_stores_pdf_sources_unchanged() {
    let h = harness(defaults());
    let file = h.submitter.upload("alice", "Deck v2.pdf", MINI_PDF.to_vec(), None).await.unwrap();
    let runs = h.submitter.submit(&[file.id.clone()], "to_pdf", Map::new()).await.unwrap();
    h.worker.run_task(&runs[0].id).await.unwrap();

    let artifacts = h.records.list_artifacts(&runs[0].id).await.unwrap();
    assert_eq!(artifacts[0].kind, "pdf");
    assert_eq!(artifacts[0].meta, json!({"source": "to_pdf"}));
    let key = format!("alice/artifacts/{}/{}/to-pdf/Deck v2.pdf", file.id, runs[0].id);
    assert_eq!(h.objects.get(BUCKET, &key).await.unwrap().as_deref(), Some(MINI_PDF));
    assert_eq!(h.objects.object(BUCKET, &key).await.unwrap().content_type, "application/pdf");
}

#[tokio::test]
async fn to_pdf_sync_returns_pdf_without_queueing() {
    let h = harness(defaults());
    let file = h.submitter.upload("alice", "x.pdf", MINI_PDF.to_vec(), None).await.unwrap();

    let pdf = h.worker.to_pdf_sync(&file.id).await.unwrap();
    assert_eq!(pdf, MINI_PDF);
    // No trigger goes through the queue for the synchronous path.
    let mut rx = h.rx;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn to_pdf_sync_errors() {
    let h = harness(defaults());
    assert!(matches!(
        h.worker.to_pdf_sync("nope").await,
        Err(DocPipeError::FileNotFound { .. })
    ));

    let orphan = FileRecord::new("alice", "ghost.pdf");
    h.records.insert_file(orphan.clone()).await.unwrap();
    let err = h.worker.to_pdf_sync(&orphan.id).await.unwrap_err();
    assert!(matches!(err, DocPipeError::SourceNotFound { ref attempts } if attempts.len() == 2));
}

struct StubOcr;

#[async_trait]
impl OcrEngine for StubOcr {
    async fn analyze(&self, pdf: &[u8], stem: &str, out: &OcrOutputDirs) -> Result<Option<String>, DocPipeError> {
        assert!(pdf.starts_with(b"%PDF"));
        let io = |p: &std::path::Path, e: std::io::Error| DocPipeError::io(p, e);
        let md = out.extract.join(format!("{stem}.md"));
        tokio::fs::write(&md, "# Title\n").await.map_err(|e| io(&md, e))?;
        let layout = out.extract.join(format!("{stem}_layout.pdf"));
        tokio::fs::write(&layout, b"%PDF-layout").await.map_err(|e| io(&layout, e))?;
        let fig = out.images.join("fig1.png");
        tokio::fs::write(&fig, b"png").await.map_err(|e| io(&fig, e))?;
        Ok(Some(format!("{stem}_layout.pdf")))
    }
}

#[tokio::test]
async fn vlm_ocr_uploads_trees_and_records_manifests() {
    let h = harness(TaskRegistry::with_defaults(Some(Arc::new(StubOcr))).unwrap());
    let file = h.submitter.upload("carol", "paper.pdf", MINI_PDF.to_vec(), None).await.unwrap();
    let runs = h.submitter.submit(&[file.id.clone()], "vlm_ocr", Map::new()).await.unwrap();
    h.worker.run_task(&runs[0].id).await.unwrap();

    let prefix = format!("carol/artifacts/{}/{}/vlm", file.id, runs[0].id);
    let artifacts = h.records.list_artifacts(&runs[0].id).await.unwrap();
    let kinds: Vec<&str> = artifacts.iter().map(|a| a.kind.as_str()).collect();
    assert_eq!(kinds, vec!["vlm_md_manifest", "vlm_images_manifest", "vlm_layout_pdf"]);

    assert_eq!(artifacts[0].storage_uri, format!("s3://{BUCKET}/{prefix}/extract/"));
    assert_eq!(
        artifacts[0].meta,
        json!({"files": ["paper.md", "paper_layout.pdf", "paper_origin.bin"]})
    );
    assert_eq!(artifacts[1].meta, json!({"files": ["fig1.png"]}));
    assert_eq!(artifacts[2].meta, json!({"filename": "paper_layout.pdf"}));
    assert_eq!(
        artifacts[2].storage_uri,
        format!("s3://{BUCKET}/{prefix}/extract/paper_layout.pdf")
    );

    let keys = h.objects.keys(BUCKET, &prefix).await;
    assert_eq!(
        keys,
        vec![
            format!("{prefix}/extract/paper.md"),
            format!("{prefix}/extract/paper_layout.pdf"),
            format!("{prefix}/extract/paper_origin.bin"),
            format!("{prefix}/images/fig1.png"),
        ]
    );
    assert_eq!(
        h.objects.get(BUCKET, &format!("{prefix}/extract/paper_origin.bin")).await.unwrap().as_deref(),
        Some(MINI_PDF)
    );
}
