//! End-to-end upload jobs driven through fake collaborators.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use uplink_config::{JobOptions, SPLIT_DIR_NAME, SeedMode, UploadSettings};
use uplink_core::{
    ChatRef, MarkupRequest, MediaKind, MessageRef, MessageTransport, UploadListener,
};
use uplink_engine::{
    ALL_CORRUPTED_MESSAGE, CANCELLED_MESSAGE, Collaborators, ELEVATED_THRESHOLD_BYTES,
    JobOutcome, MAX_NAME_CHARS, NO_FILES_MESSAGE, SUPERGROUP_REQUIRED_MESSAGE, UploadJob,
    UploadRequest, UploadService, clean_unwanted,
};
use uplink_telemetry::{FanoutTarget, Metrics};
use uplink_test_support::{
    Call, FakeDirectory, FakeMarkup, FakeNormalizer, FakeProbe, FakeThumbnailer, FakeTransport,
    Failure, ListenerEvent, Op, RecordingListener, fast_settings, origin_in, supergroup,
    write_file,
};

const OWNER: i64 = 42;
const ORIGIN_CHAT: i64 = -1001;

struct Fixture {
    temp: TempDir,
    root: PathBuf,
    settings: UploadSettings,
    origin: MessageRef,
    standard: Arc<FakeTransport>,
    elevated: Option<Arc<FakeTransport>>,
    directory: Arc<FakeDirectory>,
    normalizer: Arc<FakeNormalizer>,
    thumbnailer: Arc<FakeThumbnailer>,
    markup: Arc<FakeMarkup>,
    metrics: Metrics,
}

impl Fixture {
    fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let root = temp.path().join("job");
        std::fs::create_dir_all(&root)?;
        let settings = fast_settings(temp.path());
        Ok(Self {
            temp,
            root,
            settings,
            origin: origin_in(supergroup(ORIGIN_CHAT), 1),
            standard: Arc::new(FakeTransport::new()),
            elevated: None,
            directory: Arc::new(FakeDirectory::new()),
            normalizer: Arc::new(FakeNormalizer::new()),
            thumbnailer: Arc::new(FakeThumbnailer::new()),
            markup: Arc::new(FakeMarkup::new()),
            metrics: Metrics::new()?,
        })
    }

    fn file(&self, name: &str, len: usize) -> Result<PathBuf> {
        write_file(&self.root, name, len)
    }

    fn sparse_file(&self, name: &str, len: u64) -> Result<PathBuf> {
        let path = self.root.join(name);
        std::fs::File::create(&path)?.set_len(len)?;
        Ok(path)
    }

    fn enable_elevated(&mut self) {
        self.elevated = Some(Arc::new(self.standard.sibling()));
        self.settings.elevated_identity = true;
    }

    fn options(&self) -> JobOptions {
        JobOptions {
            owner_id: OWNER,
            ..JobOptions::default()
        }
    }

    fn job(&self, options: JobOptions) -> (UploadJob, Arc<RecordingListener>) {
        let standard: Arc<dyn MessageTransport> = self.standard.clone();
        let elevated = self
            .elevated
            .clone()
            .map(|elevated| elevated as Arc<dyn MessageTransport>);
        let collaborators = Collaborators {
            standard,
            elevated,
            directory: self.directory.clone(),
            probe: Arc::new(FakeProbe::new()),
            thumbnailer: self.thumbnailer.clone(),
            normalizer: self.normalizer.clone(),
            markup: self.markup.clone(),
        };
        let service =
            UploadService::new(self.settings.clone(), collaborators, self.metrics.clone());
        let listener = Arc::new(RecordingListener::new());
        let request = UploadRequest {
            name: "Weekend.Release".into(),
            root: self.root.clone(),
            size: 1024,
            origin: self.origin,
            options,
            pm_anchor: None,
            owner_label: None,
        };
        let job = service.create_job(request, Arc::clone(&listener) as Arc<dyn UploadListener>);
        (job, listener)
    }

    async fn run(&self, options: JobOptions) -> (JobOutcome, Vec<ListenerEvent>) {
        let (job, listener) = self.job(options);
        let outcome = job.run().await;
        (outcome, listener.events().await)
    }
}

fn completed(outcome: JobOutcome) -> Result<uplink_core::JobResult> {
    match outcome {
        JobOutcome::Completed(result) => Ok(result),
        other => Err(anyhow::anyhow!("job did not complete: {other:?}")),
    }
}

fn upload_names(transport: &FakeTransport) -> Vec<String> {
    transport
        .uploads()
        .into_iter()
        .map(|upload| upload.file_name)
        .collect()
}

#[tokio::test]
async fn files_upload_in_natural_order_as_a_reply_chain() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.settings.extension_filter = vec![".nfo".into()];
    fixture.file("b10.mkv", 10)?;
    fixture.file("b2.mkv", 10)?;
    let notes = fixture.file("release.nfo", 10)?;

    let (outcome, events) = fixture.run(fixture.options()).await;
    let result = completed(outcome)?;

    assert_eq!(upload_names(&fixture.standard), vec!["b2.mkv", "b10.mkv"]);
    let uploads = fixture.standard.uploads();
    assert_eq!(uploads[0].reply_to, 1);
    assert_eq!(uploads[1].reply_to, 100);
    assert!(uploads.iter().all(|upload| upload.kind == MediaKind::Video));
    assert!(!notes.exists());
    assert!(!fixture.root.join("b2.mkv").exists());

    assert_eq!(result.total_files, 2);
    assert_eq!(result.corrupted, 0);
    let labels: Vec<_> = result.links.iter().map(|link| link.label.as_str()).collect();
    assert_eq!(labels, vec!["b2.mkv", "b10.mkv"]);
    assert_eq!(fixture.standard.copies_to(OWNER), 2);
    assert_eq!(events, vec![ListenerEvent::Complete(result)]);
    assert_eq!(fixture.metrics.uploaded("video"), 2);
    Ok(())
}

#[tokio::test]
async fn zero_size_files_count_as_corrupted() -> Result<()> {
    let fixture = Fixture::new()?;
    let empty = fixture.file("empty.mkv", 0)?;
    fixture.file("movie.mkv", 10)?;

    let (outcome, _) = fixture.run(fixture.options()).await;
    let result = completed(outcome)?;

    assert_eq!(result.total_files, 2);
    assert_eq!(result.corrupted, 1);
    assert!(!empty.exists());
    assert_eq!(upload_names(&fixture.standard), vec!["movie.mkv"]);
    assert_eq!(fixture.metrics.snapshot().files_corrupted_total, 1);
    Ok(())
}

#[tokio::test]
async fn only_empty_files_fail_the_job() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.file("empty.mkv", 0)?;

    let (outcome, events) = fixture.run(fixture.options()).await;

    assert_eq!(outcome, JobOutcome::Failed(ALL_CORRUPTED_MESSAGE.into()));
    assert_eq!(
        events,
        vec![ListenerEvent::Error(ALL_CORRUPTED_MESSAGE.into())]
    );
    Ok(())
}

#[tokio::test]
async fn filtered_or_missing_files_report_nothing_to_upload() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.settings.extension_filter = vec![".txt".into()];
    fixture.file("readme.txt", 4)?;

    let (outcome, events) = fixture.run(fixture.options()).await;

    assert_eq!(outcome, JobOutcome::Failed(NO_FILES_MESSAGE.into()));
    assert_eq!(events.len(), 1);
    assert!(fixture.standard.uploads().is_empty());
    Ok(())
}

#[tokio::test]
async fn long_names_are_shortened_before_upload() -> Result<()> {
    let fixture = Fixture::new()?;
    let long = format!("{}.mkv", "Episode".repeat(12));
    fixture.file(&long, 10)?;

    let (outcome, _) = fixture.run(fixture.options()).await;
    completed(outcome)?;

    let names = upload_names(&fixture.standard);
    assert_eq!(names.len(), 1);
    assert!(names[0].chars().count() <= MAX_NAME_CHARS);
    assert!(names[0].ends_with(".mkv"));
    Ok(())
}

#[tokio::test]
async fn multi_part_files_are_grouped_until_the_sequence_breaks() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.file("a.part1.mkv", 10)?;
    fixture.file("a.part2.mkv", 10)?;
    fixture.file("b.mkv", 10)?;
    let options = JobOptions {
        media_group: true,
        ..fixture.options()
    };

    let (outcome, _) = fixture.run(options).await;
    let result = completed(outcome)?;

    assert_eq!(fixture.standard.media_groups(), vec![2]);
    let uploads = fixture.standard.uploads();
    assert_eq!(uploads.len(), 3);
    let deleted = fixture.standard.deleted();
    assert!(deleted.contains(&(ORIGIN_CHAT, 100)));
    assert!(deleted.contains(&(ORIGIN_CHAT, 101)));
    assert!(!fixture.standard.exists(ORIGIN_CHAT, 100));

    // The file after the group replies to the grouped post, not a deleted original.
    assert!(!deleted.contains(&(ORIGIN_CHAT, uploads[2].reply_to)));
    assert!(uploads[2].reply_to > 101);

    let labels: Vec<_> = result.links.iter().map(|link| link.label.as_str()).collect();
    assert_eq!(labels, vec!["a.part1.mkv", "a.part2.mkv", "b.mkv"]);
    assert!(
        fixture
            .standard
            .calls()
            .iter()
            .any(|call| matches!(call, Call::CopyGroup { to, .. } if *to == OWNER))
    );
    assert_eq!(fixture.standard.copies_to(OWNER), 2);
    Ok(())
}

#[tokio::test]
async fn seeded_parts_rewritten_to_mkv_still_group() -> Result<()> {
    let fixture = Fixture::new()?;
    let first = fixture.file("a.part1.avi", 10)?;
    let second = fixture.file("a.part2.avi", 10)?;
    let options = JobOptions {
        media_group: true,
        seed: SeedMode::PreserveOriginals,
        ..fixture.options()
    };

    let (outcome, _) = fixture.run(options).await;
    completed(outcome)?;

    assert_eq!(upload_names(&fixture.standard), vec!["a.part1.mkv", "a.part2.mkv"]);
    assert_eq!(fixture.standard.media_groups(), vec![2]);
    assert!(first.exists());
    assert!(second.exists());
    Ok(())
}

#[tokio::test]
async fn groups_never_exceed_ten_items() -> Result<()> {
    let fixture = Fixture::new()?;
    for part in 1..=11 {
        fixture.file(&format!("v.part{part}.mkv"), 10)?;
    }
    let options = JobOptions {
        media_group: true,
        ..fixture.options()
    };

    let (outcome, _) = fixture.run(options).await;
    let result = completed(outcome)?;

    assert_eq!(fixture.standard.media_groups(), vec![10]);
    assert_eq!(fixture.metrics.snapshot().groups_flushed_total, 1);
    assert_eq!(result.links.len(), 11);
    // One grouped copy plus the leftover part copied on its own.
    assert_eq!(fixture.standard.copies_to(OWNER), 2);
    Ok(())
}

#[tokio::test]
async fn oversized_files_use_the_elevated_identity_and_are_mirrored() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.enable_elevated();
    fixture.sparse_file("big.mkv", ELEVATED_THRESHOLD_BYTES + 1)?;
    fixture.sparse_file("edge.mkv", ELEVATED_THRESHOLD_BYTES)?;

    let (outcome, _) = fixture.run(fixture.options()).await;
    completed(outcome)?;

    let elevated = fixture
        .elevated
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("elevated transport missing"))?;
    assert_eq!(upload_names(elevated), vec!["big.mkv"]);
    assert_eq!(upload_names(&fixture.standard), vec!["edge.mkv"]);

    let original = 100;
    assert!(fixture.standard.calls().contains(&Call::Copy {
        to: ORIGIN_CHAT,
        from: original,
        reply_to: Some(1),
        has_markup: false,
    }));
    assert_eq!(elevated.deleted(), vec![(ORIGIN_CHAT, original)]);
    assert!(!fixture.standard.exists(ORIGIN_CHAT, original));
    Ok(())
}

#[tokio::test]
async fn elevated_uploads_need_a_supergroup_without_log_destinations() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.enable_elevated();
    fixture.origin = origin_in(ChatRef::private(OWNER), 7);
    fixture.file("movie.mkv", 10)?;

    let (outcome, events) = fixture.run(fixture.options()).await;

    assert_eq!(
        outcome,
        JobOutcome::Failed(SUPERGROUP_REQUIRED_MESSAGE.into())
    );
    assert_eq!(
        events,
        vec![ListenerEvent::Error(SUPERGROUP_REQUIRED_MESSAGE.into())]
    );
    assert!(fixture.standard.uploads().is_empty());
    assert!(fixture.root.join("movie.mkv").exists());
    Ok(())
}

#[tokio::test]
async fn private_chat_uploads_hide_links_and_skip_pm_copies() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.origin = origin_in(ChatRef::private(OWNER), 7);
    fixture.file("movie.mkv", 10)?;

    let (outcome, _) = fixture.run(fixture.options()).await;
    let result = completed(outcome)?;

    assert!(result.links.is_empty());
    assert_eq!(result.total_files, 1);
    assert_eq!(fixture.standard.copies_to(OWNER), 0);
    Ok(())
}

#[tokio::test]
async fn unreachable_dumps_do_not_block_the_others() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.directory = Arc::new(
        FakeDirectory::new()
            .with_channel("@one", -2001)
            .with_channel("@two", -2002)
            .with_channel("@three", -2003),
    );
    fixture.standard.fail_copies_to(-2002);
    fixture.file("movie.mkv", 10)?;
    let options = fixture.options().with_dump_list("@one @gone @two @three");

    let (outcome, _) = fixture.run(options).await;
    completed(outcome)?;

    assert_eq!(fixture.standard.copies_to(-2001), 1);
    assert_eq!(fixture.standard.copies_to(-2002), 0);
    assert_eq!(fixture.standard.copies_to(-2003), 1);
    assert_eq!(fixture.standard.copies_to(OWNER), 1);
    assert_eq!(fixture.metrics.fanout_failures(FanoutTarget::Dump), 2);
    Ok(())
}

#[tokio::test]
async fn log_destinations_anchor_uploads_under_job_placeholders() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.origin = origin_in(ChatRef::private(OWNER), 7);
    fixture.settings.log_destinations = vec!["@log1".into(), "@log2".into()];
    fixture.directory = Arc::new(
        FakeDirectory::new()
            .with_channel("@log1", -3001)
            .with_channel("@log2", -3002),
    );
    fixture.file("e1.mkv", 10)?;
    fixture.file("e2.mkv", 10)?;

    let (outcome, _) = fixture.run(fixture.options()).await;
    let result = completed(outcome)?;

    let calls = fixture.standard.calls();
    let placeholders: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            Call::Text { chat, text } => Some((*chat, text.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(placeholders.len(), 2);
    assert_eq!(placeholders[0].0, -3001);
    assert_eq!(placeholders[1].0, -3002);
    assert!(placeholders[0].1.starts_with("Task started"));
    assert!(placeholders[0].1.contains("ID: 42"));

    // Placeholders are 100 and 101; e1 is 102 with copies 103 (pm) and 104 (log2).
    let uploads = fixture.standard.uploads();
    assert_eq!((uploads[0].chat, uploads[0].reply_to), (-3001, 100));
    assert_eq!((uploads[1].chat, uploads[1].reply_to), (-3001, 102));
    let deleted = fixture.standard.deleted();
    assert!(deleted.contains(&(-3001, 100)));
    assert!(deleted.contains(&(-3002, 101)));
    assert!(calls.contains(&Call::Copy {
        to: -3002,
        from: 102,
        reply_to: Some(101),
        has_markup: false,
    }));
    assert!(calls.contains(&Call::Copy {
        to: -3002,
        from: 105,
        reply_to: Some(104),
        has_markup: false,
    }));
    assert_eq!(fixture.standard.copies_to(OWNER), 2);
    assert_eq!(result.links.len(), 2);
    Ok(())
}

#[tokio::test]
async fn unreachable_log_destination_fails_before_uploading() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.settings.log_destinations = vec!["@missing".into()];
    fixture.file("movie.mkv", 10)?;

    let (outcome, _) = fixture.run(fixture.options()).await;

    match outcome {
        JobOutcome::Failed(message) => {
            assert!(message.starts_with("Could not start the upload in @missing"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(fixture.standard.uploads().is_empty());
    Ok(())
}

#[tokio::test]
async fn flood_waits_resend_the_same_file() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture
        .standard
        .fail_next(Op::Video, Failure::FloodWait(Duration::from_millis(5)));
    fixture.file("movie.mkv", 10)?;

    let (outcome, _) = fixture.run(fixture.options()).await;
    let result = completed(outcome)?;

    assert_eq!(fixture.standard.failures(), vec![Op::Video]);
    assert_eq!(upload_names(&fixture.standard), vec!["movie.mkv"]);
    assert_eq!(result.corrupted, 0);
    let snapshot = fixture.metrics.snapshot();
    assert_eq!(snapshot.flood_waits_total, 1);
    assert_eq!(snapshot.send_retries_total, 0);
    Ok(())
}

#[tokio::test]
async fn malformed_media_falls_back_to_document() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.standard.fail_next(Op::Video, Failure::Malformed);
    fixture.file("movie.mkv", 10)?;

    let (outcome, _) = fixture.run(fixture.options()).await;
    completed(outcome)?;

    let uploads = fixture.standard.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].kind, MediaKind::Document);
    let snapshot = fixture.metrics.snapshot();
    assert_eq!(snapshot.document_fallbacks_total, 1);
    assert_eq!(snapshot.send_retries_total, 0);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_mark_only_that_file_corrupted() -> Result<()> {
    let fixture = Fixture::new()?;
    for _ in 0..3 {
        fixture.standard.fail_next(Op::Document, Failure::Failed);
    }
    fixture.file("a.bin", 10)?;
    fixture.file("b.bin", 10)?;

    let (outcome, _) = fixture.run(fixture.options()).await;
    let result = completed(outcome)?;

    assert_eq!(result.total_files, 2);
    assert_eq!(result.corrupted, 1);
    assert_eq!(upload_names(&fixture.standard), vec!["b.bin"]);
    assert_eq!(fixture.standard.failures().len(), 3);
    assert_eq!(fixture.metrics.snapshot().send_retries_total, 2);
    Ok(())
}

#[tokio::test]
async fn cancellation_stops_transfers_and_reports_once() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.file("a.mkv", 10)?;
    fixture.file("b.mkv", 10)?;
    let (job, listener) = fixture.job(fixture.options());
    let handle = job.cancel_handle();
    fixture.standard.on_upload(move |_| {
        handle.cancel();
    });

    let outcome = job.run().await;

    assert_eq!(outcome, JobOutcome::Cancelled);
    assert_eq!(
        listener.events().await,
        vec![ListenerEvent::Error(CANCELLED_MESSAGE.into())]
    );
    assert_eq!(fixture.standard.stop_count(), 1);
    assert!(fixture.standard.uploads().is_empty());
    assert!(fixture.root.join("a.mkv").exists());
    assert!(fixture.root.join("b.mkv").exists());
    assert!(!job.cancel_handle().cancel());
    Ok(())
}

#[tokio::test]
async fn buttons_are_built_per_file_and_replicated_with_copies() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.file("movie.mkv", 10)?;
    let options = JobOptions {
        screenshots: 2,
        ..fixture.options()
    };

    let (outcome, _) = fixture.run(options).await;
    completed(outcome)?;

    assert_eq!(
        fixture.markup.requests(),
        vec![MarkupRequest {
            screenshots: 2,
            media_info: false,
            is_video: true,
        }]
    );
    assert!(fixture.standard.uploads()[0].has_markup);
    assert!(
        fixture
            .standard
            .calls()
            .iter()
            .any(|call| matches!(call, Call::EditMarkup { chat, .. } if *chat == OWNER))
    );
    Ok(())
}

#[tokio::test]
async fn custom_thumbnail_is_used_for_every_file_then_removed() -> Result<()> {
    let mut fixture = Fixture::new()?;
    let source = fixture.temp.path().join("cover.png");
    image::RgbImage::new(32, 24).save(&source)?;
    fixture.thumbnailer = Arc::new(FakeThumbnailer::new().with_image(&source));
    fixture.file("e1.mkv", 10)?;
    fixture.file("e2.mkv", 10)?;
    let options = JobOptions {
        custom_thumbnail: Some("https://images.example.test/cover.png".into()),
        ..fixture.options()
    };

    let (outcome, _) = fixture.run(options).await;
    completed(outcome)?;

    assert_eq!(fixture.thumbnailer.fetch_count(), 1);
    let uploads = fixture.standard.uploads();
    let thumbnail = uploads[0]
        .thumbnail
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no thumbnail sent"))?;
    assert!(thumbnail.starts_with(&fixture.settings.thumbnail_dir));
    assert_eq!(uploads[1].thumbnail.as_ref(), Some(&thumbnail));
    assert_eq!(uploads[0].dimensions, Some((32, 24)));
    assert!(!thumbnail.exists());
    assert!(fixture.thumbnailer.screenshots().is_empty());
    Ok(())
}

#[tokio::test]
async fn seeded_originals_are_copied_and_scratch_is_cleaned() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.normalizer = Arc::new(FakeNormalizer::new().with_rename("raw.mkv", "clean.mkv"));
    let original = fixture.file("raw.mkv", 10)?;
    let options = JobOptions {
        seed: SeedMode::PreserveOriginals,
        ..fixture.options()
    };

    let (outcome, _) = fixture.run(options).await;
    completed(outcome)?;

    assert_eq!(upload_names(&fixture.standard), vec!["clean.mkv"]);
    assert!(original.exists());
    assert!(!fixture.root.join("copied").exists());
    Ok(())
}

#[tokio::test]
async fn scratch_cleanup_is_idempotent() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path();
    write_file(root, "copied/movie.mkv", 4)?;
    write_file(root, &format!("{SPLIT_DIR_NAME}/movie.mkv.001"), 4)?;
    std::fs::create_dir_all(root.join("empty/nested"))?;
    let kept = write_file(root, "movie.mkv", 4)?;

    clean_unwanted(root).await?;
    clean_unwanted(root).await?;

    assert!(kept.exists());
    assert!(!root.join("copied").exists());
    assert!(!root.join(SPLIT_DIR_NAME).exists());
    assert!(!root.join("empty").exists());
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_payloads_upload_and_dangling_links_are_corrupted() -> Result<()> {
    use std::os::unix::fs::symlink;

    let fixture = Fixture::new()?;
    let store = write_file(&fixture.temp.path().join("store"), "movie.mkv", 10)?;
    symlink(&store, fixture.root.join("movie.mkv"))?;
    symlink(fixture.temp.path().join("store/gone.mkv"), fixture.root.join("gone.mkv"))?;

    let (outcome, _) = fixture.run(fixture.options()).await;
    let result = completed(outcome)?;

    assert_eq!(upload_names(&fixture.standard), vec!["movie.mkv"]);
    assert_eq!(result.total_files, 2);
    assert_eq!(result.corrupted, 1);
    assert!(store.exists());
    Ok(())
}
