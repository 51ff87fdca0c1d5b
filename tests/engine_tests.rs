//! End-to-end engine tests on generated images

use image::{Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use watermarker::config::{Position, Settings};
use watermarker::discovery::discover;
use watermarker::engine::{Engine, ImageTask, TaskOutcome, TaskResult};
use watermarker::error::{ErrorKind, WatermarkError};

const WORKER_BIN: &str = env!("CARGO_BIN_EXE_watermarker");

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// Input folder with a solid red watermark beside it
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("input")).unwrap();
        RgbaImage::from_pixel(100, 50, Rgba([255, 0, 0, 255]))
            .save(dir.path().join("mark.png"))
            .unwrap();
        Self { dir }
    }

    fn input(&self) -> PathBuf {
        self.dir.path().join("input")
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    fn add_image(&self, relative: &str, width: u32, height: u32) -> PathBuf {
        let path = self.input().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn settings(&self) -> Settings {
        Settings {
            input_folder: self.input(),
            output_folder: self.output(),
            watermark: self.dir.path().join("mark.png"),
            memory_check_interval: 1,
            ..Settings::default()
        }
    }
}

fn tasks(settings: &Settings) -> Vec<ImageTask> {
    discover(settings).unwrap().collect()
}

/// Output files keyed by name with their decoded pixels
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    if !root.exists() {
        return files;
    }
    for entry in fs::read_dir(root).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            continue;
        }
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        files.insert(name, image::open(&path).unwrap().to_rgba8().into_raw());
    }
    files
}

/// Strip the `_<suffix>` parallel runs add to the stem
fn without_suffix(name: &str) -> String {
    let (stem, ext) = name.rsplit_once('.').unwrap();
    let (base, _suffix) = stem.rsplit_once('_').unwrap();
    format!("{}.{}", base, ext)
}

#[test]
fn test_three_images_bottom_centre() {
    let fixture = Fixture::new();
    for name in ["a.png", "b.png", "c.png"] {
        fixture.add_image(name, 400, 300);
    }
    let settings = Settings {
        position: Position::Bottom,
        opacity: 0.65,
        ..fixture.settings()
    };

    let summary = Engine::new(settings.clone()).run(tasks(&settings)).unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.succeeded, 3);
    assert!(summary.is_clean());
    assert_eq!(summary.mode, "sequential");

    for name in ["a.png", "b.png", "c.png"] {
        let output = image::open(fixture.output().join(name)).unwrap().to_rgba8();
        assert_eq!(output.dimensions(), (400, 300));

        // Mark is 45x23 (15% of 300), centred, 15px above the bottom edge
        let inside = output.get_pixel(200, 300 - 15 - 10);
        assert!(inside[0] > 240, "red stays saturated: {:?}", inside);
        assert!(inside[1] < 200 && inside[1] > 60, "white shows through: {:?}", inside);

        assert_eq!(output.get_pixel(10, 10), &Rgba([255, 255, 255, 255]));
    }
}

#[test]
fn test_precompression_exposes_working_width() {
    let fixture = Fixture::new();
    fixture.add_image("wide.png", 4000, 1000);
    let settings = Settings {
        enable_advanced_memory_management: true,
        enable_precompression: true,
        large_image_threshold: 3000,
        ..fixture.settings()
    };

    let summary = Engine::new(settings.clone()).run(tasks(&settings)).unwrap();
    assert_eq!(summary.precompressed, 1);

    let written = image::open(fixture.output().join("wide.png")).unwrap();
    assert_eq!((written.width(), written.height()), (3000, 750));
}

#[test]
fn test_precompression_result_dimensions() {
    let fixture = Fixture::new();
    fixture.add_image("wide.png", 4000, 1000);
    let settings = Settings {
        enable_advanced_memory_management: true,
        enable_precompression: true,
        ..fixture.settings()
    };
    let outcomes = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = outcomes.clone();

    Engine::new(settings.clone())
        .with_progress(Arc::new(move |result: &TaskResult| {
            sink.lock().unwrap().push(result.outcome.clone())
        }))
        .run(tasks(&settings))
        .unwrap();

    match &outcomes.lock().unwrap()[0] {
        TaskOutcome::Written {
            width,
            precompressed,
            ..
        } => {
            assert_eq!(*width, 3000);
            assert!(*precompressed);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_sequential_and_thread_pool_produce_same_images() {
    for count in [0, 1, 7] {
        let fixture = Fixture::new();
        for i in 0..count {
            fixture.add_image(&format!("img{}.png", i), 120 + i * 10, 90);
        }

        let sequential = Settings {
            output_folder: fixture.dir.path().join("seq"),
            ..fixture.settings()
        };
        let threaded = Settings {
            output_folder: fixture.dir.path().join("par"),
            enable_parallel: true,
            workers: 3,
            ..fixture.settings()
        };

        let seq_summary = Engine::new(sequential.clone()).run(tasks(&sequential)).unwrap();
        let par_summary = Engine::new(threaded.clone()).run(tasks(&threaded)).unwrap();
        assert_eq!(seq_summary.succeeded, count as usize);
        assert_eq!(par_summary.succeeded, count as usize);
        assert_eq!(par_summary.mode, "thread-pool");

        let seq = snapshot(&sequential.output_folder);
        let par: BTreeMap<String, Vec<u8>> = snapshot(&threaded.output_folder)
            .into_iter()
            .map(|(name, pixels)| (without_suffix(&name), pixels))
            .collect();
        assert_eq!(seq, par);
    }
}

#[test]
fn test_parallel_outputs_carry_suffix() {
    let fixture = Fixture::new();
    fixture.add_image("photo.png", 64, 64);
    let settings = Settings {
        enable_parallel: true,
        uuid_length: 8,
        workers: 2,
        ..fixture.settings()
    };

    let summary = Engine::new(settings.clone()).run(tasks(&settings)).unwrap();

    let name = summary.outputs[0].file_stem().unwrap().to_string_lossy().to_string();
    let suffix = name.strip_prefix("photo_").unwrap();
    assert_eq!(suffix.len(), 8);
    assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_sequential_rerun_is_idempotent() {
    let fixture = Fixture::new();
    fixture.add_image("a.png", 200, 100);
    fixture.add_image("nested/b.png", 100, 200);
    let settings = Settings {
        recursive: true,
        ..fixture.settings()
    };

    Engine::new(settings.clone()).run(tasks(&settings)).unwrap();
    let first = snapshot(&fixture.output());
    let first_nested = snapshot(&fixture.output().join("nested"));

    Engine::new(settings.clone()).run(tasks(&settings)).unwrap();
    assert_eq!(snapshot(&fixture.output()), first);
    assert_eq!(snapshot(&fixture.output().join("nested")), first_nested);
    assert_eq!(first_nested.len(), 1);
}

#[test]
fn test_failures_do_not_stop_the_run() {
    let fixture = Fixture::new();
    fixture.add_image("good.png", 80, 60);
    fs::write(fixture.input().join("broken.jpg"), b"not a jpeg").unwrap();
    let settings = fixture.settings();

    let summary = Engine::new(settings.clone()).run(tasks(&settings)).unwrap();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].kind, ErrorKind::ImageRead);
    assert!(!summary.is_clean());
}

#[test]
fn test_empty_input_is_not_an_error() {
    let fixture = Fixture::new();
    let settings = fixture.settings();
    let summary = Engine::new(settings.clone()).run(tasks(&settings)).unwrap();
    assert_eq!(summary.discovered, 0);
    assert!(summary.is_clean());
}

#[test]
fn test_unloadable_watermark_is_config_error() {
    let fixture = Fixture::new();
    fixture.add_image("a.png", 10, 10);
    fs::write(fixture.dir.path().join("mark.png"), b"garbage").unwrap();
    let settings = fixture.settings();

    let err = Engine::new(settings.clone()).run(tasks(&settings)).unwrap_err();
    let typed = err.downcast_ref::<WatermarkError>().unwrap();
    assert_eq!(typed.kind(), ErrorKind::Config);
    assert!(!fixture.output().exists());
}

#[test]
fn test_batch_reclamation_passes_are_counted() {
    let fixture = Fixture::new();
    for i in 0..6 {
        fixture.add_image(&format!("{}.png", i), 32, 32);
    }
    let settings = Settings {
        gc_batch_size: 2,
        ..fixture.settings()
    };

    let summary = Engine::new(settings.clone()).run(tasks(&settings)).unwrap();
    assert_eq!(summary.reclamation_passes, 3);
}

#[test]
fn test_cancel_before_run_dispatches_nothing() {
    let fixture = Fixture::new();
    fixture.add_image("a.png", 32, 32);
    let settings = fixture.settings();
    let engine = Engine::new(settings.clone());
    engine.cancel_token().cancel();

    let summary = engine.run(tasks(&settings)).unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.discovered, 0);
}

#[test]
fn test_progress_hook_sees_every_result() {
    let fixture = Fixture::new();
    for i in 0..5 {
        fixture.add_image(&format!("{}.png", i), 32, 32);
    }
    let settings = Settings {
        enable_parallel: true,
        workers: 2,
        ..fixture.settings()
    };
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    Engine::new(settings.clone())
        .with_progress(Arc::new(move |_: &TaskResult| {
            counter.fetch_add(1, Ordering::Relaxed);
        }))
        .run(tasks(&settings))
        .unwrap();

    assert_eq!(seen.load(Ordering::Relaxed), 5);
}

#[test]
fn test_process_pool_matches_sequential() {
    let fixture = Fixture::new();
    for i in 0..4 {
        fixture.add_image(&format!("p{}.png", i), 90 + i * 5, 70);
    }
    fs::write(fixture.input().join("broken.png"), b"nope").unwrap();

    let sequential = Settings {
        output_folder: fixture.dir.path().join("seq"),
        ..fixture.settings()
    };
    let pooled = Settings {
        output_folder: fixture.dir.path().join("pool"),
        enable_parallel: true,
        enable_advanced_memory_management: true,
        workers: 2,
        gc_batch_size: 1,
        ..fixture.settings()
    };

    Engine::new(sequential.clone()).run(tasks(&sequential)).unwrap();
    let summary = Engine::new(pooled.clone())
        .with_worker_program(WORKER_BIN)
        .run(tasks(&pooled))
        .unwrap();

    assert_eq!(summary.mode, "process-pool");
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].kind, ErrorKind::ImageRead);
    // Every successful completion triggers a pass with a batch of one
    assert_eq!(summary.reclamation_passes, 5);

    let seq = snapshot(&sequential.output_folder);
    let pool: BTreeMap<String, Vec<u8>> = snapshot(&pooled.output_folder)
        .into_iter()
        .map(|(name, pixels)| (without_suffix(&name), pixels))
        .collect();
    assert_eq!(seq, pool);
}

#[test]
fn test_process_pool_without_worker_program_fails() {
    let fixture = Fixture::new();
    fixture.add_image("a.png", 10, 10);
    let settings = Settings {
        enable_parallel: true,
        enable_advanced_memory_management: true,
        ..fixture.settings()
    };

    let err = Engine::new(settings.clone()).run(tasks(&settings)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<WatermarkError>().unwrap().kind(),
        ErrorKind::Config
    );
}
