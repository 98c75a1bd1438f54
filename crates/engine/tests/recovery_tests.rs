//! Durable open, reopen and crash recovery
//!
//! A crash loses whole commits or nothing, so the numbering invariants hold
//! after every reopen.

use recipeseq_core::{RecipeNumber, RecordId};
use recipeseq_durability::LOG_FILE_NAME;
use recipeseq_engine::{NumberingConfig, NumberingService, CONFIG_FILE_NAME};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn listing(service: &NumberingService) -> Vec<(u64, RecordId)> {
    service
        .list_ordered_by_number()
        .unwrap()
        .iter()
        .map(|r| (r.recipe_number.get(), r.id))
        .collect()
}

fn always(dir: &Path) -> NumberingService {
    NumberingService::open_with_config(dir, NumberingConfig::default().with_durability("always"))
        .unwrap()
}

#[test]
fn test_open_writes_default_config() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("db");
    let service = NumberingService::open(&dir).unwrap();

    assert!(dir.join(CONFIG_FILE_NAME).exists());
    assert_eq!(service.config(), &NumberingConfig::default());
    assert_eq!(service.data_dir(), Some(dir.as_path()));
}

#[test]
fn test_open_honours_config_file() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "durability = \"always\"\nop_timeout_ms = 750\n[retry]\nmax_retries = 2\n",
    )
    .unwrap();

    let service = NumberingService::open(temp_dir.path()).unwrap();
    assert_eq!(service.config().durability, "always");
    assert_eq!(service.config().op_timeout_ms, 750);
    assert_eq!(service.config().retry.max_retries, 2);
}

#[test]
fn test_open_rejects_bad_config() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "durability = \"eventually\"\n",
    )
    .unwrap();
    assert!(NumberingService::open(temp_dir.path()).is_err());
}

#[test]
fn test_reopen_restores_numbering() {
    let temp_dir = TempDir::new().unwrap();
    let before = {
        let service = always(temp_dir.path());
        for i in 0..5 {
            service
                .create_with_number(json!({ "i": i }), "author-1")
                .unwrap();
        }
        service.delete_by_number(RecipeNumber::new(7)).unwrap();
        listing(&service)
    };
    assert_eq!(
        before.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
        vec![6, 7, 8, 9]
    );

    let service = always(temp_dir.path());
    assert_eq!(listing(&service), before);
    assert!(service.audit().is_ok());
    assert_eq!(service.current_version(), 6);

    let next = service.create_with_number(json!({}), "author-1").unwrap();
    assert_eq!(next.recipe_number, RecipeNumber::new(10));
}

#[test]
fn test_standard_mode_survives_clean_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    let before = {
        let service = NumberingService::open(temp_dir.path()).unwrap();
        for _ in 0..3 {
            service.create_with_number(json!({}), "a").unwrap();
        }
        service.sync().unwrap();
        listing(&service)
    };
    let service = NumberingService::open(temp_dir.path()).unwrap();
    assert_eq!(listing(&service), before);
}

#[test]
fn test_torn_tail_loses_only_last_commit() {
    let temp_dir = TempDir::new().unwrap();
    let before_delete = {
        let service = always(temp_dir.path());
        for _ in 0..3 {
            service.create_with_number(json!({}), "a").unwrap();
        }
        let snapshot = listing(&service);
        service.delete_by_number(RecipeNumber::new(6)).unwrap();
        snapshot
    };

    // Cut the final commit (the delete and its shifts) short
    let log_path = temp_dir.path().join(LOG_FILE_NAME);
    let len = std::fs::metadata(&log_path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&log_path).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    let service = always(temp_dir.path());
    assert_eq!(listing(&service), before_delete);
    assert!(service.audit().is_ok());

    // The log accepts new commits after the truncated tail
    service.delete_by_number(RecipeNumber::new(6)).unwrap();
    drop(service);
    let service = always(temp_dir.path());
    assert_eq!(
        listing(&service),
        vec![(6, before_delete[1].1), (7, before_delete[2].1)]
    );
}

#[test]
fn test_trailing_garbage_is_discarded() {
    let temp_dir = TempDir::new().unwrap();
    let before = {
        let service = always(temp_dir.path());
        for _ in 0..2 {
            service.create_with_number(json!({}), "a").unwrap();
        }
        listing(&service)
    };

    let mut file = OpenOptions::new()
        .append(true)
        .open(temp_dir.path().join(LOG_FILE_NAME))
        .unwrap();
    file.write_all(&[0xde, 0xad, 0xbe, 0xef, 0x01, 0x02]).unwrap();
    drop(file);

    let service = always(temp_dir.path());
    assert_eq!(listing(&service), before);
    assert_eq!(
        service.create_with_number(json!({}), "a").unwrap().recipe_number,
        RecipeNumber::new(8)
    );
}

#[test]
fn test_aborted_operations_are_not_logged() {
    let temp_dir = TempDir::new().unwrap();
    {
        let service = always(temp_dir.path());
        service.create_with_number(json!({}), "a").unwrap();
        service.faults().fail_next_commits(1);
        service.create_with_number(json!({}), "a").unwrap();
        assert!(service.delete_by_number(RecipeNumber::new(9)).is_err());
    }
    let service = always(temp_dir.path());
    assert_eq!(listing(&service).len(), 2);
    assert_eq!(service.current_version(), 2);
}
