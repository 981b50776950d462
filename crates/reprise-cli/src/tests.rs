use std::path::PathBuf;

use clap::Parser;
use pretty_assertions::assert_eq;
use reprise_core::remote::VersionToken;
use reprise_core::sync::{SkipReason, SyncReport};
use reprise_core::{
    BookmarkEntry, ColorTag, EngineConfig, Error, RemoteBlobAdapter, RemoteError, ResourceKey,
    ResourceRecord, Snapshot, SyncOutcome,
};

use crate::cli::{Cli, Commands, CompletionShell, ExportFormat, MediaArgs, ResourceArgs};
use crate::commands::add::run_add;
use crate::commands::clear::run_clear;
use crate::commands::common::{
    bookmark_list_items, format_bookmark_lines, format_record_lines, format_sync_timestamp,
    open_service, parse_key, parse_position, remember_resource, resolve_db_path,
    ConfiguredRemote,
};
use crate::commands::completions::render_completions;
use crate::commands::delete::run_delete;
use crate::commands::export::{run_export, snapshot_format};
use crate::commands::import::run_import;
use crate::commands::key::media_context;
use crate::commands::position::run_position;
use crate::commands::sync::{format_sync_report, outcome_to_result};
use crate::commands::watch::parse_position_line;
use crate::error::CliError;

fn key(raw: &str) -> ResourceKey {
    raw.parse().unwrap()
}

fn sample_record() -> ResourceRecord {
    let mut record = ResourceRecord::new(
        key("rk-abc"),
        "https://video.example.com/watch/1",
        "Launch talk",
        Some(600.0),
        1_000,
    );
    record.insert_bookmark(BookmarkEntry::new(10.0, "intro", None, 1_100), 1_100);
    record.insert_bookmark(
        BookmarkEntry::new(125.0, "demo", Some(ColorTag::Alert), 1_200),
        1_200,
    );
    record.set_auto_save(90.0, 1_300);
    record
}

#[test]
fn parse_position_accepts_seconds_and_clock_forms() {
    assert_eq!(parse_position("90").unwrap(), 90.0);
    assert_eq!(parse_position(" 12.5 ").unwrap(), 12.5);
    assert_eq!(parse_position("1:30").unwrap(), 90.0);
    assert_eq!(parse_position("1:02:03").unwrap(), 3723.0);
    assert_eq!(parse_position("0:00").unwrap(), 0.0);
}

#[test]
fn parse_position_rejects_malformed_input() {
    for raw in ["", "abc", "-5", "1:75", "1:60:00", "1:2:3:4", "NaN", "1:-3"] {
        assert!(
            matches!(parse_position(raw), Err(CliError::InvalidPosition(_))),
            "{raw} should be rejected"
        );
    }
}

#[test]
fn parse_key_rejects_whitespace() {
    assert_eq!(parse_key(" rk-abc ").unwrap().as_str(), "rk-abc");
    assert!(matches!(
        parse_key("rk abc"),
        Err(CliError::Core(Error::InvalidInput(_)))
    ));
}

#[test]
fn resolve_db_path_prefers_explicit_path() {
    let explicit = PathBuf::from("/tmp/explicit.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn bookmark_list_items_index_user_bookmarks_only() {
    let record = sample_record();
    let items = bookmark_list_items(&record.bookmarks);

    let summary = items
        .iter()
        .map(|item| (item.index, item.label.as_str(), item.position.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            (Some(0), "intro", "0:10"),
            (None, "Last position", "1:30"),
            (Some(1), "demo", "2:05"),
        ]
    );
    assert_eq!(items[2].color_tag.as_deref(), Some("alert"));
}

#[test]
fn format_bookmark_lines_mark_resume_position() {
    let record = sample_record();
    let lines = format_bookmark_lines(&record.bookmarks);

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("  0"));
    assert!(lines[1].starts_with("  *"));
    assert!(lines[2].ends_with("demo [alert]"));
}

#[test]
fn format_record_lines_summarize_each_resource() {
    let record = sample_record();
    let snapshot = Snapshot::from([(record.key.clone(), record)]);

    assert_eq!(
        format_record_lines(&snapshot),
        vec!["rk-abc  Launch talk  2 bookmarks  resume 1:30".to_string()]
    );
}

#[test]
fn media_context_requires_page_url() {
    assert!(matches!(
        media_context(&MediaArgs::default()),
        Err(CliError::MissingMediaContext)
    ));

    let args = MediaArgs {
        page_url: Some(" https://video.example.com/watch/1 ".to_string()),
        duration: Some(600.0),
        width: 1920,
        height: 1080,
        sources: vec!["https://cdn.example.com/1.mp4".to_string()],
        ..MediaArgs::default()
    };
    let context = media_context(&args).unwrap();
    assert_eq!(context.page_url, "https://video.example.com/watch/1");
    assert_eq!(context.duration, Some(600.0));
    assert_eq!(context.source_urls, args.sources);
}

#[test]
fn media_context_reads_context_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("context.json");
    std::fs::write(
        &path,
        r#"{
            "page_url": "https://video.example.com/watch/2",
            "duration": 42.0,
            "width": 640,
            "height": 360
        }"#,
    )
    .unwrap();

    let args = MediaArgs {
        context: Some(path),
        ..MediaArgs::default()
    };
    let context = media_context(&args).unwrap();
    assert_eq!(context.page_url, "https://video.example.com/watch/2");
    assert_eq!((context.width, context.height), (640, 360));
}

#[test]
fn cli_parses_add_with_options() {
    let cli = Cli::try_parse_from([
        "reprise", "add", "rk-abc", "1:30", "--label", "demo", "--color", "alert",
    ])
    .unwrap();

    match cli.command {
        Some(Commands::Add {
            key,
            position,
            label,
            color,
            resource,
        }) => {
            assert_eq!(key, "rk-abc");
            assert_eq!(position, "1:30");
            assert_eq!(label, "demo");
            assert_eq!(color.as_deref(), Some("alert"));
            assert_eq!(resource.duration, None);
        }
        _ => panic!("expected add command"),
    }
}

#[test]
fn cli_parses_resource_metadata_and_position_feed() {
    let cli = Cli::try_parse_from([
        "reprise", "position", "rk-abc", "90", "--duration", "10:00", "--title", "Talk",
    ])
    .unwrap();
    match cli.command {
        Some(Commands::Position { resource, .. }) => {
            assert_eq!(resource.duration.as_deref(), Some("10:00"));
            assert_eq!(resource.title.as_deref(), Some("Talk"));
        }
        _ => panic!("expected position command"),
    }

    let cli = Cli::try_parse_from(["reprise", "watch", "--positions"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Watch {
            playing: false,
            positions: true
        })
    ));
}

#[test]
fn parse_position_line_reads_key_and_position() {
    let (key, position) = parse_position_line(" rk-abc  1:30 ").unwrap().unwrap();
    assert_eq!(key.as_str(), "rk-abc");
    assert_eq!(position, 90.0);

    assert!(parse_position_line("").unwrap().is_none());
    assert!(parse_position_line("# paused").unwrap().is_none());
    assert!(matches!(
        parse_position_line("rk-abc"),
        Err(CliError::InvalidPositionLine(_))
    ));
    assert!(matches!(
        parse_position_line("rk-abc 90 extra"),
        Err(CliError::InvalidPositionLine(_))
    ));
    assert!(matches!(
        parse_position_line("rk-abc soon"),
        Err(CliError::InvalidPosition(_))
    ));
}

#[test]
fn completions_name_the_binary() {
    let rendered = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(rendered.contains("reprise"));
}

#[test]
fn snapshot_format_maps_cli_formats() {
    assert_eq!(snapshot_format(ExportFormat::Json).extension(), "json");
    assert_eq!(snapshot_format(ExportFormat::Markdown).extension(), "md");
}

#[test]
fn add_list_and_delete_round_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reprise.db");
    let config = EngineConfig::default();

    let none = ResourceArgs::default();
    run_add("rk-abc", "0:10", "intro", None, &none, &db_path, &config).unwrap();
    run_add("rk-abc", "2:05", "", Some("important"), &none, &db_path, &config).unwrap();
    run_position("rk-abc", "90", &none, &db_path, &config).unwrap();

    let service = open_service(&db_path, &config).unwrap();
    let labels = service
        .list_bookmarks(&key("rk-abc"))
        .unwrap()
        .into_iter()
        .map(|entry| entry.label)
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["intro", "Last position", "2:05"]);

    run_delete("rk-abc", "1", &db_path, &config).unwrap();
    let labels = service
        .list_bookmarks(&key("rk-abc"))
        .unwrap()
        .into_iter()
        .map(|entry| entry.label)
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["intro", "Last position"]);
}

#[test]
fn add_rejects_unknown_color() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reprise.db");

    let result = run_add(
        "rk-abc",
        "10",
        "intro",
        Some("purple"),
        &ResourceArgs::default(),
        &db_path,
        &EngineConfig::default(),
    );
    assert!(matches!(result, Err(CliError::InvalidColor(_))));
}

#[test]
fn duration_flag_enables_end_of_resource_checks() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reprise.db");
    let config = EngineConfig::default();
    let resource = ResourceArgs {
        duration: Some("1:40".to_string()),
        title: Some(" Lecture ".to_string()),
        ..ResourceArgs::default()
    };

    run_position("rk-abc", "98", &resource, &db_path, &config).unwrap();
    let service = open_service(&db_path, &config).unwrap();
    assert!(service.get_record(&key("rk-abc")).unwrap().is_none());

    run_position("rk-abc", "40", &resource, &db_path, &config).unwrap();
    let record = service.get_record(&key("rk-abc")).unwrap().unwrap();
    assert_eq!(record.duration, Some(100.0));
    assert_eq!(record.title, "Lecture");
    assert_eq!(record.auto_save().map(|entry| entry.timestamp), Some(40.0));

    assert!(matches!(
        run_add("rk-abc", "2:00", "", None, &resource, &db_path, &config),
        Err(CliError::Core(Error::InvalidInput(_)))
    ));
}

#[test]
fn remember_resource_rejects_bad_durations() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir.path().join("reprise.db"), &EngineConfig::default()).unwrap();

    for raw in ["0", "soon", "-5"] {
        let resource = ResourceArgs {
            duration: Some(raw.to_string()),
            ..ResourceArgs::default()
        };
        assert!(
            matches!(
                remember_resource(&service, &key("rk-abc"), &resource),
                Err(CliError::InvalidDuration(_))
            ),
            "{raw} should be rejected"
        );
    }
    remember_resource(&service, &key("rk-abc"), &ResourceArgs::default()).unwrap();
}

#[test]
fn delete_rejects_unparseable_target() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reprise.db");

    let result = run_delete("rk-abc", "first", &db_path, &EngineConfig::default());
    assert!(matches!(result, Err(CliError::InvalidTarget(_))));
}

#[test]
fn export_then_import_restores_records() {
    let dir = tempfile::tempdir().unwrap();
    let source_db = dir.path().join("source.db");
    let target_db = dir.path().join("target.db");
    let export_path = dir.path().join("export.json");
    let config = EngineConfig::default();

    let record = sample_record();
    let snapshot = Snapshot::from([(record.key.clone(), record)]);
    open_service(&source_db, &config)
        .unwrap()
        .import_all(&snapshot)
        .unwrap();

    run_export(ExportFormat::Json, Some(&export_path), &source_db, &config).unwrap();
    run_import(Some(&export_path), &target_db, &config).unwrap();

    let restored = open_service(&target_db, &config)
        .unwrap()
        .export_all()
        .unwrap();
    assert_eq!(restored, snapshot);
}

#[test]
fn clear_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reprise.db");
    let config = EngineConfig::default();
    run_add(
        "rk-abc",
        "10",
        "intro",
        None,
        &ResourceArgs::default(),
        &db_path,
        &config,
    )
    .unwrap();

    assert!(matches!(
        run_clear(false, &db_path, &config),
        Err(CliError::ClearNotConfirmed)
    ));
    run_clear(true, &db_path, &config).unwrap();

    let service = open_service(&db_path, &config).unwrap();
    assert!(service.export_all().unwrap().is_empty());
    assert!(service.store().cleared_at().unwrap().is_some());
}

#[test]
fn outcome_to_result_maps_skips_and_failures() {
    assert!(matches!(
        outcome_to_result(SyncOutcome::Skipped(SkipReason::NotConfigured)),
        Err(CliError::SyncNotConfigured)
    ));
    assert!(matches!(
        outcome_to_result(SyncOutcome::Skipped(SkipReason::Disabled)),
        Err(CliError::SyncDisabled)
    ));
    assert!(matches!(
        outcome_to_result(SyncOutcome::Failed {
            error: Error::Remote(RemoteError::Conflict),
            attempts: 4,
        }),
        Err(CliError::SyncFailed { attempts: 4, .. })
    ));

    let report = SyncReport {
        attempts: 1,
        merged_records: 3,
        ..SyncReport::default()
    };
    assert_eq!(
        outcome_to_result(SyncOutcome::Completed(report.clone())).unwrap(),
        report
    );
}

#[test]
fn format_sync_report_lists_counts() {
    let report = SyncReport {
        attempts: 2,
        pushed: true,
        merged_records: 3,
        backfilled: vec![key("rk-abc")],
        deferred: 0,
        cleared: 2,
        synced_at: 0,
    };

    assert_eq!(
        format_sync_report("r2", &report),
        "Sync completed via r2 at 1970-01-01 00:00:00 UTC: \
         3 record(s), pushed, 1 backfilled, 2 cleared remotely"
    );

    let deferred = SyncReport {
        deferred: 1,
        cleared: 0,
        ..report
    };
    assert!(format_sync_report("r2", &deferred)
        .ends_with("1 backfilled, 1 local write(s) deferred"));
}

#[tokio::test(flavor = "current_thread")]
async fn offline_remote_reports_not_configured() {
    let remote = ConfiguredRemote::Offline;

    assert!(!remote.is_configured());
    assert_eq!(remote.backend_name(), "offline");
    assert_eq!(
        remote.get_all().await.unwrap_err(),
        RemoteError::NotConfigured
    );
    assert_eq!(
        remote
            .save_all(&Snapshot::new(), &VersionToken::absent())
            .await
            .unwrap_err(),
        RemoteError::NotConfigured
    );
}
