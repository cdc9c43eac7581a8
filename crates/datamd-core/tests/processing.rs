/*
 * processing.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * End-to-end tests for document processing.
 */

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use datamd_config::Configuration;
use datamd_core::stream::RowSource;
use datamd_core::table::Row;
use datamd_core::{
    ArgKind, ArgSpec, Cell, CommandSignature, DirectiveHandler, DirectiveInvocation, HandlerError,
    HandlerRequest, PathError, Processor, RenderedBlock, StreamingAdapter, Table, boundary_marker,
    parse_directive, path, transform,
};
use datamd_error_reporting::DiagnosticKind;

fn config_without_cache() -> Configuration {
    let mut config = Configuration::default();
    config.cache.enabled = false;
    config
}

fn table_rows(markdown: &str) -> Vec<String> {
    markdown
        .lines()
        .filter(|line| line.starts_with("| "))
        .skip(2)
        .map(str::to_string)
        .collect()
}

#[test]
fn test_directive_round_trip() {
    let cases = [
        DirectiveInvocation {
            command: "csv".to_string(),
            raw_path: "data/sales.csv".to_string(),
            positional_args: vec![";".to_string()],
            keyword_args: BTreeMap::from([(
                "transform".to_string(),
                "filter:amount>1000|sort:-date".to_string(),
            )]),
        },
        DirectiveInvocation {
            command: "chart".to_string(),
            raw_path: "my \"quoted\" file.csv".to_string(),
            positional_args: vec!["bar".to_string(), "month".to_string()],
            keyword_args: BTreeMap::from([
                ("title".to_string(), "Sales by month".to_string()),
                ("x-label".to_string(), "back\\slash".to_string()),
            ]),
        },
        DirectiveInvocation {
            command: "json".to_string(),
            raw_path: "a.json".to_string(),
            positional_args: Vec::new(),
            keyword_args: BTreeMap::new(),
        },
    ];

    for invocation in cases {
        let text = invocation.to_directive_string();
        let parsed = parse_directive(&text).unwrap();
        assert_eq!(parsed, invocation, "round trip of {}", text);
    }
}

#[test]
fn test_traversal_is_refused_unless_allowed() {
    let root = tempfile::tempdir().unwrap();
    let docs = root.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    std::fs::write(root.path().join("outside.csv"), "a\n1\n").unwrap();

    let mut config = config_without_cache();
    for raw in ["../outside.csv", root.path().join("outside.csv").to_str().unwrap()] {
        let err = path::resolve(raw, &docs, &config.security).unwrap_err();
        assert!(matches!(err, PathError::Traversal { .. }), "{}", raw);
    }

    config.security.allow_directory_traversal = true;
    let resolved = path::resolve("../outside.csv", &docs, &config.security).unwrap();
    assert_eq!(resolved.size_bytes(), 4);

    let processor = Processor::new(config).unwrap();
    let out = processor.process("{{ csv \"../outside.csv\" }}\n", &docs, None);
    assert_eq!(out.text, "| a |\n| --- |\n| 1 |\n");
}

#[test]
fn test_traversal_failure_is_inline() {
    let root = tempfile::tempdir().unwrap();
    let docs = root.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    std::fs::write(root.path().join("outside.csv"), "a\n1\n").unwrap();

    let processor = Processor::new(config_without_cache()).unwrap();
    let out = processor.process("x {{ csv \"../outside.csv\" }} y\n", &docs, None);
    assert!(out.text.starts_with("x > **DataMD path error** [DMD-2-3] in `{{ csv \"../outside.csv\" }}`"));
    assert!(out.text.ends_with(" y\n"));
    assert!(out.has_errors());
}

struct Counting {
    calls: Arc<AtomicUsize>,
}

impl DirectiveHandler for Counting {
    fn name(&self) -> &str {
        "count"
    }

    fn handle(&self, request: &HandlerRequest<'_>) -> Result<RenderedBlock, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RenderedBlock::new(format!(
            "{} ({} bytes)\n",
            request.raw_path,
            request.path.size_bytes()
        )))
    }
}

#[test]
fn test_cache_idempotence_and_invalidation() {
    let docs = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let data = docs.path().join("data.csv");
    std::fs::write(&data, "a\n1\n").unwrap();

    let mut config = Configuration::default();
    config.cache.directory = Some(cache_dir.path().to_path_buf());
    let calls = Arc::new(AtomicUsize::new(0));
    let mut processor = Processor::new(config).unwrap();
    processor.registry_mut().register(Box::new(Counting {
        calls: Arc::clone(&calls),
    }));

    let doc = "Data: {{ count \"data.csv\" }}\n";
    let first = processor.process(doc, docs.path(), None);
    assert_eq!(first.text, "Data: data.csv (4 bytes)\n");
    assert_eq!(first.stats.handler_invocations, 1);

    let second = processor.process(doc, docs.path(), None);
    assert_eq!(second.text, first.text);
    assert_eq!(second.stats.handler_invocations, 0);
    assert_eq!(second.stats.cache_hits, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let file = std::fs::File::options().write(true).open(&data).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
    drop(file);

    let third = processor.process(doc, docs.path(), None);
    assert_eq!(third.text, first.text);
    assert_eq!(third.stats.handler_invocations, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_last_sort_is_primary_key() {
    let dates = ["2024-03-01", "2024-01-15", "2024-03-01", "2024-02-10"];
    let rows: Vec<(String, i64)> = (0..12)
        .map(|i| (dates[i % dates.len()].to_string(), ((i * 37) % 101) as i64))
        .collect();

    let dir = tempfile::tempdir().unwrap();
    let mut csv = String::from("date,amount\n");
    for (date, amount) in &rows {
        csv.push_str(&format!("{},{}\n", date, amount));
    }
    std::fs::write(dir.path().join("sales.csv"), csv).unwrap();

    let processor = Processor::new(config_without_cache()).unwrap();
    let out = processor.process(
        "{{ csv \"sales.csv\" transform=\"sort:amount|sort:-date|limit:5\" }}",
        dir.path(),
        None,
    );

    let mut expected = rows.clone();
    expected.sort_by_key(|(_, amount)| *amount);
    expected.sort_by(|a, b| b.0.cmp(&a.0));
    let expected: Vec<String> = expected
        .iter()
        .take(5)
        .map(|(date, amount)| format!("| {} | {} |", date, amount))
        .collect();

    assert_eq!(table_rows(&out.text), expected);
    assert!(table_rows(&out.text)[..3].iter().all(|r| r.contains("2024-03-01")));
}

#[test]
fn test_filter_greater_than() {
    let mut table = Table::new(vec!["amt".to_string()]);
    for amt in ["500", "1500", "2500"] {
        table.push_row(vec![Some(Cell::new(amt))]);
    }
    let ops = transform::parse("filter:amt>1000").unwrap();
    let filtered = transform::apply(table, &ops);
    let values: Vec<&str> = filtered
        .rows
        .iter()
        .filter_map(|row| row[0].as_ref().map(|c| c.text.as_str()))
        .collect();
    assert_eq!(values, ["1500", "2500"]);
}

#[test]
fn test_streaming_chunk_boundaries() {
    let rows = (0..25_000).map(|i| Ok::<Row, Infallible>(vec![Some(Cell::new(i.to_string()))]));
    let adapter = StreamingAdapter::new(Vec::new(), 10_000);
    let chunks: Vec<_> = adapter
        .apply(RowSource::new(vec!["n".to_string()], rows))
        .collect::<Result<_, _>>()
        .unwrap();
    let sizes: Vec<usize> = chunks.iter().map(|c| c.table.len()).collect();
    assert_eq!(sizes, [10_000, 10_000, 5_000]);

    let dir = tempfile::tempdir().unwrap();
    let mut csv = String::from("n\n");
    for i in 0..25_000 {
        csv.push_str(&format!("{}\n", i));
    }
    std::fs::write(dir.path().join("big.csv"), csv).unwrap();

    let mut config = config_without_cache();
    config.performance.streaming_threshold_mb = 0.0;
    config.performance.chunk_size = 10_000;
    let processor = Processor::new(config).unwrap();
    let out = processor.process("{{ csv \"big.csv\" }}\n", dir.path(), None);

    assert_eq!(out.text.matches("<!-- datamd: chunk boundary").count(), 2);
    assert!(out.text.contains(&boundary_marker(10_000)));
    assert!(out.text.contains(&boundary_marker(20_000)));
    let last = out.text.rsplit(&boundary_marker(20_000)).next().unwrap();
    assert_eq!(table_rows(last).len(), 5_000);
}

#[test]
fn test_unknown_command_passthrough() {
    let dir = tempfile::tempdir().unwrap();
    let processor = Processor::new(config_without_cache()).unwrap();
    let doc = "Keep {{ fancy \"x.csv\" opt=1 }} and {{ partial }}\n{{not a directive\n";
    let out = processor.process(doc, dir.path(), None);
    assert_eq!(out.text, doc);
    assert!(out.diagnostics.is_empty());
    assert_eq!(out.stats.directives, 0);
}

#[test]
fn test_unterminated_quote_is_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let processor = Processor::new(config_without_cache()).unwrap();
    let doc = "Intro\nSee {{ csv \"data.csv }} here\n";
    let out = processor.process(doc, dir.path(), Some(Path::new("report.dmd")));
    assert_eq!(out.text, doc);
    assert_eq!(out.diagnostics.len(), 1);
    let diagnostic = &out.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::Warning);
    assert_eq!(diagnostic.code.as_deref(), Some("DMD-1-1"));
    assert_eq!(diagnostic.location.as_ref().map(|l| l.line), Some(2));
    assert_eq!(out.stats.invalid, 1);
}

#[test]
fn test_disabled_feature_is_inline_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scan.png"), b"\x89PNG").unwrap();
    let mut config = config_without_cache();
    config.features.ocr_enabled = false;
    let processor = Processor::new(config).unwrap();
    let out = processor.process("{{ image_ocr \"scan.png\" }}", dir.path(), None);
    assert_eq!(
        out.text,
        "> **DataMD handler error** [DMD-5-2] in `{{ image_ocr \"scan.png\" }}`: `image_ocr` is disabled by configuration (features.ocr_enabled)"
    );
}

#[test]
fn test_external_command_without_decoder() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("book.xlsx"), b"PK").unwrap();
    let processor = Processor::new(config_without_cache()).unwrap();
    let out = processor.process("{{ xlsx \"book.xlsx\" Sheet1 }}", dir.path(), None);
    assert!(out.text.contains("[DMD-5-1]"));
    assert!(out.text.ends_with("no decoder registered for `xlsx`"));
}

#[test]
fn test_json_directive_flattens_nested_objects() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("people.json"),
        r#"[{"name": "Ann", "address": {"city": "Oslo", "zip": "0150"}}, {"name": "Bo"}]"#,
    )
    .unwrap();
    let processor = Processor::new(config_without_cache()).unwrap();
    let out = processor.process("# People\n\n{{ json \"people.json\" }}\n", dir.path(), None);
    assert_eq!(
        out.text,
        "# People\n\n| name | address.city | address.zip |\n| --- | --- | --- |\n| Ann | Oslo | 0150 |\n| Bo |  |  |\n"
    );
}

#[test]
fn test_process_file_resolves_next_to_document() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.csv"), "x,y\n1,2\n").unwrap();
    let doc = dir.path().join("doc.dmd");
    std::fs::write(&doc, "{{ csv \"a.csv\" }}\n").unwrap();

    let processor = Processor::new(config_without_cache()).unwrap();
    let out = processor.process_file(&doc).unwrap();
    assert_eq!(out.text, "| x | y |\n| --- | --- |\n| 1 | 2 |\n");
}

#[test]
fn test_chunk_size_change_misses_cache() {
    let docs = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    std::fs::write(docs.path().join("n.csv"), "n\n1\n2\n3\n4\n5\n").unwrap();
    let doc = "{{ csv \"n.csv\" }}\n";

    let run = |chunk_size: usize| {
        let mut config = Configuration::default();
        config.cache.directory = Some(cache_dir.path().to_path_buf());
        config.performance.streaming_threshold_mb = 0.0;
        config.performance.chunk_size = chunk_size;
        Processor::new(config).unwrap().process(doc, docs.path(), None)
    };

    let small = run(2);
    assert_eq!(small.text.matches("<!-- datamd: chunk boundary").count(), 2);

    let large = run(100);
    assert_eq!(large.stats.cache_hits, 0);
    assert_eq!(large.stats.handler_invocations, 1);
    assert_eq!(large.text.matches("<!-- datamd: chunk boundary").count(), 0);
    assert_eq!(table_rows(&large.text).len(), 5);

    let again = run(2);
    assert_eq!(again.stats.cache_hits, 1);
    assert_eq!(again.text, small.text);
}

#[test]
fn test_bad_transform_is_inline_transform_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.csv"), "x\n1\n").unwrap();
    let processor = Processor::new(config_without_cache()).unwrap();
    let out = processor.process("{{ csv \"a.csv\" transform=\"limit:x\" }}\n", dir.path(), None);

    assert!(out.text.starts_with(
        "> **DataMD transform error** [DMD-4-1] in `{{ csv \"a.csv\" transform=\"limit:x\" }}`: "
    ));
    assert!(out.text.contains("limit must be a non-negative integer"));
    assert!(out.text.ends_with('\n'));
    assert_eq!(out.stats.failures, 1);
    assert!(out.has_errors());
}

struct Lookup;

impl DirectiveHandler for Lookup {
    fn name(&self) -> &str {
        "lookup"
    }

    fn signature(&self, _config: &Configuration) -> CommandSignature {
        CommandSignature::new(vec![ArgSpec::keyword(
            "column",
            ArgKind::Identifier {
                max_len: 64,
                required: true,
            },
        )])
    }

    fn handle(&self, request: &HandlerRequest<'_>) -> Result<RenderedBlock, HandlerError> {
        Ok(RenderedBlock::new(
            request.args.text("column").unwrap_or_default().to_string(),
        ))
    }
}

#[test]
fn test_unusable_required_argument_is_inline_argument_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.csv"), "x\n1\n").unwrap();
    let mut processor = Processor::new(config_without_cache()).unwrap();
    processor.registry_mut().register(Box::new(Lookup));

    let out = processor.process(
        "{{ lookup \"a.csv\" column=\"%%%\" }}\n{{ lookup \"a.csv\" column=total }}\n",
        dir.path(),
        None,
    );
    assert_eq!(
        out.text,
        "> **DataMD argument error** [DMD-3-2] in `{{ lookup \"a.csv\" column=\"%%%\" }}`: argument `column` has no usable characters in `%%%`\ntotal\n"
    );
    assert_eq!(out.stats.failures, 1);
}
