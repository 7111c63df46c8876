use logsift::input::{bracket_timestamp, collect_input_files, decode_line, read_chunks, strip_spans};
use regex::Regex;
use std::io::Cursor;
use std::ops::ControlFlow;
use std::path::PathBuf;

#[test]
fn folders_expand_to_sorted_regular_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.log"), "b\n").unwrap();
    std::fs::write(dir.path().join("a.log"), "a\n").unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    let single = dir.path().join("nested").join("c.log");
    std::fs::write(&single, "c\n").unwrap();

    let files = collect_input_files(&[dir.path().to_path_buf(), single.clone(), PathBuf::from("-")]).unwrap();
    assert_eq!(
        files,
        vec![dir.path().join("a.log"), dir.path().join("b.log"), single, PathBuf::from("-")]
    );
}

#[test]
fn decode_strips_carriage_return_and_replaces_bad_bytes() {
    assert_eq!(decode_line(b"abc\r", 1, false).unwrap(), "abc");
    assert_eq!(decode_line(&[b'f', 0xff], 1, false).unwrap(), "f\u{FFFD}");
}

#[test]
fn strict_decoding_reports_the_line_number() {
    let err = decode_line(&[b'f', 0xff], 42, true).unwrap_err();
    assert_eq!(err.line, 42);
    assert!(err.to_string().contains("line 42"));
    assert_eq!(decode_line(b"ok", 43, true).unwrap(), "ok");
}

#[test]
fn bracketed_spans_are_removed() {
    let brackets = Regex::new(r"\[.*?\]").unwrap();
    assert_eq!(strip_spans("[INFO] [pid 3] started", &[brackets.clone()]).trim(), "started");
    assert_eq!(strip_spans("no brackets", &[brackets]), "no brackets");
}

#[test]
fn chunks_respect_size_and_early_stop() {
    let mut chunks = Vec::new();
    let flow = read_chunks(Cursor::new("a\nb\r\nc"), 2, |chunk| {
        chunks.push(chunk);
        ControlFlow::Continue(())
    })
    .unwrap();
    assert!(flow.is_continue());
    assert_eq!(chunks, vec![vec![b"a".to_vec(), b"b\r".to_vec()], vec![b"c".to_vec()]]);

    let mut seen = 0;
    let flow = read_chunks(Cursor::new("a\nb\nc\nd\n"), 1, |_| {
        seen += 1;
        ControlFlow::Break(())
    })
    .unwrap();
    assert!(flow.is_break());
    assert_eq!(seen, 1);
}

#[test]
fn break_on_the_trailing_partial_chunk_is_reported() {
    let mut sizes = Vec::new();
    let flow = read_chunks(Cursor::new("a\nb\nc"), 2, |chunk| {
        sizes.push(chunk.len());
        if chunk.len() < 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .unwrap();
    assert_eq!(sizes, vec![2, 1]);
    assert!(flow.is_break());

    let flow = read_chunks(Cursor::new(""), 2, |_| ControlFlow::Break(())).unwrap();
    assert!(flow.is_continue());
}

#[test]
fn timestamp_comes_from_the_first_bracketed_span() {
    assert_eq!(
        bracket_timestamp("[2024-03-01 12:00:05,123] [pid 7] started").as_deref(),
        Some("2024-03-01 12:00:05")
    );
    assert_eq!(
        bracket_timestamp("prefix [2025-08-07T06:41:18Z] [2001-01-01 00:00:00] x").as_deref(),
        Some("2025-08-07 06:41:18")
    );
    assert_eq!(bracket_timestamp("[INFO] [2024-03-01 12:00:05] started"), None);
    assert_eq!(bracket_timestamp("2024-03-01 12:00:05 no brackets"), None);
    assert_eq!(bracket_timestamp("[2024-03-01] date only"), None);
}
