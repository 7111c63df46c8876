//! Line sources: input file enumeration, chunked reading and decoding.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use thiserror::Error;

static RE_FIRST_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.*?)\]").unwrap());
static RE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());
static RE_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{2}:\d{2}:\d{2}").unwrap());

#[derive(Debug, Error)]
#[error("line {line} is not valid UTF-8: {source}")]
pub struct MalformedLineError {
    pub line: u64,
    #[source]
    pub source: std::str::Utf8Error,
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Expands directories into the regular files directly inside them, sorted by
/// name. Plain paths and `-` (stdin) pass through in the order given.
pub fn collect_input_files(inputs: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if is_stdin(input) || !input.is_dir() {
            out.push(input.clone());
            continue;
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(input)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        out.extend(files);
    }
    Ok(out)
}

/// Opens `path` for buffered reading, `-` meaning stdin.
pub fn open_source(path: &Path) -> io::Result<Box<dyn BufRead>> {
    if is_stdin(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let f = File::open(path)?;
    // Larger buffer reduces syscalls on big files.
    Ok(Box::new(BufReader::with_capacity(1 << 20, f)))
}

/// Reads raw lines (newline stripped) in chunks of up to `max_lines` and hands
/// each chunk to `on_chunk`. Stops early when `on_chunk` breaks and returns
/// `Break` in that case, `Continue` once the reader is exhausted.
pub fn read_chunks<R, F>(mut reader: R, max_lines: usize, mut on_chunk: F) -> io::Result<ControlFlow<()>>
where
    R: BufRead,
    F: FnMut(Vec<Vec<u8>>) -> ControlFlow<()>,
{
    let max_lines = max_lines.max(1);
    let mut buf: Vec<Vec<u8>> = Vec::with_capacity(max_lines);
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        buf.push(line);
        if buf.len() >= max_lines {
            let chunk = std::mem::replace(&mut buf, Vec::with_capacity(max_lines));
            if on_chunk(chunk).is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
    }
    if buf.is_empty() {
        return Ok(ControlFlow::Continue(()));
    }
    Ok(on_chunk(buf))
}

/// Text of one raw line with any trailing `\r` removed. Invalid UTF-8 is
/// replaced lossily unless `strict` is set.
pub fn decode_line(bytes: &[u8], line_no: u64, strict: bool) -> Result<Cow<'_, str>, MalformedLineError> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    if strict {
        std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|source| MalformedLineError { line: line_no, source })
    } else {
        Ok(String::from_utf8_lossy(bytes))
    }
}

/// Removes every match of `patterns` from `line`, e.g. `\[.*?\]` to drop
/// bracketed spans before masking.
pub fn strip_spans<'a>(line: &'a str, patterns: &[Regex]) -> Cow<'a, str> {
    let mut out = Cow::Borrowed(line);
    for re in patterns {
        let stripped = match re.replace_all(&out, "") {
            Cow::Owned(s) => Some(s),
            Cow::Borrowed(_) => None,
        };
        if let Some(s) = stripped {
            out = Cow::Owned(s);
        }
    }
    out
}

/// `YYYY-MM-DD HH:MM:SS` taken from the first bracketed span of `line`, as in
/// `[2024-03-01T12:00:05.123Z]`. `None` when that span lacks a date or a time.
pub fn bracket_timestamp(line: &str) -> Option<String> {
    let span = RE_FIRST_BRACKET.captures(line)?.get(1)?.as_str();
    let date = RE_DATE.find(span)?;
    let time = RE_TIME.find(span)?;
    Some(format!("{} {}", date.as_str(), time.as_str()))
}
