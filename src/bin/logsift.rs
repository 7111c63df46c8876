use anyhow::Context;
use clap::Parser;
use logsift::input::{self, MalformedLineError};
use logsift::{report, ChangeType, FilePersistence, LoadOutcome, MinerConfig, TemplateMiner};
use rayon::prelude::*;
use regex::Regex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Instant;

fn init_parallelism() {
    static START: Once = Once::new();
    START.call_once(|| {
        let n = num_cpus::get();
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    });
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "logsift", version, about = "Incremental log template mining")]
struct Cli {
    /// Log files or folders (`-` for stdin). Folders are read file by file, sorted by name.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// TOML miner configuration
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Snapshot file: restored at start, saved on change and at shutdown
    #[arg(long = "state")]
    state: Option<PathBuf>,
    /// Start from empty state even if the snapshot exists
    #[arg(long = "fresh", default_value_t = false)]
    fresh: bool,

    /// Cluster report destination (stdout when absent)
    #[arg(long = "output", short = 'o')]
    output: Option<PathBuf>,
    /// Per-line events file: `<when> ; <cluster_id> ; <template>`, `<when>` being the
    /// first bracketed date and time of the line or else its line number in the file
    #[arg(long = "events")]
    events: Option<PathBuf>,

    /// Regex whose matches are removed before masking. May be repeated.
    #[arg(long = "strip")]
    strip: Vec<String>,
    /// Shorthand for `--strip '\[.*?\]'`
    #[arg(long = "strip-brackets", default_value_t = false)]
    strip_brackets: bool,
    /// Enable the built-in mask rules on top of configured ones
    #[arg(long = "default-masking", default_value_t = false)]
    default_masking: bool,
    /// Extra token delimiter. May be repeated.
    #[arg(long = "delimiter")]
    delimiters: Vec<String>,

    #[arg(long = "similarity")]
    similarity: Option<f64>,
    #[arg(long = "depth")]
    depth: Option<usize>,
    #[arg(long = "max-children")]
    max_children: Option<usize>,
    /// Index numeric tokens by value instead of through the wildcard branch
    #[arg(long = "literal-numbers", default_value_t = false)]
    literal_numbers: bool,

    /// Lines per pre-processing batch; progress is logged once per batch
    #[arg(long = "batch-size", default_value_t = 10000)]
    batch_size: usize,
    /// Print the prefix tree after mining
    #[arg(long = "print-tree", default_value_t = false)]
    print_tree: bool,
    /// Cluster ids listed per tree bucket
    #[arg(long = "tree-max-clusters", default_value_t = 5)]
    tree_max_clusters: usize,
    /// Collect and log per-stage timings
    #[arg(long = "profile", default_value_t = false)]
    profile: bool,
    /// Abort on lines that are not valid UTF-8 instead of decoding lossily
    #[arg(long = "strict-utf8", default_value_t = false)]
    strict_utf8: bool,
    /// Do not log created/changed clusters
    #[arg(long = "no-audit", default_value_t = false)]
    no_audit: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<MinerConfig> {
    let mut config = match &cli.config {
        Some(path) => MinerConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => MinerConfig::default(),
    };
    if let Some(s) = cli.similarity {
        config.drain.similarity_threshold = s;
    }
    if let Some(d) = cli.depth {
        config.drain.match_depth = d;
    }
    if let Some(m) = cli.max_children {
        config.drain.max_children = m;
    }
    if cli.literal_numbers {
        config.drain.parametrize_numeric_tokens = false;
    }
    config.drain.extra_delimiters.extend(cli.delimiters.iter().cloned());
    if cli.default_masking {
        config.masking.use_defaults = true;
    }
    if cli.profile {
        config.profiling.enabled = true;
    }
    Ok(config)
}

fn strip_patterns(cli: &Cli) -> anyhow::Result<Vec<Regex>> {
    let mut sources = cli.strip.clone();
    if cli.strip_brackets {
        sources.push(r"\[.*?\]".to_string());
    }
    sources
        .iter()
        .map(|s| Regex::new(s).with_context(|| format!("invalid --strip pattern `{s}`")))
        .collect()
}

/// One decoded input line, ready for the sequential mining stage.
struct Prepared {
    /// Line number within its file, from 1.
    line_no: u64,
    text: String,
    /// Bracketed date and time, only looked up when an events file is written.
    stamp: Option<String>,
    tokens: Vec<String>,
}

/// Mining state of one invocation, shared by all input files.
struct Run {
    miner: TemplateMiner,
    marker: String,
    events: Option<BufWriter<File>>,
    audit: bool,
    batch_size: u64,
    lines: u64,
    started: Instant,
    batch_started: Instant,
}

impl Run {
    fn feed(&mut self, line: &Prepared) -> anyhow::Result<()> {
        self.lines += 1;
        let result = self.miner.add_tokens(&line.tokens);
        if self.audit && result.change_type != ChangeType::None {
            tracing::info!(target: "logsift::audit", "{}", report::audit_input(line.line_no, &line.text));
            tracing::info!(target: "logsift::audit", "Result: {}", report::result_json(&result, &self.marker));
        }
        if let Some(events) = self.events.as_mut() {
            let row = match &line.stamp {
                Some(stamp) => report::event_line(stamp, &result, &self.marker),
                None => report::event_line(line.line_no, &result, &self.marker),
            };
            writeln!(events, "{row}").context("writing events file")?;
        }
        if self.lines % self.batch_size == 0 {
            let batch_secs = self.batch_started.elapsed().as_secs_f64();
            let rate = if batch_secs > 0.0 { self.batch_size as f64 / batch_secs } else { 0.0 };
            tracing::info!(
                lines = self.lines,
                lines_per_sec = rate as u64,
                clusters = result.cluster_count,
                "processing progress"
            );
            self.batch_started = Instant::now();
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    init_parallelism();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let strip = strip_patterns(&cli)?;
    let mut miner = TemplateMiner::new(config).context("invalid miner configuration")?;
    if let Some(path) = &cli.state {
        miner = miner.with_persistence(FilePersistence::new(path));
        if cli.fresh {
            tracing::info!(path = %path.display(), "starting fresh, existing snapshot will be overwritten");
        } else if let LoadOutcome::Corrupt(e) = miner.load_state().context("loading snapshot")? {
            tracing::warn!(path = %path.display(), error = %e, "snapshot ignored");
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        let _ = ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        });
    }

    let events = match &cli.events {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => None,
    };
    let files = input::collect_input_files(&cli.inputs).context("listing inputs")?;
    let pre = miner.preprocessor().clone();
    let want_stamps = cli.events.is_some();
    let mut run = Run {
        marker: miner.wildcard_marker().to_string(),
        miner,
        events,
        audit: !cli.no_audit,
        batch_size: cli.batch_size.max(1) as u64,
        lines: 0,
        started: Instant::now(),
        batch_started: Instant::now(),
    };

    let mut failure: Option<anyhow::Error> = None;
    for file in &files {
        if !running.load(Ordering::SeqCst) || failure.is_some() {
            break;
        }
        tracing::info!(file = %file.display(), "mining");
        let reader = input::open_source(file).with_context(|| format!("opening {}", file.display()))?;
        let mut file_line: u64 = 0;
        let flow = input::read_chunks(reader, cli.batch_size, |chunk| {
            let base = file_line;
            file_line += chunk.len() as u64;
            let prepared: Vec<Result<Prepared, MalformedLineError>> = chunk
                .par_iter()
                .enumerate()
                .map(|(i, raw)| {
                    let line_no = base + i as u64 + 1;
                    let text = input::decode_line(raw, line_no, cli.strict_utf8)?;
                    let stamp = if want_stamps { input::bracket_timestamp(&text) } else { None };
                    let tokens = pre.prepare(&input::strip_spans(&text, &strip));
                    Ok(Prepared { line_no, text: text.into_owned(), stamp, tokens })
                })
                .collect();
            for line in prepared {
                if !running.load(Ordering::SeqCst) {
                    return ControlFlow::Break(());
                }
                let fed = line
                    .with_context(|| format!("reading {}", file.display()))
                    .and_then(|l| run.feed(&l));
                if let Err(e) = fed {
                    failure = Some(e);
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        })
        .with_context(|| format!("reading {}", file.display()))?;
        if flow.is_break() {
            break;
        }
    }
    if !running.load(Ordering::SeqCst) {
        tracing::warn!(lines = run.lines, "interrupted, finishing with the lines mined so far");
    }

    run.miner.save_state("shutdown").context("saving snapshot")?;
    if let Some(mut events) = run.events.take() {
        events.flush().context("writing events file")?;
    }
    if let Some(e) = failure {
        return Err(e);
    }

    let written = match &cli.output {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path).with_context(|| format!("creating {}", path.display()))?);
            report::write_cluster_report(&mut out, run.miner.clusters(), &run.marker)?
        }
        None => report::write_cluster_report(&mut io::stdout().lock(), run.miner.clusters(), &run.marker)?,
    };
    let secs = run.started.elapsed().as_secs_f64();
    tracing::info!(
        lines = run.lines,
        clusters = written,
        seconds = secs,
        lines_per_sec = if secs > 0.0 { (run.lines as f64 / secs) as u64 } else { 0 },
        "mining done"
    );

    if cli.print_tree {
        print!("{}", run.miner.render_tree(cli.tree_max_clusters));
    }
    if cli.profile {
        run.miner.profiler().log_report();
    }
    Ok(())
}
