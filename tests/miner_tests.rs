use logsift::cluster::render_template;
use logsift::drain::SearchStrategy;
use logsift::{ChangeType, MinerConfig, MiningResult, Profiler, TemplateMiner, Token};
use std::collections::HashMap;

fn miner_with(edit: impl FnOnce(&mut MinerConfig)) -> TemplateMiner {
    let mut config = MinerConfig::default();
    edit(&mut config);
    TemplateMiner::new(config).unwrap()
}

fn value(s: &str) -> Token {
    Token::Value(s.to_string())
}

const SAMPLE: &[&str] = &[
    "user 123 login ok",
    "user 456 login ok",
    "disk sda1 is full",
    "disk sdb2 is full",
    "connection from 10.0.0.1 closed after 30 s",
    "connection from 10.0.0.2 closed after 31 s",
    "",
    "worker 3 started",
    "worker 4 stopped",
    "user 789 logout ok",
    "disk sda1 is almost full",
    "connection from 10.0.0.9 reset after 2 s",
];

#[test]
fn merge_scenario_with_default_parameters() {
    let mut miner = miner_with(|_| {});
    let r = miner.add_line("user 123 login ok");
    assert_eq!(r.cluster_id, 0);
    assert_eq!(r.change_type, ChangeType::ClusterCreated);
    assert_eq!(r.cluster_size, 1);
    assert_eq!(r.template, vec![value("user"), value("123"), value("login"), value("ok")]);

    let r = miner.add_line("user 456 login ok");
    assert_eq!(r.cluster_id, 0);
    assert_eq!(r.change_type, ChangeType::TemplateChanged);
    assert_eq!(r.template, vec![value("user"), Token::Wildcard, value("login"), value("ok")]);
    assert_eq!(r.cluster_size, 2);

    let r = miner.add_line("user 456 login ok");
    assert_eq!(r.change_type, ChangeType::None);
    assert_eq!(r.cluster_size, 3);
    assert_eq!(miner.clusters().len(), 1);
    assert_eq!(miner.render_template(&r), "user <*> login ok");
}

#[test]
fn merge_scenario_without_numeric_parametrization() {
    let mut miner = miner_with(|c| {
        c.drain.parametrize_numeric_tokens = false;
        c.drain.match_depth = 1;
    });
    assert_eq!(miner.add_line("user 123 login ok").change_type, ChangeType::ClusterCreated);
    let r = miner.add_line("user 456 login ok");
    assert_eq!((r.cluster_id, r.change_type, r.cluster_size), (0, ChangeType::TemplateChanged, 2));
    let r = miner.add_line("user 456 login ok");
    assert_eq!((r.change_type, r.cluster_size), (ChangeType::None, 3));
}

#[test]
fn identical_input_gives_identical_results() {
    let mut a = miner_with(|c| c.masking.use_defaults = true);
    let mut b = miner_with(|c| c.masking.use_defaults = true);
    let ra: Vec<MiningResult> = SAMPLE.iter().map(|l| a.add_line(l)).collect();
    let rb: Vec<MiningResult> = SAMPLE.iter().map(|l| b.add_line(l)).collect();
    assert_eq!(ra, rb);
}

#[test]
fn templates_keep_the_token_count_of_their_lines() {
    let mut miner = miner_with(|_| {});
    for line in SAMPLE {
        let tokens = miner.preprocessor().prepare(line);
        let r = miner.add_line(line);
        assert_eq!(r.template.len(), tokens.len(), "line `{line}`");
    }
    for cluster in miner.clusters().iter() {
        assert_eq!(cluster.token_count(), cluster.template.len());
    }
}

#[test]
fn wildcards_never_revert_and_sizes_never_shrink() {
    let mut miner = miner_with(|c| c.drain.similarity_threshold = 0.3);
    let mut seen: HashMap<u64, (Vec<Token>, u64)> = HashMap::new();
    for line in SAMPLE.iter().chain(SAMPLE.iter()) {
        let r = miner.add_line(line);
        if let Some((previous, size)) = seen.get(&r.cluster_id) {
            for (before, now) in previous.iter().zip(&r.template) {
                if before.is_wildcard() {
                    assert!(now.is_wildcard());
                }
            }
            assert!(r.cluster_size > *size);
        }
        seen.insert(r.cluster_id, (r.template.clone(), r.cluster_size));
    }
}

#[test]
fn first_line_of_a_new_length_creates_a_cluster() {
    let mut miner = miner_with(|_| {});
    miner.add_line("a b c");
    let r = miner.add_line("a b c d");
    assert_eq!(r.change_type, ChangeType::ClusterCreated);
    assert_eq!(r.cluster_id, 1);
    assert_eq!(r.template, vec![value("a"), value("b"), value("c"), value("d")]);
    assert_eq!(r.cluster_count, 2);
}

#[test]
fn empty_lines_share_one_cluster() {
    let mut miner = miner_with(|_| {});
    let first = miner.add_line("");
    let second = miner.add_line("   ");
    assert_eq!(first.change_type, ChangeType::ClusterCreated);
    assert!(first.template.is_empty());
    assert_eq!((second.cluster_id, second.change_type, second.cluster_size), (0, ChangeType::None, 2));
}

#[test]
fn masked_values_land_in_one_template() {
    let mut miner = miner_with(|c| c.masking.use_defaults = true);
    miner.add_line("connection from 10.0.0.1 closed after 30 s");
    let r = miner.add_line("connection from 10.0.0.2 closed after 31 s");
    assert_eq!(r.change_type, ChangeType::None);
    assert_eq!(r.cluster_size, 2);
    assert_eq!(miner.render_template(&r), "connection from <IP> closed after <NUM> s");
}

#[test]
fn extra_delimiters_split_tokens() {
    let mut miner = miner_with(|c| c.drain.extra_delimiters = vec!["=".into(), ",".into()]);
    assert_eq!(miner.preprocessor().prepare("  user=alice,role=admin  "), vec!["user", "alice", "role", "admin"]);
    let r = miner.add_line("user=alice,role=admin");
    assert_eq!(r.template.len(), 4);
}

#[test]
fn match_line_does_not_change_state() {
    let mut miner = miner_with(|_| {});
    miner.add_line("job 1 done");
    miner.add_line("job 2 done");
    let before: Vec<_> = miner.clusters().iter().cloned().collect();

    let hit = miner.match_line("job 7 done", SearchStrategy::Never).map(|c| c.id);
    assert_eq!(hit, Some(0));
    assert!(miner.match_line("job 7 failed", SearchStrategy::Always).is_none());
    assert!(miner.match_line("job 7", SearchStrategy::Fallback).is_none());

    let after: Vec<_> = miner.clusters().iter().cloned().collect();
    assert_eq!(before, after);
}

#[test]
fn profiler_counts_every_stage_when_enabled() {
    let mut miner = TemplateMiner::with_profiler(MinerConfig::default(), Profiler::enabled()).unwrap();
    miner.add_line("a b");
    miner.add_line("a b");
    miner.add_line("x y z");
    let p = miner.profiler();
    assert_eq!(p.samples("total"), 3);
    assert_eq!(p.samples("mask"), 3);
    assert_eq!(p.samples("tokenize"), 3);
    assert_eq!(p.samples("tree_search"), 3);
    assert_eq!(p.samples("cluster_create"), 2);
    assert_eq!(p.samples("cluster_update"), 1);
    assert!(p.report().iter().any(|s| s.name == "total" && s.percent.is_some()));

    miner.profiler_mut().reset();
    assert_eq!(miner.profiler().samples("total"), 0);
}

#[test]
fn disabled_profiler_records_nothing_and_results_match() {
    let mut plain = miner_with(|_| {});
    let mut profiled = TemplateMiner::with_profiler(MinerConfig::default(), Profiler::enabled()).unwrap();
    for line in SAMPLE {
        assert_eq!(plain.add_line(line), profiled.add_line(line));
    }
    assert_eq!(plain.profiler().samples("total"), 0);
    assert!(plain.profiler().report().is_empty());
}

#[test]
fn tree_rendering_shows_token_count_branches() {
    let mut miner = miner_with(|_| {});
    miner.add_line("user 1 ok");
    miner.add_line("service ready");
    let tree = miner.render_tree(5);
    assert!(tree.contains("<L=3>"));
    assert!(tree.contains("<L=2>"));
    assert!(tree.contains("\"service\""));
}

#[test]
fn templates_render_with_configured_marker() {
    let mut miner = miner_with(|c| {
        c.masking.prefix = "[".into();
        c.masking.suffix = "]".into();
    });
    miner.add_line("job 1 done");
    let r = miner.add_line("job 2 done");
    assert_eq!(miner.wildcard_marker(), "[*]");
    assert_eq!(render_template(&r.template, miner.wildcard_marker()), "job [*] done");
}
