use logsift::config::MaskRuleConfig;
use logsift::miner::MinerError;
use logsift::{ConfigError, MinerConfig, TemplateMiner};
use std::io::Write;

#[test]
fn defaults_are_valid() {
    let config = MinerConfig::default();
    config.validate().unwrap();
    assert_eq!(config.drain.similarity_threshold, 0.4);
    assert_eq!(config.drain.match_depth, 4);
    assert_eq!(config.drain.max_children, 100);
    assert!(config.drain.parametrize_numeric_tokens);
    assert_eq!(config.masking.wildcard_marker(), "<*>");
    assert!(config.snapshot.on_change);
}

#[test]
fn toml_overrides_only_what_it_names() {
    let config = MinerConfig::from_toml_str(
        r#"
[drain]
similarity_threshold = 0.5
match_depth = 3
extra_delimiters = ["_"]

[masking]
use_defaults = true

[[masking.rules]]
regex_pattern = 'ERR\d+'
mask_with = "CODE"

[snapshot]
on_change = false
"#,
    )
    .unwrap();
    assert_eq!(config.drain.similarity_threshold, 0.5);
    assert_eq!(config.drain.match_depth, 3);
    assert_eq!(config.drain.max_children, 100);
    assert_eq!(config.drain.extra_delimiters, vec!["_".to_string()]);
    assert!(config.masking.use_defaults);
    assert_eq!(config.masking.rules.len(), 1);
    assert_eq!(config.masking.rules[0].mask_with, "CODE");
    assert!(!config.snapshot.on_change);
    assert_eq!(config.snapshot.interval_minutes, 5);
    config.validate().unwrap();
}

#[test]
fn malformed_toml_is_a_parse_error() {
    assert!(matches!(MinerConfig::from_toml_str("drain = 3"), Err(ConfigError::Parse(_))));
}

#[test]
fn from_file_reads_and_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("miner.toml");
    assert!(matches!(MinerConfig::from_file(&path), Err(ConfigError::Io { .. })));

    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "[drain]\nmatch_depth = 2").unwrap();
    drop(f);
    assert_eq!(MinerConfig::from_file(&path).unwrap().drain.match_depth, 2);
}

fn rejected(edit: impl FnOnce(&mut MinerConfig)) -> bool {
    let mut config = MinerConfig::default();
    edit(&mut config);
    matches!(config.validate(), Err(ConfigError::Invalid(_)))
}

#[test]
fn validation_rejects_each_invalid_parameter() {
    assert!(rejected(|c| c.drain.match_depth = 0));
    assert!(rejected(|c| c.drain.max_children = 0));
    assert!(rejected(|c| c.drain.similarity_threshold = 1.5));
    assert!(rejected(|c| c.drain.similarity_threshold = -0.1));
    assert!(rejected(|c| c.drain.similarity_threshold = f64::NAN));
    assert!(rejected(|c| c.drain.extra_delimiters = vec![String::new()]));
    assert!(rejected(|c| {
        c.masking.prefix.clear();
        c.masking.suffix.clear();
    }));
    assert!(rejected(|c| c.masking.rules = vec![MaskRuleConfig { regex_pattern: r"\d+".into(), mask_with: String::new() }]));
    assert!(rejected(|c| c.masking.rules = vec![MaskRuleConfig { regex_pattern: r"\d+".into(), mask_with: "TWO WORDS".into() }]));
    assert!(rejected(|c| c.masking.rules = vec![MaskRuleConfig { regex_pattern: String::new(), mask_with: "X".into() }]));
}

#[test]
fn thresholds_at_the_bounds_are_accepted() {
    assert!(!rejected(|c| c.drain.similarity_threshold = 0.0));
    assert!(!rejected(|c| c.drain.similarity_threshold = 1.0));
    assert!(!rejected(|c| c.drain.max_children = 1));
}

#[test]
fn miner_refuses_invalid_configuration() {
    let mut config = MinerConfig::default();
    config.drain.match_depth = 0;
    assert!(matches!(TemplateMiner::new(config), Err(MinerError::Config(ConfigError::Invalid(_)))));

    let mut config = MinerConfig::default();
    config.masking.rules.push(MaskRuleConfig { regex_pattern: "[".into(), mask_with: "X".into() });
    assert!(matches!(TemplateMiner::new(config), Err(MinerError::Config(ConfigError::InvalidRule { .. }))));
}
