use logsift::input::bracket_timestamp;
use logsift::report::{audit_input, event_line, format_cluster, result_json, write_cluster_report};
use logsift::{Cluster, MinerConfig, TemplateMiner, Token, WILDCARD};

#[test]
fn cluster_line_pads_id_and_size() {
    let cluster = Cluster { id: 3, template: vec![Token::Value("disk".into()), Token::Wildcard], size: 12 };
    assert_eq!(format_cluster(&cluster, WILDCARD), "ID=3     : size=12        : disk <*>");
    assert_eq!(cluster.to_string(), format_cluster(&cluster, WILDCARD));
}

#[test]
fn report_lists_clusters_largest_first() {
    let mut miner = TemplateMiner::new(MinerConfig::default()).unwrap();
    for line in ["service ready", "job 1 done", "job 2 done", "job 3 done", "disk full", "disk full"] {
        miner.add_line(line);
    }
    let mut out = Vec::new();
    let written = write_cluster_report(&mut out, miner.clusters(), miner.wildcard_marker()).unwrap();
    assert_eq!(written, 3);
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ID=1 "));
    assert!(lines[0].ends_with(": job <*> done"));
    assert!(lines[1].contains("size=2 "));
    assert!(lines[2].ends_with(": service ready"));
}

#[test]
fn result_json_carries_rendered_template() {
    let mut miner = TemplateMiner::new(MinerConfig::default()).unwrap();
    miner.add_line("user 123 login ok");
    let r = miner.add_line("user 456 login ok");
    let json = result_json(&r, miner.wildcard_marker());
    assert_eq!(json["change_type"], "template_changed");
    assert_eq!(json["cluster_id"], 0);
    assert_eq!(json["cluster_size"], 2);
    assert_eq!(json["cluster_count"], 1);
    assert_eq!(json["template_mined"], "user <*> login ok");
}

#[test]
fn event_line_joins_fields_with_semicolons() {
    let mut miner = TemplateMiner::new(MinerConfig::default()).unwrap();
    let r = miner.add_line("disk full");
    assert_eq!(event_line(7, &r, miner.wildcard_marker()), "7 ; 0 ; disk full");
}

#[test]
fn event_line_uses_the_bracketed_timestamp() {
    let mut miner = TemplateMiner::new(MinerConfig::default()).unwrap();
    let raw = "[2024-03-01T12:00:05.123Z] [worker] disk full";
    let r = miner.add_line("disk full");
    let when = bracket_timestamp(raw).unwrap();
    assert_eq!(event_line(&when, &r, miner.wildcard_marker()), "2024-03-01 12:00:05 ; 0 ; disk full");
}

#[test]
fn audit_input_names_the_line_and_its_text() {
    assert_eq!(audit_input(12, "user 42 logged in"), "Input (12): user 42 logged in");
}
