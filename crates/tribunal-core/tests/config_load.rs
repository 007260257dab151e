use std::io::Write;
use tempfile::NamedTempFile;
use tribunal_core::config::{load_config, write_sample_config, JudgeProvider, TribunalConfig};
use tribunal_core::tokens::TokenizerKind;

#[test]
fn loads_yaml_from_disk() {
    let mut f = NamedTempFile::new().unwrap();
    writeln!(
        f,
        "version: 1\njudge:\n  provider: fake\n  parallel: 2\nbatching:\n  tokenizer: whitespace\ncache:\n  capacity: 5\n  ttl_seconds: 60\n"
    )
    .unwrap();
    let cfg = load_config(f.path()).unwrap();
    assert_eq!(cfg.judge.provider, JudgeProvider::Fake);
    assert_eq!(cfg.judge.parallel, 2);
    assert_eq!(cfg.batching.tokenizer, TokenizerKind::Whitespace);
    assert_eq!(cfg.cache.capacity, 5);
    assert_eq!(cfg.cache.ttl().unwrap().as_secs(), 60);
}

#[test]
fn sample_config_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tribunal.yaml");
    write_sample_config(&path).unwrap();
    assert_eq!(load_config(&path).unwrap(), TribunalConfig::default());
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(&dir.path().join("nope.yaml")).unwrap_err();
    assert!(err.to_string().starts_with("config error: failed to read config"));
}
