use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use super::*;

#[test]
fn test_config_loads_defaults() {
    let config = BenchConfig::load_default().expect("Should load default config");

    // Values from default-config.toml
    assert_eq!(config.workload.source, WorkSource::Synthetic);
    assert_eq!(config.workload.count, 48);
    assert_eq!(config.experiment.threads, 4);
    assert_eq!(config.experiment.permits, 2);
    assert_eq!(config.results.dir, PathBuf::from("results"));
    assert!(config.workload.output_dir.is_none());
    assert!(config.experiment.only.is_empty());
}

#[test]
fn test_custom_config_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.toml");
    fs::write(&path, "[experiment]\nthreads = 16\npermits = 5\n").unwrap();

    let config = BenchConfig::load(Some(path.as_path()), None::<&()>).unwrap();
    assert_eq!(config.experiment.threads, 16);
    assert_eq!(config.experiment.permits, 5);
    // Untouched keys keep their defaults
    assert_eq!(config.experiment.pool_workers, 4);
}

#[test]
fn test_custom_json_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.json");
    fs::write(&path, r#"{"workload": {"count": 3, "output_dir": "frames"}}"#).unwrap();

    let config = BenchConfig::load(Some(path.as_path()), None::<&()>).unwrap();
    assert_eq!(config.workload.count, 3);
    assert_eq!(config.workload.output_dir, Some(PathBuf::from("frames")));
}

#[test]
fn test_missing_custom_config_is_an_error() {
    let err = BenchConfig::load(Some(std::path::Path::new("no-such-file.toml")), None::<&()>)
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_cli_overrides_win_and_skip_unset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.toml");
    fs::write(&path, "[experiment]\nthreads = 16\npool_workers = 6\n").unwrap();

    let overrides = ConfigOverrides {
        experiment: ExperimentOverrides {
            threads: Some(2),
            only: vec!["sequential".to_string()],
            ..Default::default()
        },
        ..Default::default()
    }
    .results_in(Some(PathBuf::from("elsewhere")));

    let config = BenchConfig::load(Some(path.as_path()), Some(&overrides)).unwrap();
    assert_eq!(config.experiment.threads, 2);
    assert_eq!(config.experiment.pool_workers, 6);
    assert_eq!(config.experiment.only, vec!["sequential"]);
    assert_eq!(config.results.dir, PathBuf::from("elsewhere"));
    assert!(config.results.write);
}

#[test]
fn test_environment_layer() {
    // Only this test reads demo.iterations, so the variable cannot leak
    // into other assertions.
    unsafe {
        std::env::set_var("SYNCBENCH_DEMO__ITERATIONS", "77");
    }
    let iterations: usize = BenchConfig::figment(None, None::<&()>)
        .extract_inner("demo.iterations")
        .unwrap();
    assert_eq!(iterations, 77);
}

#[test]
fn test_validate_rejects_zero_permits() {
    let mut config = BenchConfig::load_default().unwrap();
    config.experiment.permits = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("experiment.permits"));

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[experiment]\npermits = 0\n").unwrap();
    assert!(BenchConfig::load(Some(path.as_path()), None::<&()>).is_err());
}

#[test]
fn test_validate_rejects_empty_frames() {
    let mut config = BenchConfig::load_default().unwrap();
    config.workload.width = 0;
    assert!(config.validate().is_err());

    // Frame size is irrelevant when reading a directory
    config.workload.source = WorkSource::Directory;
    assert!(config.validate().is_ok());
}

#[test]
fn test_process_count_resolves_zero() {
    let mut config = BenchConfig::load_default().unwrap();
    config.experiment.processes = 0;
    assert_eq!(config.process_count(), num_cpus::get());
    config.experiment.processes = 3;
    assert_eq!(config.process_count(), 3);
}

#[test]
fn test_load_items_synthetic() {
    let config = BenchConfig::load_default().unwrap();
    let items = config.load_items().unwrap();
    assert_eq!(items.len(), config.workload.count);
}
