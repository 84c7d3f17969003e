//! End-to-end lifecycle tests: build, reload under both detection
//! strategies, handler dispatch, termination, and re-initialization.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::sleep;

use dyncfg::{
    BuildOutcome, ChangeHandler, DynConfigError, DynamicConfig, PollFrequency, Strategy,
};

/// Poll an accessor until the expected value shows up or the deadline passes.
async fn wait_for_value(
    config: &DynamicConfig,
    key: &str,
    expected: Option<&str>,
    deadline: Duration,
) -> bool {
    let tries = (deadline.as_millis() / 100).max(1);
    for _ in 0..tries {
        let current = config.value(key).unwrap();
        if current.as_deref() == expected {
            return true;
        }
        sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watch_strategy_picks_up_source_mutation() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.properties");
    fs::write(&file, "test.account=demo\ntest.version=V2\n").unwrap();

    let config = DynamicConfig::new();
    DynamicConfig::builder()
        .use_custom_executor()
        .source(&file)
        .build_on(&config)
        .unwrap();

    assert_eq!(
        config.value("test.account").unwrap(),
        Some("demo".to_string())
    );

    sleep(Duration::from_millis(200)).await;
    fs::write(&file, "test.account=sales\ntest.version=V3\n").unwrap();

    assert!(
        wait_for_value(&config, "test.account", Some("sales"), Duration::from_secs(5)).await,
        "watch did not pick up the mutation"
    );
    assert_eq!(
        config.value("test.version").unwrap(),
        Some("V3".to_string())
    );

    config.terminate().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poll_strategy_picks_up_mutation_within_interval() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.properties");
    fs::write(&file, "test.timeout=10\n").unwrap();

    let config = DynamicConfig::new();
    DynamicConfig::builder()
        .use_custom_executor()
        .strategy(Strategy::Poll)
        .frequency(PollFrequency::High)
        .source(&file)
        .build_on(&config)
        .unwrap();

    sleep(Duration::from_millis(500)).await;
    fs::write(&file, "test.timeout=15\n").unwrap();

    // HIGH polls every 2s; a mutation must be visible within one interval
    // plus slack.
    assert!(
        wait_for_value(&config, "test.timeout", Some("15"), Duration::from_secs(5)).await,
        "poll did not pick up the mutation within the interval"
    );

    config.terminate().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poll_strategy_detects_mutation_racing_startup() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.properties");
    fs::write(&file, "test.timeout=10\n").unwrap();

    let config = DynamicConfig::new();
    DynamicConfig::builder()
        .use_custom_executor()
        .strategy(Strategy::Poll)
        .frequency(PollFrequency::High)
        .source(&file)
        .build_on(&config)
        .unwrap();

    // No settling sleep: the poll baseline is taken during the build, so a
    // mutation landing right after it must still register as a change.
    fs::write(&file, "test.timeout=15\n").unwrap();

    assert!(
        wait_for_value(&config, "test.timeout", Some("15"), Duration::from_secs(5)).await,
        "poll missed a mutation racing scheduler startup"
    );

    config.terminate().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn env_vars_participate_at_lowest_precedence() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.properties");
    fs::write(&file, "DYNCFG_TEST_SHARED=from-file\n").unwrap();

    std::env::set_var("DYNCFG_TEST_SHARED", "from-env");
    std::env::set_var("DYNCFG_TEST_ENV_ONLY", "42");

    let config = DynamicConfig::new();
    DynamicConfig::builder()
        .use_custom_executor()
        .include_sys_env_props()
        .source(&file)
        .build_on(&config)
        .unwrap();

    // The file source wins the collision; env-only keys still appear.
    assert_eq!(
        config.value("DYNCFG_TEST_SHARED").unwrap(),
        Some("from-file".to_string())
    );
    assert_eq!(config.int_value("DYNCFG_TEST_ENV_ONLY").unwrap(), Some(42));

    config.terminate().await.unwrap();
    std::env::remove_var("DYNCFG_TEST_SHARED");
    std::env::remove_var("DYNCFG_TEST_ENV_ONLY");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removed_keys_disappear_after_reload() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.properties");
    fs::write(&file, "keep=1\ndrop=2\n").unwrap();

    let config = DynamicConfig::new();
    DynamicConfig::builder()
        .use_custom_executor()
        .strategy(Strategy::Poll)
        .frequency(PollFrequency::High)
        .source(&file)
        .build_on(&config)
        .unwrap();

    assert_eq!(config.value("drop").unwrap(), Some("2".to_string()));

    sleep(Duration::from_millis(500)).await;
    fs::write(&file, "keep=1\n").unwrap();

    assert!(
        wait_for_value(&config, "drop", None, Duration::from_secs(5)).await,
        "removed key still present after reload"
    );
    assert_eq!(config.value("keep").unwrap(), Some("1".to_string()));

    config.terminate().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn precedence_holds_across_reloads() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("a.properties");
    let second = dir.path().join("b.properties");
    fs::write(&first, "x=1\ny=2\n").unwrap();
    fs::write(&second, "x=9\nz=3\n").unwrap();

    let config = DynamicConfig::new();
    DynamicConfig::builder()
        .use_custom_executor()
        .sources([&first, &second])
        .build_on(&config)
        .unwrap();

    let map = config.config_as_map().unwrap();
    assert_eq!(map.get("x"), Some(&"1".to_string()));
    assert_eq!(map.get("y"), Some(&"2".to_string()));
    assert_eq!(map.get("z"), Some(&"3".to_string()));

    // Mutating the later source must not let it override the earlier one.
    sleep(Duration::from_millis(200)).await;
    fs::write(&second, "x=42\nz=4\n").unwrap();

    assert!(
        wait_for_value(&config, "z", Some("4"), Duration::from_secs(5)).await,
        "watch did not pick up the mutation"
    );
    assert_eq!(config.value("x").unwrap(), Some("1".to_string()));

    config.terminate().await.unwrap();
}

struct Collector {
    seen: Arc<Mutex<Vec<Option<String>>>>,
}

impl ChangeHandler for Collector {
    fn on_change(&self, config: &HashMap<String, String>) {
        self.seen
            .lock()
            .unwrap()
            .push(config.get("test.version").cloned());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handlers_run_after_reload_and_panics_are_isolated() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.properties");
    fs::write(&file, "test.version=V2\n").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let config = DynamicConfig::new();
    DynamicConfig::builder()
        .use_custom_executor()
        .source(&file)
        .handler("exploding", || {
            |_: &HashMap<String, String>| panic!("boom")
        })
        .handler("collector", move || Collector { seen: sink.clone() })
        .build_on(&config)
        .unwrap();

    // Handlers run on reloads, not on the initial build.
    assert!(seen.lock().unwrap().is_empty());

    sleep(Duration::from_millis(200)).await;
    fs::write(&file, "test.version=V3\n").unwrap();

    let mut delivered = false;
    for _ in 0..50 {
        sleep(Duration::from_millis(100)).await;
        if seen
            .lock()
            .unwrap()
            .contains(&Some("V3".to_string()))
        {
            delivered = true;
            break;
        }
    }
    assert!(delivered, "handler did not observe the reload");

    config.terminate().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn directory_source_aggregates_contained_files() {
    let dir = TempDir::new().unwrap();
    let conf_dir = dir.path().join("conf.d");
    fs::create_dir(&conf_dir).unwrap();
    fs::write(conf_dir.join("10-base.properties"), "app.name=svc\napp.mode=base\n").unwrap();
    fs::write(conf_dir.join("20-extra.properties"), "app.mode=extra\napp.extra=1\n").unwrap();

    let config = DynamicConfig::new();
    DynamicConfig::builder()
        .use_custom_executor()
        .source(&conf_dir)
        .build_on(&config)
        .unwrap();

    // Files aggregate in name order; the earliest file wins on collisions.
    assert_eq!(config.value("app.name").unwrap(), Some("svc".to_string()));
    assert_eq!(config.value("app.mode").unwrap(), Some("base".to_string()));
    assert_eq!(config.value("app.extra").unwrap(), Some("1".to_string()));

    config.terminate().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_or_default_never_fails() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.properties");
    fs::write(&file, "test.timeout=not-a-number\ntest.blank=   \n").unwrap();

    let config = DynamicConfig::new();

    // Uninitialized.
    assert_eq!(config.get_or_default("test.timeout", 30i32), 30);

    DynamicConfig::builder()
        .use_custom_executor()
        .source(&file)
        .build_on(&config)
        .unwrap();

    // Missing key, uncoercible value, blank string.
    assert_eq!(config.get_or_default("test.sleep", 30i32), 30);
    assert_eq!(config.get_or_default("test.timeout", 10i32), 10);
    assert_eq!(
        config.get_or_default("test.blank", "fallback".to_string()),
        "fallback"
    );

    config.terminate().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn global_instance_build_is_idempotent_and_terminable() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.properties");
    fs::write(&file, "test.account=demo\n").unwrap();

    // Only this test may touch the shared instance.
    let outcome = DynamicConfig::builder()
        .use_custom_executor()
        .source(&file)
        .build()
        .unwrap();
    assert_eq!(outcome, BuildOutcome::Initialized);

    let details = DynamicConfig::global().init_details().unwrap();
    let again = DynamicConfig::builder().source(&file).build().unwrap();
    assert_eq!(again, BuildOutcome::AlreadyInitialized);
    assert_eq!(DynamicConfig::global().init_details().unwrap(), details);

    DynamicConfig::global().terminate().await.unwrap();
    assert!(matches!(
        DynamicConfig::global().value("test.account"),
        Err(DynConfigError::Uninitialized)
    ));
}
