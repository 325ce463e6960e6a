// tests/common/mod.rs
use record_spool::monitoring::MonitoringConfig;
use record_spool::DrainerConfig;
use std::sync::Once;
use std::time::Duration;

static INIT: Once = Once::new();

#[allow(dead_code)]
pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("record_spool=debug".parse().unwrap()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[allow(dead_code)]
pub fn create_test_config() -> DrainerConfig {
    DrainerConfig {
        batch_size: 100,
        poll_interval: Duration::from_millis(10),
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(50),
        monitoring: MonitoringConfig::default(),
    }
}
