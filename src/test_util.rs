use std::sync::Once;

static INIT: Once = Once::new();

/// Route tracing output through the test harness, once per process.
pub fn trace_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}
