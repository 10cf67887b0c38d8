use super::*;

const KEYS: &[&str] = &[
    "TASTING_WS_URL",
    "TASTING_API_URL",
    "TASTING_RECONNECT_ATTEMPTS",
    "TASTING_RECONNECT_INTERVAL_MS",
    "TASTING_PING_INTERVAL_MS",
    "TASTING_ROSTER_INTERVAL_MS",
    "TASTING_AUTOSAVE_INTERVAL_MS",
    "TASTING_DRAFT_SNAPSHOT_TIMEOUT_MS",
    "TASTING_FLUSH_CONFIRM_TIMEOUT_MS",
    "TASTING_LOG_CAPACITY",
    "TASTING_HTTP_TIMEOUT_SECS",
];

/// # Safety
/// Env mutation races with other threads; every test touching these keys
/// holds `ENV_LOCK` for its whole body.
unsafe fn clear_env() {
    for key in KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[test]
fn default_matches_room_service_timings() {
    let cfg = SessionConfig::default();
    assert_eq!(cfg.reconnect_attempts, 5);
    assert_eq!(cfg.reconnect_interval, Duration::from_secs(2));
    assert_eq!(cfg.ping_interval, Duration::from_secs(10));
    assert_eq!(cfg.roster_interval, Duration::from_secs(10));
    assert_eq!(cfg.autosave_interval, Duration::from_secs(5));
    assert_eq!(cfg.ws_url, DEFAULT_WS_URL);
}

#[test]
fn from_env_without_overrides_equals_default() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    unsafe { clear_env() };

    assert_eq!(SessionConfig::from_env(), SessionConfig::default());
}

#[test]
fn from_env_reads_overrides_and_trims_url_slash() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    unsafe {
        clear_env();
        std::env::set_var("TASTING_WS_URL", "wss://rooms.example.test/ws/");
        std::env::set_var("TASTING_RECONNECT_ATTEMPTS", "3");
        std::env::set_var("TASTING_AUTOSAVE_INTERVAL_MS", "250");
        std::env::set_var("TASTING_LOG_CAPACITY", "16");
    }

    let cfg = SessionConfig::from_env();
    assert_eq!(cfg.ws_url, "wss://rooms.example.test/ws");
    assert_eq!(cfg.reconnect_attempts, 3);
    assert_eq!(cfg.autosave_interval, Duration::from_millis(250));
    assert_eq!(cfg.log_capacity, 16);
    assert_eq!(cfg.api_url, DEFAULT_API_URL);

    unsafe { clear_env() };
}

#[test]
fn from_env_falls_back_on_garbage_values() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    unsafe {
        clear_env();
        std::env::set_var("TASTING_RECONNECT_ATTEMPTS", "many");
        std::env::set_var("TASTING_PING_INTERVAL_MS", "-5");
        std::env::set_var("TASTING_API_URL", "   ");
    }

    let cfg = SessionConfig::from_env();
    assert_eq!(cfg.reconnect_attempts, DEFAULT_RECONNECT_ATTEMPTS);
    assert_eq!(cfg.ping_interval, Duration::from_millis(DEFAULT_PING_INTERVAL_MS));
    assert_eq!(cfg.api_url, DEFAULT_API_URL);

    unsafe { clear_env() };
}

#[test]
fn from_env_treats_zero_timer_periods_as_unset() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    unsafe {
        clear_env();
        std::env::set_var("TASTING_PING_INTERVAL_MS", "0");
        std::env::set_var("TASTING_ROSTER_INTERVAL_MS", "0");
        std::env::set_var("TASTING_AUTOSAVE_INTERVAL_MS", "0");
        std::env::set_var("TASTING_DRAFT_SNAPSHOT_TIMEOUT_MS", "0");
    }

    let cfg = SessionConfig::from_env();
    assert_eq!(cfg.ping_interval, Duration::from_millis(DEFAULT_PING_INTERVAL_MS));
    assert_eq!(cfg.roster_interval, Duration::from_millis(DEFAULT_ROSTER_INTERVAL_MS));
    assert_eq!(cfg.autosave_interval, Duration::from_millis(DEFAULT_AUTOSAVE_INTERVAL_MS));
    assert_eq!(cfg.draft_snapshot_timeout, Duration::ZERO);

    unsafe { clear_env() };
}

#[test]
fn timer_period_never_drops_below_the_minimum() {
    assert_eq!(timer_period(Duration::ZERO), MIN_TIMER_PERIOD);
    assert_eq!(timer_period(Duration::from_secs(5)), Duration::from_secs(5));
}
