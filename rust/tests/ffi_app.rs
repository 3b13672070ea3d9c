//! FFI surface smoke tests: initial routing, validation toasts, restore
//! against an unreachable backend. No network beyond a closed local port.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sierra_core::{AppAction, AppReconciler, AppUpdate, AuthState, FfiApp, Screen};
use tempfile::tempdir;

fn write_config(data_dir: &str, api_base_url: &str) {
    let path = std::path::Path::new(data_dir).join("sierra_config.json");
    let v = serde_json::json!({
        "api_base_url": api_base_url,
        "disable_realtime": true,
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

/// A localhost URL nothing listens on.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

#[derive(Clone)]
struct Collector {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

#[test]
fn starts_logged_out_on_login_screen() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();
    write_config(&data_dir, &closed_port_url());

    let app = FfiApp::new(data_dir);
    wait_until("initial snapshot", Duration::from_secs(5), || {
        app.state().router.default_screen == Screen::Login
    });
    let state = app.state();
    assert!(matches!(state.auth, AuthState::LoggedOut));
    assert!(state.chat_list.is_empty());
    assert!(state.current_chat.is_none());
}

#[test]
fn empty_credentials_toast_and_updates_are_ordered() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();
    write_config(&data_dir, &closed_port_url());

    let app = FfiApp::new(data_dir);
    let updates = Arc::new(Mutex::new(Vec::<AppUpdate>::new()));
    app.listen_for_updates(Box::new(Collector {
        updates: updates.clone(),
    }));

    app.dispatch(AppAction::Login {
        username: String::new(),
        password: String::new(),
    });
    wait_until("validation toast", Duration::from_secs(5), || {
        app.state().toast.as_deref() == Some("Enter a username and password")
    });

    app.dispatch(AppAction::ClearToast);
    wait_until("toast cleared", Duration::from_secs(5), || {
        app.state().toast.is_none()
    });

    let revs: Vec<u64> = updates.lock().unwrap().iter().map(AppUpdate::rev).collect();
    assert!(revs.len() >= 2);
    assert!(revs.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn unreachable_backend_keeps_stored_token() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();
    write_config(&data_dir, &closed_port_url());
    let token_path = dir.path().join("session_token.txt");
    std::fs::write(&token_path, "tok").unwrap();

    let app = FfiApp::new(data_dir);
    wait_until("restore gives up", Duration::from_secs(10), || {
        app.state()
            .toast
            .as_deref()
            .is_some_and(|t| t.starts_with("Could not load profile"))
    });
    assert!(matches!(app.state().auth, AuthState::LoggedOut));
    assert_eq!(std::fs::read_to_string(&token_path).unwrap(), "tok");
}
