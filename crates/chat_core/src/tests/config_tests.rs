use std::collections::HashMap;

use super::*;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn missing_file_and_env_yield_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = load_settings_from(&dir.path().join("client.toml"), env_from(&[]));
    assert_eq!(settings, ClientSettings::default());
    assert_eq!(settings.request_timeout(), Duration::from_secs(10));
}

#[test]
fn file_values_are_layered_under_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("client.toml");
    fs::write(
        &path,
        "base_url = \"https://chat.example.org\"\nrequest_timeout_secs = 30\nconnect_timeout_secs = 4\n",
    )
    .expect("write config");

    let settings = load_settings_from(&path, env_from(&[("APP__REQUEST_TIMEOUT_SECS", "5")]));
    assert_eq!(settings.base_url, "https://chat.example.org");
    assert_eq!(settings.request_timeout_secs, 5);
    assert_eq!(settings.connect_timeout_secs, 4);
}

#[test]
fn app_prefixed_variables_win_over_short_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = load_settings_from(
        &dir.path().join("client.toml"),
        env_from(&[
            ("CHAT_BASE_URL", "http://one:1"),
            ("APP__BASE_URL", "http://two:2"),
            ("CHAT_REALTIME_URL", "ws://rt:9/socket.io/?EIO=4&transport=websocket"),
            ("APP__CONNECT_TIMEOUT_SECS", "not-a-number"),
        ]),
    );
    assert_eq!(settings.base_url, "http://two:2");
    assert_eq!(
        settings.realtime_url.as_deref(),
        Some("ws://rt:9/socket.io/?EIO=4&transport=websocket")
    );
    assert_eq!(settings.connect_timeout_secs, 10);
}

#[test]
fn unreadable_file_is_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("client.toml");
    fs::write(&path, "base_url = [").expect("write config");
    assert_eq!(load_settings_from(&path, env_from(&[])), ClientSettings::default());
}

#[test]
fn realtime_endpoint_maps_http_schemes() {
    assert_eq!(
        realtime_endpoint("http://localhost:3000").expect("ws").as_str(),
        "ws://localhost:3000/socket.io/?EIO=4&transport=websocket"
    );
    assert_eq!(
        realtime_endpoint("https://chat.example.org/").expect("wss").as_str(),
        "wss://chat.example.org/socket.io/?EIO=4&transport=websocket"
    );
}

#[test]
fn realtime_endpoint_rejects_other_schemes() {
    assert!(matches!(
        realtime_endpoint("ftp://files.example.org"),
        Err(ClientError::InvalidEndpoint(_))
    ));
    assert!(matches!(
        realtime_endpoint("not a url"),
        Err(ClientError::InvalidEndpoint(_))
    ));
}

#[test]
fn explicit_realtime_url_is_used_verbatim() {
    let settings = ClientSettings {
        realtime_url: Some("ws://127.0.0.1:9000/socket.io/?EIO=4&transport=websocket".into()),
        ..ClientSettings::default()
    };
    assert_eq!(
        settings.realtime_endpoint().expect("endpoint").as_str(),
        "ws://127.0.0.1:9000/socket.io/?EIO=4&transport=websocket"
    );
}
