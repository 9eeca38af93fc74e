use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs};

use idpproxy_auth::config::SourceConfig;
use idpproxy_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("idpproxy.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
base_url = "https://idp.example.org"
body_limit_bytes = 4096

[logging]
level = "debug"

[proxy.keys]
private_key = "keys/proxy.key"

[proxy.metadata]
files = ["metadata/sp.xml"]

[[proxy.consumer.sources]]
type = "file"
path = "consumers.json"

[[proxy.consumer.sources]]
type = "metadata"

[proxy.social]
request_timeout = "10s"
session_ttl = "30m"

[[proxy.social.providers]]
name = "facebook"
authorization_endpoint = "https://www.facebook.com/dialog/oauth"
token_endpoint = "https://graph.facebook.com/oauth/access_token"
userinfo_endpoint = "https://graph.facebook.com/me"
scopes = ["email"]
authenticating_authority = "https://www.facebook.com"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.server.body_limit_bytes, 4096);
    assert_eq!(cfg.base_url(), "https://idp.example.org");
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.proxy.keys.private_key, PathBuf::from("keys/proxy.key"));
    assert_eq!(cfg.proxy.metadata.files, vec![PathBuf::from("metadata/sp.xml")]);
    assert_eq!(
        cfg.proxy.consumer.sources,
        vec![
            SourceConfig::File {
                path: PathBuf::from("consumers.json")
            },
            SourceConfig::Metadata
        ]
    );
    assert_eq!(cfg.proxy.social.request_timeout, Duration::from_secs(10));
    assert_eq!(cfg.proxy.social.session_ttl, Duration::from_secs(1800));
    let facebook = &cfg.proxy.social.providers[0];
    assert_eq!(facebook.name, "facebook");
    assert_eq!(facebook.scope(), "email");
    assert_eq!(facebook.user_id_field, "id");

    // 2) Env override should win over file
    unsafe {
        env::set_var("IDPPROXY__SERVER__PORT", "9191");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.server.port, 9191);
    unsafe {
        env::remove_var("IDPPROXY__SERVER__PORT");
    }

    // 3) Invalid values fail validation
    let bad_level = toml_content.replace(r#"level = "debug""#, r#"level = "chatty""#);
    fs::write(&path, bad_level).expect("write toml");
    let err = load_config(path.to_str()).unwrap_err();
    assert!(err.contains("logging.level"), "{err}");

    let duplicate_provider = format!(
        "{toml_content}
[[proxy.social.providers]]
name = \"facebook\"
authorization_endpoint = \"https://idp.example/authorize\"
token_endpoint = \"https://idp.example/token\"
userinfo_endpoint = \"https://idp.example/me\"
"
    );
    fs::write(&path, duplicate_provider).expect("write toml");
    let err = load_config(path.to_str()).unwrap_err();
    assert!(err.contains("twice"), "{err}");

    // 4) Unknown source types are rejected while deserializing
    let bad_source = toml_content.replace(r#"type = "file""#, r#"type = "python""#);
    fs::write(&path, bad_source).expect("write toml");
    assert!(load_config(path.to_str()).is_err());

    // 5) Missing file falls back to defaults
    let cfg = load_config(dir.path().join("absent.toml").to_str()).expect("defaults");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.proxy.consumer.sources, vec![SourceConfig::Metadata]);
}
