use super::*;
use crate::config::HttpTimeouts;
use uuid::Uuid;

fn temp_session_path() -> PathBuf {
    std::env::temp_dir().join(format!("eventhub-session-{}.json", Uuid::new_v4()))
}

fn test_config(session_file: PathBuf) -> AppConfig {
    AppConfig {
        supabase_url: "https://abc.supabase.co/".into(),
        anon_key: "anon-key".into(),
        session_file,
        timeouts: HttpTimeouts::default(),
        community_id: None,
    }
}

fn session(expires_at: Option<i64>, refresh_token: Option<&str>) -> Session {
    Session {
        access_token: "access".into(),
        refresh_token: refresh_token.map(str::to_owned),
        expires_at,
        user: AuthUser { id: Uuid::new_v4(), email: Some("a@example.edu".into()) },
    }
}

// =============================================================================
// parse_token_response
// =============================================================================

#[test]
fn token_response_keeps_expires_at() {
    let json = r#"{
        "access_token": "tok",
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": 1700003600,
        "refresh_token": "ref",
        "user": {"id": "1f0c6f54-7a55-4c07-8d0b-7c7e9e0a0b01", "email": "a@b.c"}
    }"#;
    let session = parse_token_response(json, 0).unwrap();
    assert_eq!(session.access_token, "tok");
    assert_eq!(session.refresh_token.as_deref(), Some("ref"));
    assert_eq!(session.expires_at, Some(1_700_003_600));
}

#[test]
fn token_response_derives_expiry_from_expires_in() {
    let json = r#"{
        "access_token": "tok",
        "expires_in": 60,
        "user": {"id": "1f0c6f54-7a55-4c07-8d0b-7c7e9e0a0b01"}
    }"#;
    let session = parse_token_response(json, 1_000).unwrap();
    assert_eq!(session.expires_at, Some(1_060));
    assert!(session.user.email.is_none());
}

#[test]
fn token_response_without_user_is_parse_error() {
    let err = parse_token_response(r#"{"access_token": "tok"}"#, 0).unwrap_err();
    assert!(matches!(err, BackendError::Parse(_)));
}

// =============================================================================
// parse_sign_up
// =============================================================================

#[test]
fn sign_up_with_session_returns_both() {
    let json = r#"{
        "access_token": "tok",
        "expires_in": 3600,
        "refresh_token": "ref",
        "user": {"id": "1f0c6f54-7a55-4c07-8d0b-7c7e9e0a0b01", "email": "a@b.c"}
    }"#;
    let signup = parse_sign_up(json, 0).unwrap();
    assert!(signup.session.is_some());
    assert_eq!(signup.user.unwrap().email.as_deref(), Some("a@b.c"));
}

#[test]
fn sign_up_pending_confirmation_returns_bare_user() {
    let json = r#"{"id": "1f0c6f54-7a55-4c07-8d0b-7c7e9e0a0b01", "email": "a@b.c", "confirmation_sent_at": "2024-05-01T00:00:00Z"}"#;
    let signup = parse_sign_up(json, 0).unwrap();
    assert!(signup.session.is_none());
    assert_eq!(signup.user.unwrap().email.as_deref(), Some("a@b.c"));
}

#[test]
fn sign_up_wrapped_user_without_session() {
    let json = r#"{"user": {"id": "1f0c6f54-7a55-4c07-8d0b-7c7e9e0a0b01"}, "session": null}"#;
    let signup = parse_sign_up(json, 0).unwrap();
    assert!(signup.user.is_some());
    assert!(signup.session.is_none());
}

#[test]
fn sign_up_with_empty_body_has_no_user() {
    assert_eq!(parse_sign_up("{}", 0).unwrap(), SignUp::default());
}

// =============================================================================
// error parsing
// =============================================================================

#[test]
fn auth_error_message_uses_msg() {
    let body = r#"{"code": 400, "error_code": "invalid_credentials", "msg": "Invalid login credentials"}"#;
    assert_eq!(parse_error_message(400, body), "Invalid login credentials");
}

#[test]
fn auth_error_message_uses_error_description() {
    let body = r#"{"error": "invalid_grant", "error_description": "Email not confirmed"}"#;
    assert_eq!(parse_error_message(400, body), "Email not confirmed");
}

#[test]
fn non_json_error_body_is_returned_trimmed() {
    assert_eq!(parse_error_message(502, "  Bad Gateway\n"), "Bad Gateway");
}

#[test]
fn empty_error_body_mentions_status() {
    assert_eq!(parse_error_message(500, ""), "request failed with status 500");
}

#[test]
fn api_error_keeps_postgres_code() {
    let body = r#"{"code": "23505", "details": null, "hint": null, "message": "duplicate key value violates unique constraint \"profiles_pkey\""}"#;
    let err = parse_api_error(409, body);
    assert!(err.is_unique_violation());
    assert!(err.to_string().starts_with("duplicate key value"));
}

// =============================================================================
// parse_rows
// =============================================================================

#[test]
fn rows_parse_from_array() {
    let rows = parse_rows(r#"[{"id": 1}, {"id": 2}]"#, false).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn single_object_becomes_one_row() {
    let rows = parse_rows(r#"{"role": "admin"}"#, true).unwrap();
    assert_eq!(rows, vec![serde_json::json!({"role": "admin"})]);
}

#[test]
fn object_without_single_flag_is_rejected() {
    assert!(parse_rows(r#"{"role": "admin"}"#, false).is_err());
}

// =============================================================================
// SessionStore
// =============================================================================

#[test]
fn session_store_round_trips_and_clears() {
    let store = SessionStore::new(temp_session_path());
    assert!(store.load().unwrap().is_none());

    let s = session(Some(42), Some("ref"));
    store.save(&s).unwrap();
    assert_eq!(store.load().unwrap(), Some(s));

    store.clear().unwrap();
    assert!(store.load().unwrap().is_none());
    store.clear().unwrap();
}

#[cfg(unix)]
#[test]
fn session_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let path = temp_session_path();
    let store = SessionStore::new(&path);
    store.save(&session(Some(42), Some("ref"))).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
    store.clear().unwrap();
}

#[cfg(unix)]
#[test]
fn save_tightens_existing_world_readable_file() {
    use std::os::unix::fs::PermissionsExt;

    let path = temp_session_path();
    std::fs::write(&path, "{}").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    let store = SessionStore::new(&path);
    let s = session(None, Some("ref"));
    store.save(&s).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
    assert_eq!(store.load().unwrap(), Some(s));
    store.clear().unwrap();
}

#[test]
fn save_leaves_no_temp_file() {
    let path = temp_session_path();
    let store = SessionStore::new(&path);
    store.save(&session(None, None)).unwrap();
    store.save(&session(Some(7), None)).unwrap();

    assert!(!store.temp_path().exists());
    assert_eq!(store.load().unwrap().and_then(|s| s.expires_at), Some(7));
    store.clear().unwrap();
}

#[test]
fn corrupt_session_file_is_an_error() {
    let path = temp_session_path();
    std::fs::write(&path, "not json").unwrap();
    let store = SessionStore::new(&path);
    assert!(matches!(store.load(), Err(BackendError::SessionStore(_))));
    std::fs::remove_file(path).unwrap();
}

// =============================================================================
// SupabaseBackend (offline paths)
// =============================================================================

#[test]
fn urls_are_built_from_trimmed_base() {
    let backend = SupabaseBackend::new(&test_config(temp_session_path())).unwrap();
    assert_eq!(backend.auth_url("signup"), "https://abc.supabase.co/auth/v1/signup");
    assert_eq!(backend.rest_url(Table::EventParticipants), "https://abc.supabase.co/rest/v1/event_participants");
}

#[tokio::test]
async fn bearer_falls_back_to_anon_key() {
    let backend = SupabaseBackend::new(&test_config(temp_session_path())).unwrap();
    assert_eq!(backend.bearer().await, "anon-key");
    assert!(backend.get_session().await.unwrap().is_none());
}

#[tokio::test]
async fn persisted_session_is_restored() {
    let path = temp_session_path();
    let s = session(None, None);
    SessionStore::new(&path).save(&s).unwrap();

    let backend = SupabaseBackend::new(&test_config(path.clone())).unwrap();
    assert_eq!(backend.get_session().await.unwrap(), Some(s));
    assert_eq!(backend.bearer().await, "access");

    std::fs::remove_file(path).unwrap();
}

#[tokio::test]
async fn expired_session_without_refresh_token_is_dropped() {
    let path = temp_session_path();
    SessionStore::new(&path).save(&session(Some(1), None)).unwrap();

    let backend = SupabaseBackend::new(&test_config(path.clone())).unwrap();
    let mut changes = backend.on_auth_state_change();
    assert!(backend.get_session().await.unwrap().is_none());
    assert_eq!(changes.recv().await.unwrap().event, AuthEvent::SignedOut);
    assert!(!path.exists());
}

#[tokio::test]
async fn unreadable_session_file_starts_signed_out() {
    let path = temp_session_path();
    std::fs::write(&path, "{").unwrap();
    let backend = SupabaseBackend::new(&test_config(path.clone())).unwrap();
    assert!(backend.get_session().await.unwrap().is_none());
    std::fs::remove_file(path).unwrap();
}
