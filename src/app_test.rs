use super::*;
use crate::backend::Table;
use crate::backend::memory::MemoryBackend;
use crate::routes::AUTH_PATH;
use records::{Profile, Role};

fn seed_profile(backend: &MemoryBackend, email: &str, role: Role) -> records::AuthUser {
    let user = backend.create_user(email, "secret1");
    let profile = Profile { id: user.id, role, email: Some(email.to_owned()), full_name: None };
    backend.seed(Table::Profiles, &profile).unwrap();
    user
}

#[tokio::test]
async fn signed_out_root_redirects_to_auth() {
    let backend = Arc::new(MemoryBackend::new());
    let mut app = App::new(backend);
    app.ready().await;

    assert!(matches!(app.screen().await, Screen::Auth(_)));
    assert_eq!(app.path(), AUTH_PATH);
}

#[tokio::test]
async fn loading_state_shows_placeholder() {
    let backend = Arc::new(MemoryBackend::new());
    let mut app = App::new(backend);
    // The listener task has not run yet on the current-thread runtime.
    assert!(app.auth().current().loading);
    assert!(matches!(app.screen().await, Screen::Loading));
    assert_eq!(app.path(), ROOT_PATH);
}

#[tokio::test]
async fn sign_in_navigates_to_dashboard() {
    let backend = Arc::new(MemoryBackend::new());
    seed_profile(&backend, "admin@example.edu", Role::Admin);
    let mut app = App::new(backend);
    app.ready().await;

    let Screen::Auth(mut page) = app.screen().await else {
        panic!("expected auth screen");
    };
    page.set_email("admin@example.edu");
    page.set_password("secret1");
    let next = page.submit().await.expect("sign-in succeeds");
    assert_eq!(next, ROOT_PATH);

    app.navigate(next);
    app.auth().wait_until(|s| s.user.is_some()).await;
    let Screen::Dashboard(dashboard) = app.screen().await else {
        panic!("expected dashboard");
    };
    assert_eq!(dashboard.role(), Role::Admin);
    assert_eq!(app.path(), ROOT_PATH);
}

#[tokio::test]
async fn failed_sign_in_stays_on_auth() {
    let backend = Arc::new(MemoryBackend::new());
    seed_profile(&backend, "admin@example.edu", Role::Admin);
    let mut app = App::new(backend);
    app.ready().await;

    let Screen::Auth(mut page) = app.screen().await else {
        panic!("expected auth screen");
    };
    page.set_email("admin@example.edu");
    page.set_password("wrong-password");
    assert!(page.submit().await.is_none());
    assert_eq!(page.error(), Some("Invalid login credentials"));
    assert_eq!(app.path(), AUTH_PATH);
    assert!(app.auth().current().user.is_none());
}

#[tokio::test]
async fn sign_up_with_failed_profile_insert_leaves_account_without_profile() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_next_insert(Table::Profiles, "permission denied for table profiles");
    let mut app = App::new(backend.clone());
    app.ready().await;

    let Screen::Auth(mut page) = app.screen().await else {
        panic!("expected auth screen");
    };
    page.toggle_mode();
    page.set_email("new@example.edu");
    page.set_password("secret1");

    assert!(page.submit().await.is_none());
    assert_eq!(page.error(), Some("permission denied for table profiles"));
    assert!(backend.user_exists("new@example.edu"));
    assert!(backend.rows(Table::Profiles).is_empty());
}

#[tokio::test]
async fn sign_out_redirects_to_auth() {
    let backend = Arc::new(MemoryBackend::new());
    seed_profile(&backend, "student@example.edu", Role::User);
    backend.sign_in_with_password("student@example.edu", "secret1").await.unwrap();
    let mut app = App::new(backend);
    assert!(app.ready().await.user.is_some());

    let Screen::Dashboard(dashboard) = app.screen().await else {
        panic!("expected dashboard");
    };
    assert!(matches!(guard(&app.auth().current()), Guard::Render(_)));

    dashboard.sign_out().await.unwrap();
    let state = app.auth().wait_until(|s| s.user.is_none()).await;
    assert_eq!(guard(&state), Guard::Redirect(AUTH_PATH));

    assert!(matches!(app.screen().await, Screen::Auth(_)));
    assert_eq!(app.path(), AUTH_PATH);
}

#[tokio::test]
async fn auth_path_renders_auth_page_even_when_signed_in() {
    let backend = Arc::new(MemoryBackend::new());
    seed_profile(&backend, "student@example.edu", Role::User);
    backend.sign_in_with_password("student@example.edu", "secret1").await.unwrap();
    let mut app = App::new(backend);
    app.ready().await;

    app.navigate(AUTH_PATH);
    assert!(matches!(app.screen().await, Screen::Auth(_)));
}

#[tokio::test]
async fn community_is_passed_to_dashboard() {
    let backend = Arc::new(MemoryBackend::new());
    let admin = seed_profile(&backend, "admin@example.edu", Role::Admin);
    backend.sign_in_with_password("admin@example.edu", "secret1").await.unwrap();
    let community = uuid::Uuid::new_v4();
    let mut app = App::new(backend).with_community(Some(community));
    app.ready().await;

    let Screen::Dashboard(mut dashboard) = app.screen().await else {
        panic!("expected dashboard");
    };
    dashboard.form.title = "Hack Night".into();
    dashboard.form.description = "Bring a laptop".into();
    dashboard.form.event_type = "workshop".into();
    dashboard.form.start_date = "2024-05-01T18:00".into();
    dashboard.form.end_date = "2024-05-01T21:00".into();
    dashboard.form.location = "Lab 3".into();
    dashboard.form.max_participants = "40".into();
    dashboard.create_event().await.unwrap();

    let event = &dashboard.events()[0];
    assert_eq!(event.community_id, Some(community));
    assert_eq!(event.created_by, Some(admin.id));
}

#[tokio::test]
async fn shutdown_releases_auth_listener() {
    let backend = Arc::new(MemoryBackend::new());
    let app = App::new(backend.clone());
    app.ready().await;
    assert_eq!(backend.auth_listener_count(), 1);

    app.shutdown().await;
    assert_eq!(backend.auth_listener_count(), 0);
}
