use super::*;
use crate::backend::memory::MemoryBackend;

fn memory() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new())
}

// =============================================================
// AuthState defaults
// =============================================================

#[test]
fn auth_state_default_no_user() {
    let state = AuthState::default();
    assert!(state.user.is_none());
}

#[test]
fn auth_state_default_is_loading() {
    let state = AuthState::default();
    assert!(state.loading);
}

// =============================================================
// AuthContext lifecycle
// =============================================================

#[tokio::test]
async fn loads_signed_out_when_no_session() {
    let backend = memory();
    let ctx = AuthContext::provide(backend.clone());
    let state = ctx.loaded().await;
    assert!(!state.loading);
    assert!(state.user.is_none());
}

#[tokio::test]
async fn loads_existing_session_user() {
    let backend = memory();
    let user = backend.create_user("a@example.edu", "secret1");
    backend.sign_in_with_password("a@example.edu", "secret1").await.unwrap();

    let ctx = AuthContext::provide(backend.clone());
    let state = ctx.loaded().await;
    assert_eq!(state.user, Some(user));
}

#[tokio::test]
async fn follows_sign_in_and_sign_out() {
    let backend = memory();
    let user = backend.create_user("a@example.edu", "secret1");
    let ctx = AuthContext::provide(backend.clone());
    ctx.loaded().await;

    backend.sign_in_with_password("a@example.edu", "secret1").await.unwrap();
    let state = ctx.wait_until(|s| s.user.is_some()).await;
    assert_eq!(state.user, Some(user));

    backend.sign_out().await.unwrap();
    let state = ctx.wait_until(|s| s.user.is_none()).await;
    assert!(state.user.is_none());
}

#[tokio::test]
async fn loading_never_returns_after_first_load() {
    let backend = memory();
    backend.create_user("a@example.edu", "secret1");
    let ctx = AuthContext::provide(backend.clone());
    ctx.loaded().await;

    let mut rx = ctx.watch();
    backend.sign_in_with_password("a@example.edu", "secret1").await.unwrap();
    rx.changed().await.unwrap();
    assert!(!rx.borrow().loading);
    backend.sign_out().await.unwrap();
    rx.changed().await.unwrap();
    assert!(!rx.borrow().loading);
}

#[tokio::test]
async fn release_drops_the_subscription() {
    let backend = memory();
    let ctx = AuthContext::provide(backend.clone());
    ctx.loaded().await;
    assert!(ctx.is_listening());
    assert_eq!(backend.auth_listener_count(), 1);

    ctx.release().await;
    assert_eq!(backend.auth_listener_count(), 0);
}

#[tokio::test]
async fn drop_drops_the_subscription() {
    let backend = memory();
    let ctx = AuthContext::provide(backend.clone());
    ctx.loaded().await;
    drop(ctx);

    for _ in 0..100 {
        if backend.auth_listener_count() == 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(backend.auth_listener_count(), 0);
}
