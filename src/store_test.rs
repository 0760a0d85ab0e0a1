use super::*;
use crate::backend::fake::{FakeBackend, Op, link_row, session_for};
use crate::favicon::{GoogleFavicons, LookupFailure};

struct NoLogos;

#[async_trait::async_trait]
impl LogoLookup for NoLogos {
    async fn logo_for(&self, _url: &str) -> Result<String, LookupFailure> {
        Err(LookupFailure::Service("unreachable".into()))
    }
}

struct Fixture {
    backend: Arc<FakeBackend>,
    tx: watch::Sender<SessionState>,
    store: EntityStore,
    user_id: Uuid,
}

fn mounted() -> Fixture {
    mounted_with(Arc::new(GoogleFavicons::default()))
}

fn mounted_with(logos: Arc<dyn LogoLookup>) -> Fixture {
    let backend = FakeBackend::new();
    let user_id = Uuid::new_v4();
    let (tx, rx) = watch::channel(SessionState::Authenticated(session_for(user_id)));
    let store = EntityStore::mount(rx, backend.clone(), logos).unwrap();
    Fixture { backend, tx, store, user_id }
}

fn titles(links: &[Link]) -> Vec<&str> {
    links.iter().map(|l| l.title.as_str()).collect()
}

// =============================================================================
// mounting
// =============================================================================

#[test]
fn mount_requires_a_session() {
    let backend = FakeBackend::new();
    let (_tx, rx) = watch::channel(SessionState::Unauthenticated);
    let result = EntityStore::mount(rx, backend.clone(), Arc::new(NoLogos));
    assert!(matches!(result, Err(StoreError::Unauthenticated)));
    assert_eq!(backend.data_calls(), 0);
}

#[tokio::test]
async fn operations_after_sign_out_never_reach_backend() {
    let f = mounted();
    f.tx.send_replace(SessionState::Unauthenticated);

    assert_eq!(f.store.load_links().await, Err(StoreError::Stale));
    assert_eq!(f.store.create_link("A", "https://a.com").await, Err(StoreError::Stale));
    assert_eq!(f.backend.data_calls(), 0);
}

// =============================================================================
// loads
// =============================================================================

#[tokio::test]
async fn load_links_is_ordered_and_idempotent() {
    let f = mounted();
    f.backend.put_link(link_row(f.user_id, "second", "https://b.com", 20));
    f.backend.put_link(link_row(f.user_id, "first", "https://a.com", 10));
    f.backend.put_link(link_row(Uuid::new_v4(), "theirs", "https://c.com", 5));

    let first = f.store.load_links().await.unwrap();
    let second = f.store.load_links().await.unwrap();

    assert_eq!(titles(&first), ["first", "second"]);
    assert_eq!(first, second);
    assert_eq!(f.store.links(), first);
}

#[tokio::test]
async fn missing_profile_is_an_empty_state() {
    let f = mounted();
    assert_eq!(f.store.load_profile().await, Ok(None));
    assert_eq!(f.store.profile(), None);
}

#[tokio::test]
async fn load_profile_keeps_row() {
    let f = mounted();
    let profile = Profile { user_id: f.user_id, full_name: "A B".into(), bio: None, avatar_url: None };
    f.backend.put_profile(profile.clone());

    assert_eq!(f.store.load_profile().await, Ok(Some(profile.clone())));
    assert_eq!(f.store.profile(), Some(profile));
}

// =============================================================================
// create
// =============================================================================

#[tokio::test]
async fn created_links_append_in_order() {
    let f = mounted();
    f.store.create_link("A", "https://a.com").await.unwrap();
    f.store.create_link("B", "https://b.com").await.unwrap();

    let links = f.store.links();
    assert_eq!(titles(&links), ["A", "B"]);
    assert!(links.iter().all(|l| l.user_id == f.user_id));
    assert_eq!(
        links[0].logo_url.as_deref(),
        Some("https://www.google.com/s2/favicons?domain=a.com&sz=128")
    );
}

#[tokio::test]
async fn favicon_failure_stores_link_without_logo() {
    let f = mounted_with(Arc::new(NoLogos));
    let link = f.store.create_link("A", "https://a.com").await.unwrap();
    assert_eq!(link.logo_url, None);
    assert_eq!(f.store.links(), vec![link]);
}

#[tokio::test]
async fn failed_create_leaves_collection_untouched() {
    let f = mounted();
    f.store.create_link("A", "https://a.com").await.unwrap();
    f.backend.fail_next(Op::Insert, "duplicate key");

    let err = f.store.create_link("B", "https://b.com").await.unwrap_err();
    assert_eq!(err.to_string(), "duplicate key");
    assert_eq!(titles(&f.store.links()), ["A"]);
}

#[tokio::test]
async fn blank_fields_never_reach_backend() {
    let f = mounted();
    assert_eq!(f.store.create_link("  ", "https://a.com").await, Err(StoreError::BlankField));
    assert_eq!(f.store.create_link("A", "").await, Err(StoreError::BlankField));
    assert_eq!(f.backend.calls(Op::Insert), 0);
}

// =============================================================================
// update / delete
// =============================================================================

#[tokio::test]
async fn update_replaces_in_place() {
    let f = mounted();
    let a = f.store.create_link("A", "https://a.com").await.unwrap();
    f.store.create_link("B", "https://b.com").await.unwrap();

    f.store.update_link(a.id, "A2", "https://a2.com").await.unwrap();

    let links = f.store.links();
    assert_eq!(titles(&links), ["A2", "B"]);
    assert_eq!(links[0].url, "https://a2.com");
    assert_eq!(links[0].logo_url, a.logo_url, "logo is not re-derived");
    assert_eq!(links[0].created_at, a.created_at);
}

#[tokio::test]
async fn rejected_update_leaves_sequence_unchanged() {
    let f = mounted();
    let a = f.store.create_link("A", "https://a.com").await.unwrap();
    let before = f.store.links();

    f.backend.fail_next(Op::Update, "permission denied");
    let err = f.store.update_link(a.id, "A2", "https://a2.com").await.unwrap_err();

    assert!(matches!(err, StoreError::Data(_)));
    assert_eq!(f.store.links(), before);
}

#[tokio::test]
async fn update_unknown_id_is_a_precondition_error() {
    let f = mounted();
    f.store.create_link("A", "https://a.com").await.unwrap();
    let id = Uuid::new_v4();

    assert_eq!(f.store.update_link(id, "X", "https://x.com").await, Err(StoreError::UnknownLink(id)));
    assert_eq!(f.backend.calls(Op::Update), 0);
}

#[tokio::test]
async fn delete_removes_confirmed_link() {
    let f = mounted();
    let a = f.store.create_link("A", "https://a.com").await.unwrap();
    f.store.create_link("B", "https://b.com").await.unwrap();

    f.store.delete_link(a.id).await.unwrap();
    assert_eq!(titles(&f.store.links()), ["B"]);
    assert_eq!(f.store.load_links().await.unwrap(), f.store.links());
}

#[tokio::test]
async fn delete_unknown_id_leaves_sequence_unchanged() {
    let f = mounted();
    f.store.create_link("A", "https://a.com").await.unwrap();
    let before = f.store.links();
    let id = Uuid::new_v4();

    assert_eq!(f.store.delete_link(id).await, Err(StoreError::UnknownLink(id)));
    assert_eq!(f.store.links(), before);
    assert_eq!(f.backend.calls(Op::Delete), 0);
}

#[tokio::test]
async fn failed_delete_keeps_link() {
    let f = mounted();
    let a = f.store.create_link("A", "https://a.com").await.unwrap();
    f.backend.fail_next(Op::Delete, "timeout");

    assert!(f.store.delete_link(a.id).await.is_err());
    assert_eq!(f.store.links(), vec![a]);
}

// =============================================================================
// stale and detached results
// =============================================================================

#[tokio::test]
async fn result_after_sign_out_is_stale() {
    let f = mounted();
    f.backend.put_link(link_row(f.user_id, "A", "https://a.com", 10));
    f.backend.hold();

    let (result, ()) = tokio::join!(f.store.load_links(), async {
        tokio::task::yield_now().await;
        f.tx.send_replace(SessionState::Unauthenticated);
        f.backend.release();
    });

    assert_eq!(result, Err(StoreError::Stale));
    assert!(f.store.links().is_empty());
    assert_eq!(f.backend.calls(Op::FetchLinks), 1);
}

#[tokio::test]
async fn result_after_user_switch_is_stale() {
    let f = mounted();
    f.backend.hold();

    let (result, ()) = tokio::join!(f.store.create_link("A", "https://a.com"), async {
        tokio::task::yield_now().await;
        f.tx.send_replace(SessionState::Authenticated(session_for(Uuid::new_v4())));
        f.backend.release();
    });

    assert_eq!(result, Err(StoreError::Stale));
    assert!(f.store.links().is_empty());
}

#[tokio::test]
async fn token_refresh_in_flight_is_not_stale() {
    let f = mounted();
    f.backend.hold();

    let refreshed = Session { access_token: "rotated".into(), ..session_for(f.user_id) };
    let (result, ()) = tokio::join!(f.store.create_link("A", "https://a.com"), async {
        tokio::task::yield_now().await;
        f.tx.send_replace(SessionState::Authenticated(refreshed));
        f.backend.release();
    });

    assert!(result.is_ok());
    assert_eq!(titles(&f.store.links()), ["A"]);
}

#[tokio::test]
async fn result_after_unmount_is_detached() {
    let f = mounted();
    let a = f.store.create_link("A", "https://a.com").await.unwrap();
    f.backend.hold();

    let (result, ()) = tokio::join!(f.store.delete_link(a.id), async {
        tokio::task::yield_now().await;
        f.store.unmount();
        f.backend.release();
    });

    assert_eq!(result, Err(StoreError::Detached));
    assert!(result.unwrap_err().is_discarded());
    assert_eq!(f.store.links(), vec![a]);
    assert_eq!(f.store.load_links().await, Err(StoreError::Detached));
}
