use std::sync::Arc;

use linkbio::auth::{AuthDispatcher, AuthForm};
use linkbio::backend::http::HttpBackend;
use linkbio::config::BackendConfig;
use linkbio::dashboard::Dashboard;
use linkbio::favicon::GoogleFavicons;
use linkbio::navigation::Route;
use linkbio::session::SessionManager;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = BackendConfig::from_env().expect("backend config");
    let logos = Arc::new(GoogleFavicons::new(config.favicon_size));
    let backend = Arc::new(HttpBackend::new(config).expect("http backend"));
    let refresher = backend.spawn_auto_refresh();

    let session = SessionManager::start(backend.clone()).await;

    // Optional non-interactive sign-in.
    let credentials = (std::env::var("LINKBIO_EMAIL"), std::env::var("LINKBIO_PASSWORD"));
    if let (false, (Ok(email), Ok(password))) = (session.is_authenticated(), credentials) {
        let mut form = AuthForm::new();
        form.email = email;
        form.password = password;
        if let Some(notice) = form.submit_and_wait(&AuthDispatcher::new(backend.clone())).await {
            tracing::info!(level = ?notice.level, %notice, "sign-in");
        }
    }

    let mut changes = session.watch();
    let mut dashboard: Option<Dashboard> = None;
    loop {
        match session.redirect_for(Route::Home) {
            Some(Route::Auth) => {
                if let Some(old) = dashboard.take() {
                    old.unmount();
                }
                tracing::info!(route = Route::Auth.path(), "signed out; waiting for a session");
            }
            _ if dashboard.is_none() => match Dashboard::mount(&session, backend.clone(), logos.clone()) {
                Ok(dash) => {
                    if let Some(notice) = dash.load().await {
                        tracing::warn!(%notice, "dashboard load");
                    }
                    if let Some(profile) = dash.profile_view() {
                        tracing::info!(name = %profile.full_name, bio = %profile.bio, "profile");
                    }
                    for link in dash.links() {
                        tracing::info!(link_id = %link.id, title = %link.title, url = %link.url, "link");
                    }
                    dashboard = Some(dash);
                }
                Err(e) => tracing::warn!(error = %e, "dashboard not mounted"),
            },
            _ => {}
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                // A different user invalidates the mounted dashboard.
                let owner = changes.borrow().session().map(linkbio::model::Session::user_id);
                if dashboard.as_ref().is_some_and(|d| Some(d.store().owner()) != owner) {
                    dashboard = None;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(dashboard);
    refresher.abort();
    session.shutdown().await;
    tracing::info!("linkbio stopped");
}
