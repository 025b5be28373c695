mod common;

use std::time::Duration;

use common::*;
use equipsync_lib::{
    error::{FetchError, LoginError},
    session::{AuthHeuristic, LoginRequest, SessionManager},
    settings::{Credentials, PortalSettings},
};
use tempfile::tempdir;
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn request(server: &MockServer, password: &str) -> LoginRequest {
    let credentials = Credentials {
        username: USERNAME.into(),
        password: password.into(),
    };
    LoginRequest::from_settings(&portal_settings(server), &credentials)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_echoes_hidden_fields_and_persists_cookies() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let dir = tempdir().unwrap();
    let cookie_file = dir.path().join("cookies.json");

    let mut session = SessionManager::new(&portal_settings(&server), &cookie_file).unwrap();
    assert!(!session.probe_authenticated().await.unwrap());

    session.login(&request(&server, PASSWORD)).await.unwrap();
    assert!(session.is_authenticated());
    assert!(session.probe_authenticated().await.unwrap());

    let saved = std::fs::read_to_string(&cookie_file).unwrap();
    assert!(saved.contains(".ASPXAUTH"));
    assert_eq!(count_requests(&server, "POST", "/Login.aspx").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_login_persists_nothing_and_fetch_retries_login() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let dir = tempdir().unwrap();
    let cookie_file = dir.path().join("cookies.json");

    let mut session = SessionManager::new(&portal_settings(&server), &cookie_file).unwrap();
    let err = session
        .login(&request(&server, "wrong-password"))
        .await
        .unwrap_err();
    assert!(matches!(err, LoginError::RejectedCredentials { .. }), "{err:?}");
    assert!(!session.is_authenticated());
    assert!(!cookie_file.exists());

    let data_url = portal_settings(&server).data_url;
    let err = session.fetch_authenticated(&data_url).await.unwrap_err();
    assert!(matches!(err, FetchError::AuthRequired(_)), "{err:?}");
    assert_eq!(count_requests(&server, "POST", "/Login.aspx").await, 2);
    assert_eq!(count_requests(&server, "GET", "/Dashboard/EquipmentList.aspx").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn persisted_cookies_authenticate_a_fresh_session() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let dir = tempdir().unwrap();
    let cookie_file = dir.path().join("cookies.json");

    {
        let mut first = SessionManager::new(&portal_settings(&server), &cookie_file).unwrap();
        first.login(&request(&server, PASSWORD)).await.unwrap();
        first.close().unwrap();
    }

    let mut second = SessionManager::new(&portal_settings(&server), &cookie_file).unwrap();
    assert!(second.probe_authenticated().await.unwrap());

    let html = second
        .fetch_authenticated(&portal_settings(&server).data_url)
        .await
        .unwrap();
    assert!(html.contains(TABLE_ID));
    assert_eq!(count_requests(&server, "POST", "/Login.aspx").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_logs_in_when_the_session_has_lapsed() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let dir = tempdir().unwrap();

    let mut session =
        SessionManager::new(&portal_settings(&server), dir.path().join("cookies.json")).unwrap();
    session.set_credentials(Some(request(&server, PASSWORD)));

    let html = session
        .fetch_authenticated(&portal_settings(&server).data_url)
        .await
        .unwrap();
    assert!(html.contains("ABC123"));
    assert_eq!(count_requests(&server, "POST", "/Login.aspx").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_without_credentials_requires_auth() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let dir = tempdir().unwrap();

    let mut session =
        SessionManager::new(&portal_settings(&server), dir.path().join("cookies.json")).unwrap();
    let err = session
        .fetch_authenticated(&portal_settings(&server).data_url)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::AuthRequired(_)), "{err:?}");
    assert_eq!(count_requests(&server, "POST", "/Login.aspx").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_portal_is_a_network_error() {
    // Grab a free port and release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let portal = PortalSettings {
        login_url: format!("{base}/Login.aspx"),
        probe_url: format!("{base}/Dashboard/LandingPage.aspx"),
        data_url: format!("{base}/Dashboard/EquipmentList.aspx"),
        timeout_secs: 2,
        ..PortalSettings::default()
    };
    let dir = tempdir().unwrap();

    let mut session = SessionManager::new(&portal, dir.path().join("cookies.json")).unwrap();
    assert!(session.probe_authenticated().await.is_err());

    let err = session.fetch_authenticated(&portal.data_url).await.unwrap_err();
    assert!(
        matches!(err, FetchError::Network { .. } | FetchError::Timeout { .. }),
        "{err:?}"
    );
}

fn redirect(to: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("Location", to)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_landing_on_a_server_error_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Login.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_page()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Login.aspx"))
        .respond_with(
            redirect("/Error.aspx").insert_header("Set-Cookie", ".ASPXAUTH=token; path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Error.aspx"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    let cookie_file = dir.path().join("cookies.json");

    let mut session = SessionManager::new(&portal_settings(&server), &cookie_file).unwrap();
    let err = session
        .login(&request(&server, PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, LoginError::FetchFailed { .. }), "{err:?}");
    assert!(!session.is_authenticated());
    assert!(!cookie_file.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_data_page_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Dashboard/LandingPage.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Welcome"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Dashboard/EquipmentList.aspx"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sample_grid())
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&server)
        .await;
    let portal = PortalSettings {
        timeout_secs: 1,
        ..portal_settings(&server)
    };
    let dir = tempdir().unwrap();

    let mut session = SessionManager::new(&portal, dir.path().join("cookies.json")).unwrap();
    let err = session.fetch_authenticated(&portal.data_url).await.unwrap_err();
    assert!(
        matches!(&err, FetchError::Timeout { url } if *url == portal.data_url),
        "{err:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_relogin_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Dashboard/LandingPage.aspx"))
        .respond_with(redirect("/Account/login-required"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Account/login-required"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Please sign in"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Login.aspx"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(login_page())
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&server)
        .await;
    let portal = PortalSettings {
        timeout_secs: 1,
        ..portal_settings(&server)
    };
    let dir = tempdir().unwrap();

    let mut session = SessionManager::new(&portal, dir.path().join("cookies.json")).unwrap();
    session.set_credentials(Some(request(&server, PASSWORD)));
    let err = session.fetch_authenticated(&portal.data_url).await.unwrap_err();
    assert!(
        matches!(&err, FetchError::Timeout { url } if *url == portal.login_url),
        "{err:?}"
    );
    assert_eq!(count_requests(&server, "GET", "/Dashboard/EquipmentList.aspx").await, 0);
}

/// Recognises a portal that bounces expired sessions to a sign-in page.
struct SignInPage;

impl AuthHeuristic for SignInPage {
    fn is_login_challenge(&self, final_url: &Url) -> bool {
        final_url.path().eq_ignore_ascii_case("/account/signin")
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn custom_heuristic_decides_what_a_login_challenge_is() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Dashboard/LandingPage.aspx"))
        .respond_with(redirect("/Account/SignIn"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Account/SignIn"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Sign in"))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    let portal = PortalSettings {
        login_marker: String::new(),
        ..portal_settings(&server)
    };

    let mut default = SessionManager::new(&portal, dir.path().join("a.json")).unwrap();
    assert!(default.probe_authenticated().await.unwrap());

    let mut custom = SessionManager::new(&portal, dir.path().join("b.json"))
        .unwrap()
        .with_heuristic(Box::new(SignInPage));
    assert!(!custom.probe_authenticated().await.unwrap());
    assert!(!custom.is_authenticated());
}
