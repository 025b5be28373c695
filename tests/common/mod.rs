#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use equipsync_lib::{
    error::{FetchError, RefreshError},
    refresh::PageSource,
    settings::{Credentials, PortalSettings, Settings, SettingsStore},
};
use wiremock::{
    matchers::{body_string_contains, header_regex, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const TABLE_ID: &str = "ctl00_main_Grid_DXMainTable";
pub const USERNAME: &str = "operator";
pub const PASSWORD: &str = "correct-horse";
pub const VIEWSTATE: &str = "vs-4f2a9c";

pub const HEADERS: [&str; 6] = [
    "Serial Number",
    "Category",
    "Equipment Group",
    "Type",
    "Next Calibration Date",
    "Instrument Currently Docked",
];

pub fn login_page() -> String {
    format!(
        r#"<html><body>
        <form method="post" action="./Login.aspx" id="form1">
          <input type="hidden" name="__VIEWSTATE" value="{VIEWSTATE}" />
          <input type="hidden" name="__EVENTVALIDATION" value="ev-1" />
          <input type="text" name="UserName" />
          <input type="password" name="Password" />
          <input type="submit" name="LoginButton" value="Log In" />
        </form>
        </body></html>"#
    )
}

pub fn grid_page(rows: &[[&str; 6]]) -> String {
    let headers: String = HEADERS
        .iter()
        .map(|h| {
            format!(
                r#"<td class="dxgvHeader_Moderno"><table><tr><td>{h}</td></tr></table></td>"#
            )
        })
        .collect();
    let body: String = rows
        .iter()
        .enumerate()
        .map(|(i, cells)| {
            let tds: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
            format!(r#"<tr id="{TABLE_ID}_DXDataRow{i}">{tds}</tr>"#)
        })
        .collect();
    format!(
        r#"<html><body><table id="{TABLE_ID}">
        <tr id="{TABLE_ID}_DXHeadersRow0">{headers}</tr>
        {body}
        </table></body></html>"#
    )
}

pub fn sample_grid() -> String {
    grid_page(&[
        ["XYZ789", "Instrument", "Unit-9", "Radius BZ1", "2099-01-01", ""],
        ["ABC123", "Instrument", "Unit-7", "Ventis MX4", "2001-01-01", ""],
        ["DS-1", "Docking Station", "", "DSX", "", " ABC123 "],
        ["DS-2", "Docking Station", "", "DSX", "", "NOPE"],
        ["BAT-1", "Accessory", "", "Battery", "", ""],
    ])
}

/// A fake portal: login form, cookie-gated dashboard pages and a redirect to
/// the login page for everything else.
pub async fn mount_portal(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/Login.aspx"))
        .respond_with(html(login_page()))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/Login.aspx"))
        .and(body_string_contains(format!("__VIEWSTATE={VIEWSTATE}")))
        .and(body_string_contains(format!("UserName={USERNAME}")))
        .and(body_string_contains(format!("Password={PASSWORD}")))
        .and(body_string_contains("LoginButton=Log+In"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/Dashboard/LandingPage.aspx")
                .insert_header("Set-Cookie", ".ASPXAUTH=token; path=/; HttpOnly"),
        )
        .with_priority(1)
        .mount(server)
        .await;

    // Wrong credentials: the portal re-renders the login page.
    Mock::given(method("POST"))
        .and(path("/Login.aspx"))
        .respond_with(html(login_page()))
        .mount(server)
        .await;

    for (page, body) in [
        ("/Dashboard/LandingPage.aspx", "<html><body>Welcome</body></html>".to_string()),
        ("/Dashboard/EquipmentList.aspx", sample_grid()),
    ] {
        Mock::given(method("GET"))
            .and(path(page))
            .and(header_regex("cookie", r"\.ASPXAUTH=token"))
            .respond_with(html(body))
            .with_priority(1)
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("/Login.aspx?ReturnUrl={page}").as_str()),
            )
            .mount(server)
            .await;
    }
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "text/html; charset=utf-8")
        .set_body_string(body)
}

pub fn portal_settings(server: &MockServer) -> PortalSettings {
    PortalSettings {
        login_url: format!("{}/Login.aspx", server.uri()),
        probe_url: format!("{}/Dashboard/LandingPage.aspx", server.uri()),
        data_url: format!("{}/Dashboard/EquipmentList.aspx", server.uri()),
        username_field: "UserName".into(),
        password_field: "Password".into(),
        submit_field: Some("LoginButton".into()),
        table_id: TABLE_ID.into(),
        timeout_secs: 5,
        ..PortalSettings::default()
    }
}

pub fn settings_for(server: &MockServer, dir: &Path, password: &str) -> Settings {
    Settings {
        portal: portal_settings(server),
        credentials: Credentials {
            username: USERNAME.into(),
            password: password.into(),
        },
        cookie_file: dir.join("cookies.json"),
        ..Settings::default()
    }
}

pub async fn count_requests(server: &MockServer, verb: &str, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .count()
}

/// Settings with credentials set, for pipelines driven by a fake source.
pub fn offline_settings(dir: &Path, with_credentials: bool) -> Arc<SettingsStore> {
    let mut settings = Settings {
        cookie_file: dir.join("cookies.json"),
        ..Settings::default()
    };
    settings.portal.table_id = TABLE_ID.into();
    if with_credentials {
        settings.credentials = Credentials {
            username: USERNAME.into(),
            password: PASSWORD.into(),
        };
    }
    Arc::new(SettingsStore::with_settings(dir.join("settings.json"), settings))
}

/// Serves a fixed page, optionally slowly, optionally failing.
pub struct FakeSource {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    page: String,
    delay: Duration,
}

impl FakeSource {
    pub fn new(page: String) -> Self {
        Self::slow(page, Duration::ZERO)
    }

    pub fn slow(page: String, delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            page,
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageSource for FakeSource {
    async fn fetch_page(&self, _settings: &Settings) -> Result<String, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Network {
                url: "https://portal.test/Dashboard/EquipmentList.aspx".into(),
                reason: "connection reset".into(),
            }
            .into());
        }
        Ok(self.page.clone())
    }
}
