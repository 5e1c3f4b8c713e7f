//! The back-office router served against a [`FakeRecordStore`].

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use rbl_admin::config::{AdminConfig, EmailConfig, ReminderConfig};
use rbl_admin::middleware::create_session_layer;
use rbl_admin::routes;
use rbl_admin::state::AppState;
use secrecy::SecretString;

use crate::FakeRecordStore;

/// Year pinned for business ids in tests.
pub const TEST_YEAR: i32 = 2025;

pub struct TestApp {
    pub store: FakeRecordStore,
    pub client: reqwest::Client,
    base_url: String,
}

fn test_config(store: &FakeRecordStore) -> AdminConfig {
    AdminConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: "http://127.0.0.1".to_string(),
        session_secret: SecretString::from("k3Jd9sLq0Zx7Vb2Nm4Hg6Tr8Yw1Pe5Ua"),
        store: store.config(),
        email: EmailConfig {
            smtp_host: "127.0.0.1".to_string(),
            smtp_port: 2525,
            smtp_username: "mailer".to_string(),
            smtp_password: SecretString::from("mailer-pass"),
            from_address: "reminders@rblsourcing.com".to_string(),
            timeout: Duration::from_secs(5),
        },
        reminders: ReminderConfig::default(),
        current_year: Some(TEST_YEAR),
        log_json: false,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

impl TestApp {
    /// Start a fake store and the back office in front of it.
    ///
    /// # Panics
    ///
    /// Panics if a server cannot start or the store login fails.
    pub async fn start() -> Self {
        let store = FakeRecordStore::start().await;
        let config = test_config(&store);
        let store_client = store.client();
        store_client
            .authenticate()
            .await
            .expect("Failed to authenticate with fake store");

        let session_layer = create_session_layer(&config);
        let app = routes::routes()
            .layer(session_layer)
            .with_state(AppState::new(config, store_client));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind back office");
        let addr = listener.local_addr().expect("Failed to read local address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            store,
            client,
            base_url: format!("http://{addr}"),
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Log in through `/auth/login`, keeping the session cookie.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .form(&[("email", email), ("password", password)])
            .send()
            .await
            .expect("Failed to send login")
    }

    /// Add a staff user with `role` and log in as them.
    ///
    /// # Panics
    ///
    /// Panics if the login is rejected.
    pub async fn login_as(&self, role: &str) {
        let email = format!("{role}@rblsourcing.com");
        self.store.add_staff(&email, "staff-password", role);
        let response = self.login(&email, "staff-password").await;
        assert!(response.status().is_success(), "login failed: {}", response.status());
    }
}
