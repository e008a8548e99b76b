use std::future::IntoFuture;
use std::sync::LazyLock;

use service_probe::configuration::{get_configuration, ProbeSettings};
use service_probe::probe::{BodyCheck, ProbeClient, ProbeRequest, ProbeTarget};
use service_probe::{get_subscriber, init_subscriber, startup};
use url::Url;

static INIT_SUBSCRIBER: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        init_subscriber(get_subscriber(
            "test".into(),
            "debug".into(),
            std::io::stdout,
        ));
    } else {
        init_subscriber(get_subscriber("test".into(), "debug".into(), std::io::sink));
    }
});

/// Headers a desktop browser sends on navigation, ending with `Connection: close`.
const BROWSER_HEADERS: &[&str] = &[
    r#"sec-ch-ua: "Chromium";v="91", " Not;A Brand";v="99""#,
    "sec-ch-ua-mobile: ?0",
    "Upgrade-Insecure-Requests: 1",
    "User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36",
    "Accept: text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9",
    "Sec-Fetch-Site: none",
    "Sec-Fetch-Mode: navigate",
    "Sec-Fetch-User: ?1",
    "Sec-Fetch-Dest: document",
    "Accept-Encoding: gzip, deflate",
    "Accept-Language: en-GB,en-US;q=0.9,en;q=0.8",
    "Connection: close",
];

pub struct TestApp {
    pub base_url: Url,
    pub probe_settings: ProbeSettings,
}

impl TestApp {
    pub fn init_subscriber() {
        LazyLock::force(&INIT_SUBSCRIBER);
    }

    /// Starts the service on a random port, unless `APP_PROBE__BASE_URL`
    /// points at a deployment that is already running.
    pub async fn spawn() -> TestApp {
        Self::init_subscriber();
        let configuration = get_configuration().expect("Failed to read configuration");
        let probe_settings = configuration.probe.clone();

        if let Some(base_url) = &probe_settings.base_url {
            let base_url = Url::parse(base_url).expect("Failed to parse the probe base URL");
            return TestApp {
                base_url,
                probe_settings,
            };
        }

        let listener = tokio::net::TcpListener::bind(format!("{}:0", configuration.application.host))
            .await
            .expect("Failed to bind a random port");
        let port = listener.local_addr().unwrap().port();
        let app = startup::router(startup::build(&configuration));
        tokio::spawn(axum::serve(listener, app).into_future());

        TestApp {
            base_url: Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap(),
            probe_settings,
        }
    }

    pub fn target(&self) -> ProbeTarget {
        ProbeTarget::from_url(&self.base_url).expect("Base URL has no usable host and port")
    }

    pub fn probe(&self, body_check: BodyCheck) -> ProbeClient {
        self.probe_with(self.probe_settings.clone(), body_check)
    }

    pub fn probe_with(&self, settings: ProbeSettings, body_check: BodyCheck) -> ProbeClient {
        let mut client = ProbeClient::new(settings, body_check);
        client
            .configure_target(self.target())
            .expect("Failed to configure the probe");
        client
    }

    /// The request line, a `Host` header for this app and the browser headers,
    /// followed by `tail` verbatim.
    pub fn browser_request(&self, request_line: &str, tail: &[&str]) -> ProbeRequest {
        let mut lines = vec![
            request_line.to_string(),
            format!("Host: {}", self.target().address()),
        ];
        lines.extend(BROWSER_HEADERS.iter().map(|header| header.to_string()));
        lines.extend(tail.iter().map(|line| line.to_string()));
        ProbeRequest::from_lines(lines)
    }
}
