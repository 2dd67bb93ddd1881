#![cfg(feature = "local-server")]

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authcode_flow::{
    BoxError, ClientConfig, Credential, HttpRequest, HttpResponse, HttpTransport, LocalServer,
    LocalServerLauncher, OAuth2Client, UserAgentLauncher,
};
use url::Url;

/// Loopback redirect URI on a port the OS just handed out.
fn loopback_redirect(path: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    format!("http://127.0.0.1:{port}{path}")
}

/// Plays the browser: follows the authorization step straight to the
/// loopback redirect with the given query.
fn redirecting_opener(
    redirect_uri: String,
    query: &'static str,
) -> impl Fn(&Url) -> Result<(), BoxError> + Send + Sync + 'static {
    move |_authorize_url| {
        let callback = format!("{redirect_uri}?{query}");
        tokio::spawn(async move {
            let _ = reqwest::get(callback).await;
        });
        Ok(())
    }
}

fn launcher(redirect_uri: &str, query: &'static str) -> LocalServerLauncher {
    let server = LocalServer::from_redirect_uri(redirect_uri)
        .unwrap()
        .with_timeout(Duration::from_secs(5));
    LocalServerLauncher::new(server, redirecting_opener(redirect_uri.to_string(), query))
}

struct FixedTransport;

#[async_trait]
impl HttpTransport for FixedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BoxError> {
        assert!(request.body.contains("code=loopback-code"));
        Ok(HttpResponse::new(
            200,
            r#"{"access_token":"at","token_type":"Bearer"}"#,
        ))
    }
}

#[tokio::test]
async fn launcher_returns_loopback_redirect() {
    let redirect_uri = loopback_redirect("/callback");
    let launcher = launcher(&redirect_uri, "code=abc&state=s");

    let authorize = Url::parse("https://idp/authorize").unwrap();
    let redirect = launcher.launch(&authorize, "http").await.unwrap();

    assert_eq!(redirect.as_str(), format!("{redirect_uri}?code=abc&state=s"));
}

#[tokio::test]
async fn launcher_rejects_foreign_callback_scheme() {
    let launcher = LocalServerLauncher::new(
        LocalServer::from_redirect_uri(&loopback_redirect("/callback")).unwrap(),
        |_| Ok(()),
    );

    let authorize = Url::parse("https://idp/authorize").unwrap();
    let err = launcher.launch(&authorize, "myapp").await.unwrap_err();

    assert!(err.to_string().contains("myapp"));
}

#[tokio::test]
async fn sign_in_through_loopback_server() {
    let redirect_uri = loopback_redirect("/cb");
    let client = OAuth2Client::new(
        Arc::new(launcher(&redirect_uri, "code=loopback-code")),
        Arc::new(FixedTransport),
    );
    let config = ClientConfig::new(
        "https://idp/authorize",
        "https://idp/token",
        "abc",
        "shh",
        redirect_uri,
    );

    let credential = client.sign_in(&config).await.unwrap();

    assert_eq!(credential, Credential::new("at", "Bearer"));
}
