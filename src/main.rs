use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use authcode_flow::{
    BoxError, ClientConfig, Credential, CredentialStore, FileStore, LocalServer,
    LocalServerLauncher, OAuth2Client, ReqwestTransport, build_authorize_url,
};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "authcode-flow",
    about = "Run an OAuth 2.0 authorization-code flow and print the resulting credential as JSON."
)]
struct Cli {
    #[command(flatten)]
    client: ClientArgs,

    /// Directory the last credential is stored in.
    #[arg(long, env = "AUTHCODE_STORE_DIR", default_value = ".authcode")]
    store_dir: PathBuf,

    /// Give up waiting for the browser after this many seconds.
    #[arg(long, env = "AUTHCODE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// JSON file holding a complete client configuration.
    #[arg(long, env = "AUTHCODE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "AUTHCODE_AUTHORIZE_URL")]
    authorize_url: Option<String>,

    #[arg(long, env = "AUTHCODE_TOKEN_URL")]
    token_url: Option<String>,

    #[arg(long, env = "AUTHCODE_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "AUTHCODE_CLIENT_SECRET", default_value = "")]
    client_secret: String,

    #[arg(long, env = "AUTHCODE_REDIRECT_URI")]
    redirect_uri: Option<String>,

    #[arg(long = "scope", env = "AUTHCODE_SCOPES", value_delimiter = ',')]
    scopes: Vec<String>,

    #[arg(long, env = "AUTHCODE_CALLBACK_SCHEME")]
    callback_scheme: Option<String>,

    #[arg(long, env = "AUTHCODE_PKCE")]
    pkce: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the authorization URL without starting a flow.
    AuthorizeUrl,
    /// Sign in through the system browser and store the credential.
    SignIn,
    /// Same as sign-in; the browser session cannot be cleared from here.
    SignOut,
    /// Exchange a refresh token for a new credential.
    Refresh {
        /// Defaults to the refresh token of the stored credential.
        #[arg(long)]
        refresh_token: Option<String>,
    },
    /// Print the stored credential.
    Show,
    /// Delete the stored credential.
    Forget,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = CredentialStore::new(Arc::new(FileStore::new(&cli.store_dir)));

    match &cli.command {
        Command::AuthorizeUrl => {
            let config = cli.client.resolve()?;
            println!("{}", build_authorize_url(&config, None)?);
        }
        Command::SignIn => sign_in(&cli, &store, false).await?,
        Command::SignOut => sign_in(&cli, &store, true).await?,
        Command::Refresh { refresh_token } => {
            let config = cli.client.resolve()?;
            let refresh_token = match refresh_token {
                Some(token) => token.clone(),
                None => store
                    .load()?
                    .and_then(|credential| credential.refresh_token)
                    .ok_or("no refresh token given and none stored")?,
            };
            let client = build_client(&config, store.clone(), cli.timeout_secs)?;
            let credential = client.refresh(&config, refresh_token).await?;
            print_credential(&credential)?;
        }
        Command::Show => match store.load()? {
            Some(credential) => print_credential(&credential)?,
            None => eprintln!("No credential stored in {}", cli.store_dir.display()),
        },
        Command::Forget => {
            store.remove()?;
            info!(dir = %cli.store_dir.display(), "stored credential removed");
        }
    }

    Ok(())
}

impl ClientArgs {
    fn resolve(&self) -> Result<ClientConfig, BoxError> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_slice::<ClientConfig>(&fs::read(path)?)?,
            None => ClientConfig::new(
                required(&self.authorize_url, "--authorize-url")?,
                required(&self.token_url, "--token-url")?,
                required(&self.client_id, "--client-id")?,
                self.client_secret.clone(),
                required(&self.redirect_uri, "--redirect-uri")?,
            ),
        };

        config = config.with_scopes(self.scopes.iter().cloned());
        if let Some(scheme) = &self.callback_scheme {
            config = config.with_callback_scheme(scheme.clone());
        }
        if self.pkce {
            config = config.with_pkce(true);
        }
        Ok(config)
    }
}

/// Sign-in does not persist on its own; the CLI keeps the result so `refresh`
/// and `show` can find it.
async fn sign_in(cli: &Cli, store: &CredentialStore, sign_out: bool) -> Result<(), BoxError> {
    let config = cli.client.resolve()?;
    let client = build_client(&config, store.clone(), cli.timeout_secs)?;
    let credential = if sign_out {
        client.sign_out(&config).await?
    } else {
        client.sign_in(&config).await?
    };
    store.save(&credential)?;
    print_credential(&credential)
}

fn required(value: &Option<String>, flag: &str) -> Result<String, BoxError> {
    value
        .clone()
        .ok_or_else(|| format!("{flag} is required when --config is not given").into())
}

fn build_client(
    config: &ClientConfig,
    store: CredentialStore,
    timeout_secs: Option<u64>,
) -> Result<OAuth2Client, BoxError> {
    let mut server = LocalServer::from_redirect_uri(&config.redirect_uri)?;
    if let Some(secs) = timeout_secs {
        server = server.with_timeout(Duration::from_secs(secs));
    }

    let launcher = LocalServerLauncher::new(server, |url| {
        eprintln!("Authorization URL:\n{url}");
        if let Err(err) = webbrowser::open(url.as_str()) {
            eprintln!("Failed to open browser automatically: {err}");
        }
        Ok(())
    });
    let transport = ReqwestTransport::new(Some(Duration::from_secs(30)))?;

    Ok(OAuth2Client::new(Arc::new(launcher), Arc::new(transport)).with_credential_store(store))
}

fn print_credential(credential: &Credential) -> Result<(), BoxError> {
    let output = String::from_utf8(credential.encode()?)?;
    println!("{output}");
    Ok(())
}
