//! Command parsing and execution for the sessionrelay CLI.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::warn;

use sessionrelay_core::auth::CredentialStore;
use sessionrelay_core::{ApiClient, ApiError, ApiRequest, Config, SessionEvent};

pub const USAGE: &str = "\
Usage: sessionrelay <command>

Commands:
  login [EMAIL] [--remember]          Sign in (password read from SESSIONRELAY_PASSWORD or prompted)
  logout                              Forget the stored session and remembered password
  status                              Show the signed-in user
  get <PATH> [--timeout SECS]         GET a protected path and print the body
  post <PATH> <JSON> [--timeout SECS] POST a JSON body to a protected path
  help                                Show this message";

const ENV_EMAIL: &str = "SESSIONRELAY_EMAIL";
const ENV_PASSWORD: &str = "SESSIONRELAY_PASSWORD";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login { email: Option<String>, remember: bool },
    Logout,
    Status,
    Get { path: String, timeout: Option<Duration> },
    Post { path: String, body: serde_json::Value, timeout: Option<Duration> },
    Help,
}

/// How a command finished
pub enum Outcome {
    Done,
    SessionEnded,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Command::Help);
        };

        let mut positional = Vec::new();
        let mut remember = false;
        let mut timeout = None;
        let mut iter = rest.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--remember" => remember = true,
                "--timeout" => {
                    let secs: u64 = iter
                        .next()
                        .ok_or_else(|| anyhow!("--timeout needs a value"))?
                        .parse()
                        .context("--timeout must be a whole number of seconds")?;
                    timeout = Some(Duration::from_secs(secs));
                }
                flag if flag.starts_with("--") => bail!("unknown option {}", flag),
                _ => positional.push(arg.clone()),
            }
        }

        let command = match (name.as_str(), positional.as_slice()) {
            ("login", []) => Command::Login { email: None, remember },
            ("login", [email]) => Command::Login { email: Some(email.clone()), remember },
            ("logout", []) => Command::Logout,
            ("status", []) => Command::Status,
            ("get", [path]) => Command::Get { path: path.clone(), timeout },
            ("post", [path, body]) => Command::Post {
                path: path.clone(),
                body: serde_json::from_str(body).context("request body must be valid JSON")?,
                timeout,
            },
            ("help" | "--help" | "-h", _) => Command::Help,
            (other, _) => bail!("unrecognized command or arguments: {}", other),
        };
        Ok(command)
    }
}

pub async fn execute(command: Command, client: &ApiClient, config: &mut Config) -> Result<Outcome> {
    match command {
        Command::Login { email, remember } => login(client, config, email, remember).await,
        Command::Logout => logout(client, config).await,
        Command::Status => {
            status(client);
            Ok(Outcome::Done)
        }
        Command::Get { path, timeout } => call(client, with_timeout(ApiRequest::get(path), timeout)).await,
        Command::Post { path, body, timeout } => {
            let request = ApiRequest::post(path).json(&body)?;
            call(client, with_timeout(request, timeout)).await
        }
        Command::Help => Ok(Outcome::Done),
    }
}

fn with_timeout(request: ApiRequest, timeout: Option<Duration>) -> ApiRequest {
    match timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    }
}

async fn login(client: &ApiClient, config: &mut Config, email: Option<String>, remember: bool) -> Result<Outcome> {
    let email = match email
        .or_else(|| std::env::var(ENV_EMAIL).ok())
        .or_else(|| config.last_email.clone())
    {
        Some(email) => email,
        None => prompt_email()?,
    };

    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) => password,
        Err(_) if CredentialStore::has_credentials(&email) => {
            print!("Use stored password? [Y/n]: ");
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if input.trim().to_lowercase() != "n" {
                CredentialStore::get_password(&email)?
            } else {
                prompt_password()?
            }
        }
        Err(_) => prompt_password()?,
    };

    let session = match client.login(&email, &password).await {
        Ok(session) => session,
        Err(ApiError::Unauthorized) => bail!("Invalid email or password"),
        Err(e) => return Err(e).context("Login failed"),
    };

    if remember {
        if let Err(e) = CredentialStore::store(&email, &password) {
            warn!(error = %e, "Failed to store credentials");
        }
    }

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as {} <{}> ({})", session.display_name, session.email, session.role.display_name());
    Ok(Outcome::Done)
}

async fn logout(client: &ApiClient, config: &Config) -> Result<Outcome> {
    client.logout().await.context("Logout failed")?;

    if let Some(ref email) = config.last_email {
        if let Err(e) = CredentialStore::delete(email) {
            warn!(error = %e, "Failed to delete stored credentials");
        }
    }

    println!("Signed out");
    Ok(Outcome::Done)
}

fn status(client: &ApiClient) {
    match client.current_session() {
        Some(session) => println!(
            "Signed in as {} <{}>\nRole: {}\nUser ID: {}",
            session.display_name,
            session.email,
            session.role.display_name(),
            session.user_id
        ),
        None => println!("Not signed in"),
    }
}

async fn call(client: &ApiClient, request: ApiRequest) -> Result<Outcome> {
    let mut events = client.subscribe();

    let response = match client.send(request).await {
        Ok(response) => response,
        Err(e) if e.is_session_ended() => {
            let redirect = std::iter::from_fn(|| events.try_recv().ok()).find_map(|event| match event {
                SessionEvent::Ended { redirect_to, .. } => Some(redirect_to),
                _ => None,
            });
            eprintln!("Session ended: {}", e);
            if let Some(redirect) = redirect {
                eprintln!("Sign in again ({}): sessionrelay login", redirect);
            }
            return Ok(Outcome::SessionEnded);
        }
        Err(e) => return Err(e).context("Request failed"),
    };

    let status = response.status();
    let body = response.text().await.context("Failed to read response body")?;
    eprintln!("{}", status);
    println!("{}", pretty_body(&body));

    if status.is_success() {
        Ok(Outcome::Done)
    } else {
        Err(anyhow!("Server answered {}", status))
    }
}

/// Pretty-print JSON bodies, pass anything else through
fn pretty_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_string())
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    let email = email.trim().to_string();
    if email.is_empty() {
        bail!("Email required");
    }
    Ok(email)
}

fn prompt_password() -> Result<String> {
    let password = rpassword::prompt_password("Password: ")?;
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            Command::parse(&args(&["login", "a@b.com", "--remember"])).unwrap(),
            Command::Login { email: Some("a@b.com".to_string()), remember: true }
        );
        assert_eq!(
            Command::parse(&args(&["login"])).unwrap(),
            Command::Login { email: None, remember: false }
        );
    }

    #[test]
    fn test_parse_requests() {
        assert_eq!(
            Command::parse(&args(&["get", "/chat/history", "--timeout", "30"])).unwrap(),
            Command::Get { path: "/chat/history".to_string(), timeout: Some(Duration::from_secs(30)) }
        );
        assert_eq!(
            Command::parse(&args(&["post", "/items", r#"{"name":"x"}"#])).unwrap(),
            Command::Post {
                path: "/items".to_string(),
                body: serde_json::json!({ "name": "x" }),
                timeout: None,
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse(&args(&["get"])).is_err());
        assert!(Command::parse(&args(&["get", "/x", "--timeout"])).is_err());
        assert!(Command::parse(&args(&["get", "/x", "--timeout", "soon"])).is_err());
        assert!(Command::parse(&args(&["post", "/x", "{not json"])).is_err());
        assert!(Command::parse(&args(&["frobnicate"])).is_err());
        assert!(Command::parse(&args(&["status", "--verbose"])).is_err());
    }

    #[test]
    fn test_parse_help() {
        assert_eq!(Command::parse(&[]).unwrap(), Command::Help);
        assert_eq!(Command::parse(&args(&["--help"])).unwrap(), Command::Help);
    }

    #[test]
    fn test_pretty_body() {
        assert_eq!(pretty_body(r#"{"a":1}"#), "{\n  \"a\": 1\n}");
        assert_eq!(pretty_body("plain text"), "plain text");
    }
}
