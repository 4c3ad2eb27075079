//! Portal web session client
//!
//! Thin typed wrapper over a cookie-holding HTTP client: open a page, pick
//! the form on it, submit it with field values, follow a link. Failures
//! surface as [`PortalError`] and propagate into the event loop's error path
//! like any other task error.

use std::time::Duration;

use reqwest::{Client, Response, Url};
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::config::PortalConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from portal navigation
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("no form found on the page")]
    FormNotFound,

    #[error("login failed: the portal still shows the sign-in form")]
    LoginFailed,

    #[error("invalid portal URL: {0}")]
    Url(String),

    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("missing environment variable {0}")]
    MissingEnv(String),
}

/// A form scraped from a portal page: its action and its pre-filled fields
#[derive(Debug, Clone)]
pub struct Form {
    pub action: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl Form {
    /// Set a field value, replacing a scraped default of the same name
    pub fn set(&mut self, name: &str, value: &str) {
        if let Some(field) = self.fields.iter_mut().find(|(n, _)| n == name) {
            field.1 = value.to_string();
        } else {
            self.fields.push((name.to_string(), value.to_string()));
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }
}

/// Locate the first form on a page and capture its action and inputs.
///
/// The portal's pages carry a single form (the login form, or the booking
/// form once the application window opens), so first-form selection is the
/// whole protocol.
pub fn select_form(html: &str) -> Result<Form, PortalError> {
    let document = Html::parse_document(html);
    let form_selector = Selector::parse("form").expect("static selector");
    let input_selector = Selector::parse("input").expect("static selector");

    let form = document.select(&form_selector).next().ok_or(PortalError::FormNotFound)?;
    let action = form.value().attr("action").map(str::to_string);

    let mut fields = Vec::new();
    for input in form.select(&input_selector) {
        let Some(name) = input.value().attr("name") else {
            continue;
        };
        let value = input.value().attr("value").unwrap_or_default();
        fields.push((name.to_string(), value.to_string()));
    }

    Ok(Form { action, fields })
}

/// Whether a page still contains an input with the given name
pub fn page_has_input(html: &str, name: &str) -> bool {
    let document = Html::parse_document(html);
    let input_selector = Selector::parse("input").expect("static selector");
    document
        .select(&input_selector)
        .any(|input| input.value().attr("name") == Some(name))
}

/// Read the portal credentials from the environment variables named in the
/// config
pub fn credentials(config: &PortalConfig) -> Result<(String, String), PortalError> {
    let reg_no =
        std::env::var(&config.reg_no_env).map_err(|_| PortalError::MissingEnv(config.reg_no_env.clone()))?;
    let password =
        std::env::var(&config.password_env).map_err(|_| PortalError::MissingEnv(config.password_env.clone()))?;
    Ok((reg_no, password))
}

/// Cookie-holding session against one portal
pub struct PortalClient {
    http: Client,
    base_url: Url,
    click_delay: Duration,
}

impl PortalClient {
    /// Build a client for the configured portal
    pub fn new(config: &PortalConfig) -> Result<Self, PortalError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| PortalError::Url(format!("{}: {}", config.base_url, e)))?;

        let http = Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(PortalError::Client)?;

        Ok(Self {
            http,
            base_url,
            click_delay: config.click_delay(),
        })
    }

    fn resolve(&self, path: &str) -> Result<Url, PortalError> {
        self.base_url
            .join(path)
            .map_err(|e| PortalError::Url(format!("{}: {}", path, e)))
    }

    async fn read_body(&self, url: Url, response: Response) -> Result<String, PortalError> {
        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.text().await.map_err(|e| PortalError::Transport {
            url: url.to_string(),
            source: e,
        })
    }

    /// GET a portal path (absolute hrefs work too) and return the body
    pub async fn open(&self, path: &str) -> Result<String, PortalError> {
        let url = self.resolve(path)?;
        debug!(%url, "opening portal page");

        let response = self.http.get(url.clone()).send().await.map_err(|e| PortalError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        self.read_body(url, response).await
    }

    /// Pause, then open: the polite way to click through the portal
    pub async fn follow_link(&self, href: &str) -> Result<String, PortalError> {
        self.pause().await;
        self.open(href).await
    }

    /// POST a form's fields to its action URL and return the response body
    pub async fn submit_form(&self, form: &Form) -> Result<String, PortalError> {
        let action = form.action.as_deref().unwrap_or("");
        let url = self.resolve(action)?;
        debug!(%url, fields = form.fields.len(), "submitting form");

        let response = self
            .http
            .post(url.clone())
            .form(&form.fields)
            .send()
            .await
            .map_err(|e| PortalError::Transport {
                url: url.to_string(),
                source: e,
            })?;
        self.read_body(url, response).await
    }

    /// Log in: open the login page, fill its form with the credential
    /// fields, submit, and verify the portal let us through.
    pub async fn login(
        &self,
        login_path: &str,
        user_field: &str,
        pass_field: &str,
        username: &str,
        password: &str,
    ) -> Result<String, PortalError> {
        let html = self.open(login_path).await?;
        self.pause().await;

        let mut form = select_form(&html)?;
        form.set(user_field, username);
        form.set(pass_field, password);

        let response = self.submit_form(&form).await?;

        // A response that still asks for the password means we are not in
        if page_has_input(&response, pass_field) {
            return Err(PortalError::LoginFailed);
        }
        Ok(response)
    }

    /// Sleep the configured inter-click delay
    pub async fn pause(&self) {
        if !self.click_delay.is_zero() {
            tokio::time::sleep(self.click_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form action="/login.php" method="post">
            <input type="hidden" name="csrf" value="abc123">
            <input type="text" name="regNo">
            <input type="password" name="smisPass">
            <input type="submit" value="Sign in">
        </form>
        </body></html>
    "#;

    #[test]
    fn test_select_form_captures_action_and_fields() {
        let form = select_form(LOGIN_PAGE).unwrap();

        assert_eq!(form.action.as_deref(), Some("/login.php"));
        assert!(form.has_field("csrf"));
        assert!(form.has_field("regNo"));
        assert!(form.has_field("smisPass"));
        assert!(form.fields.contains(&("csrf".to_string(), "abc123".to_string())));
    }

    #[test]
    fn test_select_form_first_form_wins() {
        let html = r#"
            <form action="/first"><input name="a"></form>
            <form action="/second"><input name="b"></form>
        "#;
        let form = select_form(html).unwrap();
        assert_eq!(form.action.as_deref(), Some("/first"));
        assert!(form.has_field("a"));
        assert!(!form.has_field("b"));
    }

    #[test]
    fn test_select_form_missing_is_an_error() {
        let err = select_form("<html><body><p>Nothing here</p></body></html>").unwrap_err();
        assert!(matches!(err, PortalError::FormNotFound));
    }

    #[test]
    fn test_form_set_overrides_scraped_default() {
        let mut form = select_form(LOGIN_PAGE).unwrap();
        form.set("regNo", "X75/1234/2020");
        form.set("extra", "1");

        let reg = form.fields.iter().find(|(n, _)| n == "regNo").unwrap();
        assert_eq!(reg.1, "X75/1234/2020");
        assert!(form.has_field("extra"));
    }

    #[test]
    fn test_page_has_input() {
        assert!(page_has_input(LOGIN_PAGE, "smisPass"));
        assert!(!page_has_input(LOGIN_PAGE, "otp"));
        assert!(!page_has_input("<p>logged in</p>", "smisPass"));
    }

    #[test]
    fn test_client_rejects_bad_base_url() {
        let config = PortalConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(PortalClient::new(&config), Err(PortalError::Url(_))));
    }

    #[test]
    #[serial_test::serial]
    fn test_credentials_require_env() {
        let config = PortalConfig::default();
        // SAFETY: test runs serially; no other thread reads these vars
        unsafe {
            std::env::remove_var(&config.reg_no_env);
            std::env::remove_var(&config.password_env);
        }
        assert!(matches!(credentials(&config), Err(PortalError::MissingEnv(_))));

        unsafe {
            std::env::set_var(&config.reg_no_env, "X75/1234/2020");
            std::env::set_var(&config.password_env, "hunter2");
        }
        let (reg_no, password) = credentials(&config).unwrap();
        assert_eq!(reg_no, "X75/1234/2020");
        assert_eq!(password, "hunter2");

        unsafe {
            std::env::remove_var(&config.reg_no_env);
            std::env::remove_var(&config.password_env);
        }
    }
}
