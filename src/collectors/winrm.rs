//! WinRM (WS-Management) transport for running PowerShell on a remote host.
//!
//! The authentication scheme follows the user name: `DOMAIN\user` selects
//! NTLM, anything else HTTP Basic. Only Basic is implemented; domain accounts
//! are refused before any request is sent. A script runs in its own shell:
//! Create → Command → Receive (until done) → Signal → Delete.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::CollectionError;

pub const DEFAULT_WINRM_HOST: &str = "host.docker.internal";
pub const DEFAULT_WINRM_PORT: u16 = 5985;
pub const DEFAULT_WINRM_TIMEOUT_SECS: u64 = 60;

const NS_ENVELOPE: &str = "http://www.w3.org/2003/05/soap-envelope";
const NS_ADDRESSING: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
const NS_WSMAN: &str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
const NS_SHELL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell";
const NS_IDENTITY: &str = "http://schemas.dmtf.org/wbem/wsman/identity/1/wsmanidentity.xsd";
const RESOURCE_CMD: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";
const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
const ACTION_COMMAND: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
const ACTION_RECEIVE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
const ACTION_SIGNAL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal";
const SIGNAL_TERMINATE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";
const STATE_DONE: &str = "CommandState/Done";
/// WS-Man fault code for a Receive that timed out without output.
const FAULT_OPERATION_TIMEOUT: &str = "2150858793";

static SHELL_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(?:\w+:)?Selector Name="ShellId">([^<]+)</"#).expect("valid regex")
});
static COMMAND_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:\w+:)?CommandId>([^<]+)</").expect("valid regex"));
static STREAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(?:\w+:)?Stream\b[^>]*\bName="(stdout|stderr)"[^>]*?(?:/>|>([^<]*)</(?:\w+:)?Stream>)"#)
        .expect("valid regex")
});
static STATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(?:\w+:)?CommandState\b[^>]*\bState="([^"]+)""#).expect("valid regex")
});
static EXIT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:\w+:)?ExitCode>(-?\d+)</").expect("valid regex"));
static CLIXML_ERROR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<S S="Error">([^<]*)</S>"#).expect("valid regex"));

/// Connection parameters for a remote host.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_ssl: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_WINRM_TIMEOUT_SECS
}

impl std::fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Authentication scheme a WinRM listener expects for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Local account (`user`).
    Basic,
    /// Domain account (`DOMAIN\user`).
    Ntlm,
}

impl AuthScheme {
    pub fn for_username(username: &str) -> Self {
        if username.contains('\\') {
            AuthScheme::Ntlm
        } else {
            AuthScheme::Basic
        }
    }
}

impl RemoteSettings {
    pub fn auth_scheme(&self) -> AuthScheme {
        AuthScheme::for_username(&self.username)
    }

    /// WS-Management endpoint URL.
    pub fn endpoint(&self) -> String {
        format!(
            "http{}://{}:{}/wsman",
            if self.use_ssl { "s" } else { "" },
            self.host,
            self.port
        )
    }
}

/// Failure to establish a remote session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("username and password required")]
    MissingCredentials,

    #[error("WinRM host is empty")]
    MissingHost,

    #[error("WinRM transport error: {0}")]
    Transport(String),

    #[error("WinRM handshake rejected: {0}")]
    Rejected(String),

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("NTLM authentication for domain account '{0}' is not supported, use a local account (Basic authentication)")]
    UnsupportedAuth(String),
}

/// Opaque request/response channel that runs PowerShell remotely.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Runs a script and returns its stdout; non-zero exit is an error.
    async fn run_powershell(&self, script: &str) -> Result<String, CollectionError>;
}

/// Authenticated WinRM session.
pub struct WinRmSession {
    client: HttpClient,
    endpoint: String,
    username: String,
    password: String,
    operation_timeout_secs: u64,
}

struct CommandOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i64,
}

impl WinRmSession {
    /// Builds a session and verifies it with a WS-Management Identify request.
    #[instrument(skip(settings), fields(host = %settings.host, port = settings.port))]
    pub async fn connect(settings: &RemoteSettings) -> Result<Self, SessionError> {
        if settings.username.trim().is_empty() || settings.password.is_empty() {
            return Err(SessionError::MissingCredentials);
        }
        if settings.host.trim().is_empty() {
            return Err(SessionError::MissingHost);
        }
        if settings.auth_scheme() == AuthScheme::Ntlm {
            return Err(SessionError::UnsupportedAuth(settings.username.trim().to_string()));
        }

        let timeout = Duration::from_secs(settings.timeout_secs.max(1));
        let client = HttpClient::builder()
            .timeout(timeout + Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let session = Self {
            client,
            endpoint: settings.endpoint(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            operation_timeout_secs: settings.timeout_secs.max(1),
        };

        let identify = format!(
            r#"<s:Envelope xmlns:s="{NS_ENVELOPE}" xmlns:wsmid="{NS_IDENTITY}"><s:Header/><s:Body><wsmid:Identify/></s:Body></s:Envelope>"#
        );
        let (status, body) = session
            .post_raw(identify)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        if status.is_success() {
            debug!("WinRM endpoint {} identified", session.endpoint);
            return Ok(session);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(SessionError::Rejected(
                "authentication failed (HTTP 401)".to_string(),
            ));
        }
        Err(SessionError::Rejected(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate(&body, 200)
        )))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post_raw(&self, body: String) -> Result<(StatusCode, String), reqwest::Error> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", "application/soap+xml;charset=UTF-8")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    async fn post(&self, body: String) -> Result<String, CollectionError> {
        let (status, text) = self
            .post_raw(body)
            .await
            .map_err(|e| CollectionError::Transport(e.to_string()))?;
        if status.is_success() {
            return Ok(text);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(CollectionError::Transport(
                "authentication failed (HTTP 401)".to_string(),
            ));
        }
        if text.contains(FAULT_OPERATION_TIMEOUT) {
            return Err(CollectionError::Transport(format!(
                "operation timed out (fault {FAULT_OPERATION_TIMEOUT})"
            )));
        }
        Err(CollectionError::Transport(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate(&text, 200)
        )))
    }

    fn envelope(&self, action: &str, shell_id: Option<&str>, options: &str, body: &str) -> String {
        let selector = shell_id
            .map(|id| {
                format!(
                    r#"<w:SelectorSet><w:Selector Name="ShellId">{}</w:Selector></w:SelectorSet>"#,
                    xml_escape(id)
                )
            })
            .unwrap_or_default();
        format!(
            concat!(
                r#"<s:Envelope xmlns:s="{ns_s}" xmlns:a="{ns_a}" xmlns:w="{ns_w}" xmlns:rsp="{ns_rsp}">"#,
                "<s:Header>",
                "<a:To>{to}</a:To>",
                r#"<a:ReplyTo><a:Address s:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address></a:ReplyTo>"#,
                r#"<w:MaxEnvelopeSize s:mustUnderstand="true">153600</w:MaxEnvelopeSize>"#,
                "<a:MessageID>uuid:{id}</a:MessageID>",
                r#"<w:Locale xml:lang="en-US" s:mustUnderstand="false"/>"#,
                "<w:OperationTimeout>PT{timeout}S</w:OperationTimeout>",
                r#"<w:ResourceURI s:mustUnderstand="true">{resource}</w:ResourceURI>"#,
                r#"<a:Action s:mustUnderstand="true">{action}</a:Action>"#,
                "{selector}{options}",
                "</s:Header>",
                "<s:Body>{body}</s:Body>",
                "</s:Envelope>"
            ),
            ns_s = NS_ENVELOPE,
            ns_a = NS_ADDRESSING,
            ns_w = NS_WSMAN,
            ns_rsp = NS_SHELL,
            to = xml_escape(&self.endpoint),
            id = Uuid::new_v4(),
            timeout = self.operation_timeout_secs,
            resource = RESOURCE_CMD,
            action = action,
            selector = selector,
            options = options,
            body = body,
        )
    }

    async fn open_shell(&self) -> Result<String, CollectionError> {
        let options = concat!(
            "<w:OptionSet>",
            r#"<w:Option Name="WINRS_NOPROFILE">TRUE</w:Option>"#,
            r#"<w:Option Name="WINRS_CODEPAGE">65001</w:Option>"#,
            "</w:OptionSet>"
        );
        let body = "<rsp:Shell><rsp:InputStreams>stdin</rsp:InputStreams><rsp:OutputStreams>stdout stderr</rsp:OutputStreams></rsp:Shell>";
        let response = self
            .post(self.envelope(ACTION_CREATE, None, options, body))
            .await?;
        capture(&SHELL_ID_RE, &response)
            .ok_or_else(|| CollectionError::Parse("no ShellId in Create response".to_string()))
    }

    async fn start_command(&self, shell_id: &str, script: &str) -> Result<String, CollectionError> {
        let options = concat!(
            "<w:OptionSet>",
            r#"<w:Option Name="WINRS_CONSOLEMODE_STDIN">TRUE</w:Option>"#,
            r#"<w:Option Name="WINRS_SKIP_CMD_SHELL">FALSE</w:Option>"#,
            "</w:OptionSet>"
        );
        let body = format!(
            "<rsp:CommandLine><rsp:Command>powershell</rsp:Command><rsp:Arguments>-NoProfile -NonInteractive -EncodedCommand {}</rsp:Arguments></rsp:CommandLine>",
            encode_powershell(script)
        );
        let response = self
            .post(self.envelope(ACTION_COMMAND, Some(shell_id), options, &body))
            .await?;
        capture(&COMMAND_ID_RE, &response)
            .ok_or_else(|| CollectionError::Parse("no CommandId in Command response".to_string()))
    }

    async fn receive(&self, shell_id: &str, command_id: &str) -> Result<CommandOutput, CollectionError> {
        let body = format!(
            r#"<rsp:Receive><rsp:DesiredStream CommandId="{}">stdout stderr</rsp:DesiredStream></rsp:Receive>"#,
            xml_escape(command_id)
        );
        let mut output = CommandOutput {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: 0,
        };

        loop {
            let response = match self
                .post(self.envelope(ACTION_RECEIVE, Some(shell_id), "", &body))
                .await
            {
                Ok(r) => r,
                // No output within OperationTimeout; poll again.
                Err(CollectionError::Transport(msg)) if msg.contains(FAULT_OPERATION_TIMEOUT) => {
                    continue
                }
                Err(e) => return Err(e),
            };

            let done = parse_receive(&response, &mut output)?;
            if done {
                return Ok(output);
            }
        }
    }

    async fn close(&self, shell_id: &str, command_id: Option<&str>) {
        if let Some(command_id) = command_id {
            let body = format!(
                r#"<rsp:Signal CommandId="{}"><rsp:Code>{}</rsp:Code></rsp:Signal>"#,
                xml_escape(command_id),
                SIGNAL_TERMINATE
            );
            if let Err(e) = self
                .post(self.envelope(ACTION_SIGNAL, Some(shell_id), "", &body))
                .await
            {
                debug!("WinRM signal failed: {}", e);
            }
        }
        if let Err(e) = self
            .post(self.envelope(ACTION_DELETE, Some(shell_id), "", ""))
            .await
        {
            warn!("Failed to delete WinRM shell {}: {}", shell_id, e);
        }
    }

    async fn run_in_shell(&self, shell_id: &str, script: &str) -> Result<CommandOutput, CollectionError> {
        let command_id = self.start_command(shell_id, script).await?;
        let result = self.receive(shell_id, &command_id).await;
        self.close(shell_id, Some(&command_id)).await;
        result
    }
}

#[async_trait]
impl RemoteShell for WinRmSession {
    #[instrument(skip(self, script), fields(endpoint = %self.endpoint))]
    async fn run_powershell(&self, script: &str) -> Result<String, CollectionError> {
        let shell_id = self.open_shell().await?;
        let output = match self.run_in_shell(&shell_id, script).await {
            Ok(output) => output,
            Err(e) => {
                self.close(&shell_id, None).await;
                return Err(e);
            }
        };

        if output.exit_code != 0 {
            return Err(CollectionError::Remote {
                status: output.exit_code,
                stderr: clean_stderr(&String::from_utf8_lossy(&output.stderr)),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Appends decoded stream chunks to `output`; returns true once the command is done.
fn parse_receive(response: &str, output: &mut CommandOutput) -> Result<bool, CollectionError> {
    for caps in STREAM_RE.captures_iter(response) {
        let Some(data) = caps.get(2).map(|m| m.as_str().trim()) else {
            continue;
        };
        if data.is_empty() {
            continue;
        }
        let decoded = BASE64
            .decode(data)
            .map_err(|e| CollectionError::Parse(format!("invalid stream data: {e}")))?;
        match &caps[1] {
            "stdout" => output.stdout.extend_from_slice(&decoded),
            _ => output.stderr.extend_from_slice(&decoded),
        }
    }

    let done = capture(&STATE_RE, response).is_some_and(|state| state.ends_with(STATE_DONE));
    if done {
        output.exit_code = capture(&EXIT_CODE_RE, response)
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
    }
    Ok(done)
}

/// Base64 of the UTF-16LE script, as `-EncodedCommand` expects.
pub fn encode_powershell(script: &str) -> String {
    let bytes: Vec<u8> = script.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    BASE64.encode(bytes)
}

/// Extracts error lines from PowerShell CLIXML stderr.
fn clean_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let Some(xml) = trimmed.strip_prefix("#< CLIXML") else {
        return trimmed.to_string();
    };
    let lines: Vec<String> = CLIXML_ERROR_RE
        .captures_iter(xml)
        .map(|c| c[1].replace("_x000D__x000A_", "\n"))
        .collect();
    if lines.is_empty() {
        xml.trim().to_string()
    } else {
        lines.concat().trim().to_string()
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RemoteSettings {
        RemoteSettings {
            host: "winhost".to_string(),
            port: 5986,
            username: "admin".to_string(),
            password: "secret".to_string(),
            use_ssl: true,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(settings().endpoint(), "https://winhost:5986/wsman");
        let plain = RemoteSettings {
            use_ssl: false,
            port: 5985,
            ..settings()
        };
        assert_eq!(plain.endpoint(), "http://winhost:5985/wsman");
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", settings());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_connect_requires_credentials() {
        let s = RemoteSettings {
            password: String::new(),
            ..settings()
        };
        let err = WinRmSession::connect(&s).await.err().expect("should fail");
        assert!(matches!(err, SessionError::MissingCredentials));
    }

    #[test]
    fn test_auth_scheme_follows_username() {
        assert_eq!(AuthScheme::for_username("admin"), AuthScheme::Basic);
        assert_eq!(AuthScheme::for_username("admin@corp.local"), AuthScheme::Basic);
        assert_eq!(AuthScheme::for_username(r"CORP\admin"), AuthScheme::Ntlm);
    }

    #[tokio::test]
    async fn test_connect_refuses_domain_account_without_request() {
        // Unroutable host: the refusal must happen before any I/O.
        let s = RemoteSettings {
            host: "192.0.2.1".to_string(),
            username: r"CORP\admin".to_string(),
            ..settings()
        };
        let err = WinRmSession::connect(&s).await.err().expect("should fail");
        assert!(matches!(err, SessionError::UnsupportedAuth(ref user) if user == r"CORP\admin"));
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_encode_powershell_is_utf16le() {
        // "A" -> 0x41 0x00
        assert_eq!(encode_powershell("A"), "QQA=");
    }

    #[test]
    fn test_parse_receive_collects_streams_and_exit_code() {
        let stdout = BASE64.encode("hello ");
        let stdout2 = BASE64.encode("world");
        let stderr = BASE64.encode("oops");
        let response = format!(
            concat!(
                r#"<rsp:ReceiveResponse>"#,
                r#"<rsp:Stream Name="stdout" CommandId="C1">{}</rsp:Stream>"#,
                r#"<rsp:Stream Name="stdout" CommandId="C1">{}</rsp:Stream>"#,
                r#"<rsp:Stream Name="stderr" CommandId="C1">{}</rsp:Stream>"#,
                r#"<rsp:Stream Name="stdout" CommandId="C1" End="true"></rsp:Stream>"#,
                r#"<rsp:Stream Name="stderr" CommandId="C1" End="true"/>"#,
                r#"<rsp:CommandState CommandId="C1" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done">"#,
                r#"<rsp:ExitCode>3</rsp:ExitCode></rsp:CommandState>"#,
                r#"</rsp:ReceiveResponse>"#
            ),
            stdout, stdout2, stderr
        );

        let mut output = CommandOutput {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: 0,
        };
        let done = parse_receive(&response, &mut output).expect("parse");
        assert!(done);
        assert_eq!(output.stdout, b"hello world");
        assert_eq!(output.stderr, b"oops");
        assert_eq!(output.exit_code, 3);
    }

    #[test]
    fn test_parse_receive_running() {
        let response = r#"<rsp:CommandState CommandId="C1" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Running"/>"#;
        let mut output = CommandOutput {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: 0,
        };
        assert!(!parse_receive(response, &mut output).expect("parse"));
    }

    #[test]
    fn test_shell_and_command_id_capture() {
        let create = r#"<w:SelectorSet><w:Selector Name="ShellId">ABC-123</w:Selector></w:SelectorSet>"#;
        assert_eq!(capture(&SHELL_ID_RE, create).as_deref(), Some("ABC-123"));
        let command = r#"<rsp:CommandResponse><rsp:CommandId>DEF-456</rsp:CommandId></rsp:CommandResponse>"#;
        assert_eq!(capture(&COMMAND_ID_RE, command).as_deref(), Some("DEF-456"));
    }

    #[test]
    fn test_clean_stderr_clixml() {
        let raw = r#"#< CLIXML
<Objs Version="1.1.0.1"><S S="Error">Access denied_x000D__x000A_</S><S S="Error">at line 1_x000D__x000A_</S></Objs>"#;
        assert_eq!(clean_stderr(raw), "Access denied\nat line 1");
        assert_eq!(clean_stderr("  plain error \n"), "plain error");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("äöü", 2), "äö");
        assert_eq!(truncate("ab", 10), "ab");
    }
}
