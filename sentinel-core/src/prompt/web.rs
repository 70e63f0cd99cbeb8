//! Local web approval surface
//!
//! Serves one review form for the whole batch and accepts one submission. HTTP is
//! handled by `tiny_http` on a blocking task; the caller awaits a one-shot
//! completion signal with a deadline, keeps the confirmation page up for a grace
//! period, then unblocks the server.

use super::{ApprovalPrompter, PendingFile};
use crate::config::WebConfig;
use crate::error::PromptError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use uuid::Uuid;

/// Largest request body accepted
const MAX_BODY: usize = 1 << 20;

/// Largest request line plus headers accepted
const MAX_HEAD: usize = 16 * 1024;

type Decisions = BTreeMap<String, bool>;

/// What the server needs to render and validate one review
struct Review {
    token: String,
    page: String,
    paths: Vec<String>,
}

/// A bound, not yet serving, approval server
pub struct WebApprovalServer {
    server: Arc<Server>,
}

impl WebApprovalServer {
    pub fn bind(host: &str, port: u16) -> io::Result<Self> {
        let server = Server::http((host, port)).map_err(io::Error::other)?;
        Ok(Self {
            server: Arc::new(server),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.server
            .server_addr()
            .to_ip()
            .ok_or_else(|| io::Error::other("approval server is not listening on TCP"))
    }

    /// Serve the review form until a submission arrives or the deadline passes
    pub async fn collect(
        self,
        files: &[PendingFile],
        decision_timeout: Duration,
        grace_period: Duration,
    ) -> Result<Decisions, PromptError> {
        // Capability token for the submit form
        let token = Uuid::new_v4().simple().to_string();
        let review = Review {
            page: render_review(files, &token),
            paths: files.iter().map(|f| f.path.clone()).collect(),
            token,
        };

        let (decision_tx, decision_rx) = oneshot::channel();
        let server = Arc::clone(&self.server);
        let serving = tokio::task::spawn_blocking(move || serve(&server, &review, decision_tx));

        let outcome = match tokio::time::timeout(decision_timeout, decision_rx).await {
            Ok(Ok(decisions)) => {
                tokio::time::sleep(grace_period).await;
                Ok(decisions)
            }
            Ok(Err(_)) => Err(PromptError::Closed),
            Err(_) => Err(PromptError::Timeout {
                seconds: decision_timeout.as_secs(),
            }),
        };

        self.server.unblock();
        if let Err(e) = serving.await {
            warn!("Approval server task failed: {}", e);
        }
        outcome
    }
}

/// Answer requests until the server is unblocked
fn serve(server: &Server, review: &Review, decision_tx: oneshot::Sender<Decisions>) {
    let mut decision_tx = Some(decision_tx);

    for mut request in server.incoming_requests() {
        let (status, body) = route(&mut request, review, &mut decision_tx);
        if let Err(e) = request.respond(html(status, body)) {
            debug!("Failed to answer request: {}", e);
        }
    }
    debug!("Approval server stopped");
}

fn html(status: u16, body: String) -> Response<Cursor<Vec<u8>>> {
    let response = Response::from_string(body).with_status_code(status);
    match Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

fn head_size(request: &Request) -> usize {
    request.url().len()
        + request
            .headers()
            .iter()
            .map(|h| h.field.as_str().len() + h.value.len() + 4)
            .sum::<usize>()
}

/// Read the body up to [`MAX_BODY`]. `None` when it is larger.
fn read_body(request: &mut Request) -> io::Result<Option<Vec<u8>>> {
    if request.body_length().is_some_and(|len| len > MAX_BODY) {
        return Ok(None);
    }
    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY as u64 + 1)
        .read_to_end(&mut body)?;
    Ok((body.len() <= MAX_BODY).then_some(body))
}

fn route(
    request: &mut Request,
    review: &Review,
    decision_tx: &mut Option<oneshot::Sender<Decisions>>,
) -> (u16, String) {
    if head_size(request) > MAX_HEAD {
        return (431, message_page("Request headers too large."));
    }

    let method = request.method().clone();
    let path = request.url().split('?').next().unwrap_or("/").to_string();
    match (&method, path.as_str()) {
        (Method::Get, "/") => match decision_tx {
            Some(_) => (200, review.page.clone()),
            None => (200, confirmation_page()),
        },
        (Method::Post, "/submit") => {
            if decision_tx.is_none() {
                return (
                    409,
                    message_page("Decisions were already submitted for this review."),
                );
            }

            let body = match read_body(request) {
                Ok(Some(body)) => body,
                Ok(None) => return (413, message_page("Submission too large.")),
                Err(e) => {
                    debug!("Failed to read submission: {}", e);
                    return (400, message_page("Malformed request."));
                }
            };

            let form = parse_form(&body);
            if form.get("token") != Some(&review.token) {
                warn!("Rejected approval submission with a missing or stale token");
                return (
                    403,
                    message_page("This form has expired. Reload the review page and try again."),
                );
            }

            let decisions = decisions_from_form(&form, &review.paths);
            info!(
                "Received web decisions: {} approved of {}",
                decisions.values().filter(|approved| **approved).count(),
                review.paths.len()
            );
            if let Some(tx) = decision_tx.take() {
                if tx.send(decisions).is_err() {
                    warn!("Verifier stopped waiting before the submission arrived");
                }
            }
            (200, confirmation_page())
        }
        _ => (404, message_page("Not found.")),
    }
}

/// Field `f<index>` answers for `paths[index]`; unanswered files are left out
fn decisions_from_form(form: &BTreeMap<String, String>, paths: &[String]) -> Decisions {
    paths
        .iter()
        .enumerate()
        .filter_map(|(index, path)| match form.get(&format!("f{index}")).map(String::as_str) {
            Some("approve") => Some((path.clone(), true)),
            Some("reject") => Some((path.clone(), false)),
            _ => None,
        })
        .collect()
}

/// Decode an `application/x-www-form-urlencoded` body
fn parse_form(body: &[u8]) -> BTreeMap<String, String> {
    form_urlencoded::parse(body).into_owned().collect()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

const STYLE: &str = r#"<style>
    body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; background: #f5f5f5; }
    main { max-width: 1100px; margin: 0 auto; padding: 24px; }
    section { background: white; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); padding: 16px 24px; margin-bottom: 24px; }
    pre { background: #1e1e1e; color: #e0e0e0; padding: 12px; overflow-x: auto; max-height: 480px; }
    .meta { color: #666; }
    .actions label { margin-right: 24px; }
    button { font-size: 16px; padding: 8px 24px; }
</style>"#;

fn page(title: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n{}\n</head>\n<body>\n<main>\n{}\n</main>\n</body>\n</html>",
        escape_html(title),
        STYLE,
        content
    )
}

fn render_review(files: &[PendingFile], token: &str) -> String {
    let mut content = format!(
        "<h1>Model Sentinel</h1>\n<p>{} file(s) changed since they were last trusted. \
         Review each one and submit once. Anything left as rejected will not be trusted.</p>\n\
         <form method=\"post\" action=\"/submit\">\n\
         <input type=\"hidden\" name=\"token\" value=\"{}\">\n",
        files.len(),
        escape_html(token)
    );

    for (index, file) in files.iter().enumerate() {
        let body = file.diff().unwrap_or_else(|| file.text().into_owned());
        content.push_str(&format!(
            "<section>\n<h2>{path}</h2>\n<p class=\"meta\">{summary}</p>\n<pre>{body}</pre>\n\
             <div class=\"actions\">\n\
             <label><input type=\"radio\" name=\"f{index}\" value=\"approve\"> Trust</label>\n\
             <label><input type=\"radio\" name=\"f{index}\" value=\"reject\" checked> Reject</label>\n\
             </div>\n</section>\n",
            path = escape_html(&file.path),
            summary = escape_html(&file.change_summary()),
            body = escape_html(&body),
        ));
    }

    content.push_str("<button type=\"submit\">Submit decisions</button>\n</form>");
    page("Model Sentinel review", &content)
}

fn confirmation_page() -> String {
    page(
        "Decisions received",
        "<section>\n<h1>Decisions received</h1>\n<p>You can close this window and return to the terminal.</p>\n</section>",
    )
}

fn message_page(message: &str) -> String {
    page(
        "Model Sentinel",
        &format!("<section>\n<p>{}</p>\n</section>", escape_html(message)),
    )
}

/// Approval prompter that opens the web surface for each batch
pub struct WebPrompter {
    config: WebConfig,
    announce: Box<dyn Fn(&str) + Send + Sync>,
}

impl WebPrompter {
    pub fn new(config: WebConfig) -> Self {
        Self {
            config,
            announce: Box::new(|url| info!("Review pending files at {}", url)),
        }
    }

    /// Called with the review URL once the server is listening
    pub fn with_announce(mut self, announce: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.announce = Box::new(announce);
        self
    }
}

#[async_trait]
impl ApprovalPrompter for WebPrompter {
    async fn decide(&self, file: &PendingFile) -> Result<bool, PromptError> {
        let decisions = self.collect_batch(std::slice::from_ref(file)).await?;
        Ok(decisions.get(&file.path).copied().unwrap_or(false))
    }

    async fn collect_batch(&self, files: &[PendingFile]) -> Result<Decisions, PromptError> {
        let server = WebApprovalServer::bind(&self.config.host, self.config.port)?;
        let addr = server.local_addr()?;
        (self.announce)(&format!("http://{addr}/"));

        server
            .collect(
                files,
                self.config.decision_timeout(),
                self.config.grace_period(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::FileCandidate;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn pending(path: &str, content: &str) -> PendingFile {
        PendingFile::new(
            FileCandidate::from_content(path, content.as_bytes().to_vec()),
            None,
            None,
        )
    }

    async fn http(addr: SocketAddr, request: String) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    fn get() -> String {
        "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string()
    }

    fn post(body: &str) -> String {
        format!(
            "POST /submit HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    }

    fn token_from(page: &str) -> String {
        let marker = "name=\"token\" value=\"";
        let start = page.find(marker).unwrap() + marker.len();
        let end = start + page[start..].find('"').unwrap();
        page[start..end].to_string()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn test_decisions_from_form() {
        let form = parse_form(b"token=t&f0=approve&f1=reject&f9=approve");
        let paths = vec!["a.py".to_string(), "b.py".to_string(), "c.py".to_string()];
        let decisions = decisions_from_form(&form, &paths);

        assert_eq!(decisions.get("a.py"), Some(&true));
        assert_eq!(decisions.get("b.py"), Some(&false));
        assert_eq!(decisions.get("c.py"), None);
    }

    #[test]
    fn test_parse_form_decodes_escapes() {
        let form = parse_form(b"token=a%2Bb&note=caf%C3%A9+ok");
        assert_eq!(form.get("token").map(String::as_str), Some("a+b"));
        assert_eq!(form.get("note").map(String::as_str), Some("café ok"));
    }

    #[test]
    fn test_review_page_escapes_content() {
        let page = render_review(&[pending("evil.py", "print('</pre><script>')")], "tok");
        assert!(page.contains("&lt;/pre&gt;&lt;script&gt;"));
        assert!(!page.contains("</pre><script>"));
        assert!(page.contains("name=\"f0\" value=\"approve\""));
    }

    #[tokio::test]
    async fn test_collects_one_submission() {
        let server = WebApprovalServer::bind("127.0.0.1", 0).unwrap();
        let addr = server.local_addr().unwrap();
        let files = vec![pending("a.py", "a = 1"), pending("b.py", "b = 1")];

        let collecting = tokio::spawn(async move {
            server
                .collect(&files, Duration::from_secs(10), Duration::from_millis(50))
                .await
        });

        let form = http(addr, get()).await;
        assert!(form.starts_with("HTTP/1.1 200"));
        assert!(form.contains("a.py"));
        let token = token_from(&form);
        assert_eq!(token.len(), 32);

        let accepted = http(addr, post(&format!("token={token}&f0=approve&f1=reject"))).await;
        assert!(accepted.contains("Decisions received"));

        let decisions = collecting.await.unwrap().unwrap();
        assert_eq!(decisions.get("a.py"), Some(&true));
        assert_eq!(decisions.get("b.py"), Some(&false));
    }

    #[tokio::test]
    async fn test_forged_token_is_forbidden_and_review_stays_open() {
        let server = WebApprovalServer::bind("127.0.0.1", 0).unwrap();
        let addr = server.local_addr().unwrap();
        let files = vec![pending("a.py", "a = 1")];

        let collecting = tokio::spawn(async move {
            server
                .collect(&files, Duration::from_secs(10), Duration::from_millis(50))
                .await
        });

        let token = token_from(&http(addr, get()).await);
        let forged = http(addr, post("token=wrong&f0=approve")).await;
        assert!(forged.starts_with("HTTP/1.1 403"));
        assert!(forged.contains("expired"));

        let accepted = http(addr, post(&format!("token={token}&f0=reject"))).await;
        assert!(accepted.starts_with("HTTP/1.1 200"));

        let decisions = collecting.await.unwrap().unwrap();
        assert_eq!(decisions.get("a.py"), Some(&false));
    }

    #[tokio::test]
    async fn test_second_submission_conflicts() {
        let server = WebApprovalServer::bind("127.0.0.1", 0).unwrap();
        let addr = server.local_addr().unwrap();
        let files = vec![pending("a.py", "a = 1")];

        let collecting = tokio::spawn(async move {
            server
                .collect(&files, Duration::from_secs(10), Duration::from_secs(2))
                .await
        });

        let token = token_from(&http(addr, get()).await);
        let first = http(addr, post(&format!("token={token}&f0=reject"))).await;
        assert!(first.starts_with("HTTP/1.1 200"));

        let second = http(addr, post(&format!("token={token}&f0=approve"))).await;
        assert!(second.starts_with("HTTP/1.1 409"));

        let decisions = collecting.await.unwrap().unwrap();
        assert_eq!(decisions.get("a.py"), Some(&false));
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_review() {
        let server = WebApprovalServer::bind("127.0.0.1", 0).unwrap();
        let addr = server.local_addr().unwrap();
        let files = vec![pending("a.py", "a = 1")];

        let collecting = tokio::spawn(async move {
            server
                .collect(&files, Duration::from_secs(10), Duration::from_millis(0))
                .await
        });

        // A preconnected socket that never sends anything
        let _idle = TcpStream::connect(addr).await.unwrap();

        let form = tokio::time::timeout(Duration::from_secs(2), http(addr, get()))
            .await
            .expect("review page blocked by idle connection");
        let token = token_from(&form);
        http(addr, post(&format!("token={token}&f0=approve"))).await;

        let decisions = collecting.await.unwrap().unwrap();
        assert_eq!(decisions.get("a.py"), Some(&true));
    }

    #[tokio::test]
    async fn test_times_out_without_submission() {
        let server = WebApprovalServer::bind("127.0.0.1", 0).unwrap();
        let result = server
            .collect(
                &[pending("a.py", "")],
                Duration::from_millis(50),
                Duration::from_millis(0),
            )
            .await;

        assert!(matches!(result, Err(PromptError::Timeout { .. })));
    }
}
