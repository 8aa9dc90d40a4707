use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::warn;
use missive::{Relay, Submission};
use url::form_urlencoded;

use crate::http::{Request, Response};

const INDEX_PAGE: &str = "index.html";
const MESSAGE_PAGE: &str = "message.html";
const ERROR_PAGE: &str = "error.html";

/// Maps requests to pages, static assets and the submit handler.
///
/// Holds no mutable state, so one instance is shared by every connection.
pub struct Router {
    public_dir: PathBuf,
    assets: Vec<String>,
    relay: Box<dyn Relay>,
}

impl Router {
    pub fn new<R: Relay + 'static>(public_dir: impl Into<PathBuf>, assets: &[String], relay: R) -> Self {
        let assets = assets
            .iter()
            .map(|name| name.trim_start_matches('/').to_string())
            .filter(|name| {
                let safe = !name.is_empty()
                    && Path::new(name)
                        .components()
                        .all(|c| matches!(c, Component::Normal(_)));
                if !safe {
                    warn!("ignoring static asset {:?}: not a plain relative path", name);
                }
                safe
            })
            .collect();

        Self {
            public_dir: public_dir.into(),
            assets,
            relay: Box::new(relay),
        }
    }

    pub fn handle(&self, request: &Request) -> Response {
        match (request.method.as_str(), request.path()) {
            ("GET", "/") => self.html_file(INDEX_PAGE, 200),
            ("GET", "/message") => self.html_file(MESSAGE_PAGE, 200),
            ("GET", path) => match self.asset(path) {
                Some(name) => self.static_file(name),
                None => self.html_file(ERROR_PAGE, 404),
            },
            ("POST", "/submit") => self.submit(&request.body),
            _ => self.html_file(ERROR_PAGE, 404),
        }
    }

    fn asset(&self, path: &str) -> Option<&str> {
        let name = path.strip_prefix('/')?;
        self.assets
            .iter()
            .find(|asset| asset.as_str() == name)
            .map(String::as_str)
    }

    fn submit(&self, body: &[u8]) -> Response {
        let Some(submission) = parse_submission(body) else {
            return self.html_file(ERROR_PAGE, 400);
        };

        if let Err(err) = self.relay.relay(&submission) {
            warn!("relay of message from {:?} failed: {}", submission.username, err);
        }

        Response::redirect("/")
    }

    fn html_file(&self, name: &str, status: u16) -> Response {
        match self.read(name) {
            Some(body) => Response::new(status)
                .with_header("Content-Type", "text/html")
                .with_body(body),
            None => Response::file_not_found(),
        }
    }

    fn static_file(&self, name: &str) -> Response {
        match self.read(name) {
            Some(body) => Response::new(200)
                .with_header("Content-Type", content_type(Path::new(name)))
                .with_body(body),
            None => Response::file_not_found(),
        }
    }

    fn read(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.public_dir.join(name);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("file not found: {}", path.display());
                None
            }
            Err(err) => {
                warn!("cannot read {}: {}", path.display(), err);
                None
            }
        }
    }
}

/// Decodes a form body into a submission.
///
/// The first non-empty value of each field wins; `None` if either field ends
/// up missing or empty.
pub fn parse_submission(body: &[u8]) -> Option<Submission> {
    let mut username = None;
    let mut message = None;

    for (key, value) in form_urlencoded::parse(body) {
        if value.is_empty() {
            continue;
        }
        let slot = match &*key {
            "username" => &mut username,
            "message" => &mut message,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    let submission = Submission::new(username?, message?);
    submission.is_complete().then_some(submission)
}

pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "css" => "text/css",
        "png" => "image/png",
        "html" | "htm" => "text/html",
        "js" => "text/javascript",
        "json" => "application/json",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
