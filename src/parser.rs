//! Field extraction from the remote server's free-form replies.
//!
//! Every function here is total: malformed replies degrade to sentinels
//! instead of errors so a result can always be rendered.

use serde::Serialize;

/// Artifact name used when a stop reply carries no file name.
pub const UNKNOWN_ARTIFACT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    StartAck,
    StopAck,
    DownloadAck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DownloadLink {
    Url(String),
    /// No URL could be found; carries the cleaned reply for diagnostics.
    Unparseable(String),
}

impl DownloadLink {
    pub fn url(&self) -> Option<&str> {
        match self {
            DownloadLink::Url(url) => Some(url),
            DownloadLink::Unparseable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    StartAck { message: String },
    StopAck { artifact_file: String },
    DownloadAck(DownloadLink),
}

pub fn parse_reply(kind: ReplyKind, raw: &str) -> ParsedReply {
    match kind {
        ReplyKind::StartAck => ParsedReply::StartAck {
            message: strip_formatting(raw).trim().to_string(),
        },
        ReplyKind::StopAck => ParsedReply::StopAck {
            artifact_file: parse_artifact_file(raw),
        },
        ReplyKind::DownloadAck => ParsedReply::DownloadAck(parse_download_link(raw)),
    }
}

/// File name from a stop reply such as `Saved replay to: run1_2024.mcrr`.
///
/// Takes the second `:`-separated field; falls back to [`UNKNOWN_ARTIFACT`].
fn parse_artifact_file(raw: &str) -> String {
    let cleaned = strip_formatting(raw);
    cleaned
        .split(':')
        .nth(1)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_ARTIFACT)
        .to_string()
}

/// URL following the last `]:` in a download reply.
fn parse_download_link(raw: &str) -> DownloadLink {
    let cleaned = strip_formatting(raw);
    match cleaned.rsplit_once("]:").map(|(_, url)| url.trim()) {
        Some(url) if !url.is_empty() && !url.contains(char::is_whitespace) => {
            DownloadLink::Url(url.to_string())
        }
        _ => DownloadLink::Unparseable(cleaned.trim().to_string()),
    }
}

/// Name the download command expects: the artifact file name up to its first `.`.
pub fn artifact_base_name(artifact_file: &str) -> &str {
    artifact_file
        .split_once('.')
        .map_or(artifact_file, |(base, _)| base)
}

/// Remove `§x` formatting codes.
fn strip_formatting(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}
