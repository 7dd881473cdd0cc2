//! Presentation mapping: session state in, render directives out.
//!
//! The controller never decides which buttons exist; it hands a session to
//! this module and the front-end draws whatever directive comes back.

use crate::model::{AffordanceRef, ReplaySession, SessionState};
use crate::parser::DownloadLink;
use serde::Serialize;

/// Interactive element the front-end should offer for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    Stop,
    Download,
}

impl Affordance {
    pub fn label(self) -> &'static str {
        match self {
            Affordance::Stop => "STOP REPLAY",
            Affordance::Download => "Download replay",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Neutral,
    Stopped,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub label: String,
    pub value: String,
}

impl Field {
    fn new(label: &str, value: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderDirective {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<Field>,
    pub affordances: Vec<Affordance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    /// Operator-visible warning, e.g. when the remote command failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub tone: Tone,
    /// Element the directive is bound to, once one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affordance_ref: Option<AffordanceRef>,
}

impl RenderDirective {
    fn new(title: impl Into<String>, tone: Tone) -> Self {
        Self {
            title: title.into(),
            description: None,
            fields: Vec::new(),
            affordances: Vec::new(),
            footer: None,
            notice: None,
            tone,
            affordance_ref: None,
        }
    }

    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    /// Plain-text rendering for terminals.
    pub fn text_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("== {} ==", self.title)];
        if let Some(desc) = self.description.as_deref() {
            lines.push(desc.to_string());
        }
        let width = self
            .fields
            .iter()
            .map(|f| f.label.chars().count())
            .max()
            .unwrap_or(0);
        for field in &self.fields {
            lines.push(format!("{:<width$}  {}", field.label, field.value));
        }
        if let Some(notice) = self.notice.as_deref() {
            lines.push(format!("! {notice}"));
        }
        if !self.affordances.is_empty() {
            let actions: Vec<String> = self
                .affordances
                .iter()
                .map(|a| format!("[{}]", a.label()))
                .collect();
            match self.affordance_ref {
                Some(r) => lines.push(format!("{} on {r}", actions.join(" "))),
                None => lines.push(actions.join(" ")),
            }
        }
        if let Some(footer) = self.footer.as_deref() {
            lines.push(footer.to_string());
        }
        lines
    }
}

/// Directive for a session in its current state.
pub fn session_view(session: &ReplaySession) -> RenderDirective {
    let name = session.name().as_str();
    let mut directive = match session.state() {
        SessionState::Recording => {
            let mut d = RenderDirective::new(format!("Replay {name}"), Tone::Neutral);
            if let Some(region) = session.region() {
                d.fields.push(Field::new(
                    "Starting chunk coordinates",
                    region.start.to_string(),
                ));
                d.fields
                    .push(Field::new("End chunk coordinates", region.end.to_string()));
            }
            d.fields.push(Field::new("Name", name));
            if let Some(dimension) = session.dimension() {
                d.fields.push(Field::new("Dimension", dimension.to_string()));
            }
            d.affordances.push(Affordance::Stop);
            d
        }
        SessionState::Stopped { artifact_file } => {
            let mut d = RenderDirective::new("Replay Stopped", Tone::Stopped);
            d.fields.push(Field::new("Name", name));
            d.fields.push(Field::new("FileName", artifact_file.as_str()));
            if let Some(dimension) = session.dimension() {
                d.fields.push(Field::new("Dimension", dimension.to_string()));
            }
            d.footer = Some("Replay has been stopped.".into());
            d.affordances.push(Affordance::Download);
            d
        }
    };
    directive.affordance_ref = Some(session.affordance());
    directive
}

pub fn download_view(link: &DownloadLink) -> RenderDirective {
    match link {
        DownloadLink::Url(url) => {
            let mut d = RenderDirective::new("Download Replay", Tone::Success);
            d.description = Some(format!("[Click here to download your replay]({url})"));
            d
        }
        DownloadLink::Unparseable(raw) => {
            let mut d = RenderDirective::new("Download Replay", Tone::Failure);
            d.description = Some("The server did not return a download link.".into());
            if !raw.is_empty() {
                d.fields.push(Field::new("Server reply", raw.as_str()));
            }
            d
        }
    }
}

pub fn failure_view(message: impl Into<String>) -> RenderDirective {
    let mut d = RenderDirective::new("Replay command failed", Tone::Failure);
    d.description = Some(message.into());
    d
}
