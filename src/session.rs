use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// What a window's foreground process is doing.
///
/// Serialized as `"idle"`, `"running"`, `"attention"`, or `""` when unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneStatus {
    Idle,
    Running,
    Attention,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl PaneStatus {
    /// Parse the tmux-side tag. Anything unrecognized is `Unknown`.
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "idle" => PaneStatus::Idle,
            "running" => PaneStatus::Running,
            "attention" => PaneStatus::Attention,
            _ => PaneStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaneStatus::Idle => "idle",
            PaneStatus::Running => "running",
            PaneStatus::Attention => "attention",
            PaneStatus::Unknown => "",
        }
    }

    fn severity(self) -> u8 {
        match self {
            PaneStatus::Unknown => 0,
            PaneStatus::Idle => 1,
            PaneStatus::Running => 2,
            PaneStatus::Attention => 3,
        }
    }
}

/// Worst-of aggregation across windows: attention > running > idle.
///
/// Unknown statuses are ignored; a session with nothing known is idle.
pub fn aggregate_status<'a, I>(statuses: I) -> PaneStatus
where
    I: IntoIterator<Item = &'a PaneStatus>,
{
    statuses
        .into_iter()
        .copied()
        .filter(|s| *s != PaneStatus::Unknown)
        .max_by_key(|s| s.severity())
        .unwrap_or(PaneStatus::Idle)
}

/// A tmux window within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub index: u32,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub pane_status: PaneStatus,
}

/// A tmux session as enumerated by a single backend, before it is given a
/// global identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub name: String,
    #[serde(default)]
    pub windows: Vec<Window>,
    /// Container identifier relative to the backend that produced this
    /// summary. Only bridge agents fill it in, since one agent reports
    /// sessions from several of its own sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A globally addressable tmux session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub container_id: String,
    /// Source tag (`local`, `host`, `container`, `bridge`).
    pub source: &'static str,
    pub windows: Vec<Window>,
    pub status: PaneStatus,
}

impl Session {
    pub fn new(container_id: &str, source: &'static str, summary: SessionSummary) -> Self {
        let status = aggregate_status(summary.windows.iter().map(|w| &w.pane_status));
        Self {
            id: session_id(container_id, &summary.name),
            name: summary.name,
            container_id: container_id.to_string(),
            source,
            windows: summary.windows,
            status,
        }
    }
}

const ID_SEPARATOR: char = '\u{1f}';

/// Derive the opaque global id for a session.
///
/// The id is a URL-safe encoding of `(container_id, session_name)`, so it is
/// stable across listings and can be decoded without consulting any source.
pub fn session_id(container_id: &str, session_name: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{container_id}{ID_SEPARATOR}{session_name}"))
}

/// Decode a session id back into `(container_id, session_name)`.
pub fn parse_session_id(id: &str) -> Option<(String, String)> {
    let raw = URL_SAFE_NO_PAD.decode(id).ok()?;
    let raw = String::from_utf8(raw).ok()?;
    let (container, session) = raw.split_once(ID_SEPARATOR)?;
    if container.is_empty() || validate_session_name(session).is_err() {
        return None;
    }
    Some((container.to_string(), session.to_string()))
}

/// Validate a tmux session name as accepted by this crate.
///
/// tmux forbids `:` and `.` in session names because they separate target
/// components.
pub fn validate_session_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("session name must not be empty".into());
    }
    if name.len() > 256 {
        return Err(format!("session name too long ({} chars, max 256)", name.len()));
    }
    if name.chars().any(|c| c == ':' || c == '.' || c == ID_SEPARATOR || c.is_control()) {
        return Err(format!("session name contains invalid characters: {name}"));
    }
    Ok(())
}

/// Drop blank lines at the top of a capture. They carry no information.
pub fn trim_leading_blank_lines(text: &str) -> &str {
    let mut rest = text;
    while let Some(pos) = rest.find('\n') {
        if rest[..pos].trim().is_empty() {
            rest = &rest[pos + 1..];
        } else {
            break;
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaneStatus::*;

    #[test]
    fn aggregate_worst_of() {
        assert_eq!(aggregate_status(&[Idle, Running]), Running);
        assert_eq!(aggregate_status(&[Idle, Attention, Running]), Attention);
        assert_eq!(aggregate_status(&[Idle, Idle]), Idle);
        assert_eq!(aggregate_status(&[]), Idle);
    }

    #[test]
    fn aggregate_ignores_unknown() {
        assert_eq!(aggregate_status(&[Unknown, Unknown]), Idle);
        assert_eq!(aggregate_status(&[Unknown, Running]), Running);
    }

    #[test]
    fn pane_status_serializes_to_closed_set() {
        let json = serde_json::to_string(&[Idle, Running, Attention, Unknown]).unwrap();
        assert_eq!(json, r#"["idle","running","attention",""]"#);
        let back: Vec<PaneStatus> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Idle, Running, Attention, Unknown]);
    }

    #[test]
    fn session_id_is_stable_and_decodable() {
        let a = session_id("bridge:box:web-1", "main");
        let b = session_id("bridge:box:web-1", "main");
        assert_eq!(a, b);
        assert_eq!(
            parse_session_id(&a),
            Some(("bridge:box:web-1".to_string(), "main".to_string()))
        );
    }

    #[test]
    fn session_ids_differ_per_container() {
        assert_ne!(session_id("local", "main"), session_id("host", "main"));
        assert_ne!(session_id("local", "main"), session_id("local", "main2"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_session_id("not base64 !!"), None);
        assert_eq!(parse_session_id(&URL_SAFE_NO_PAD.encode("no-separator")), None);
        assert_eq!(parse_session_id(&URL_SAFE_NO_PAD.encode("\u{1f}main")), None);
    }

    #[test]
    fn session_name_validation() {
        assert!(validate_session_name("work").is_ok());
        assert!(validate_session_name("my session").is_ok());
        assert!(validate_session_name("").is_err());
        assert!(validate_session_name("a:b").is_err());
        assert!(validate_session_name("a.b").is_err());
    }

    #[test]
    fn session_new_aggregates() {
        let summary = SessionSummary {
            name: "dev".into(),
            windows: vec![
                Window {
                    index: 0,
                    name: "zsh".into(),
                    command: "zsh".into(),
                    pane_status: Idle,
                },
                Window {
                    index: 1,
                    name: "build".into(),
                    command: "cargo".into(),
                    pane_status: Running,
                },
            ],
            source: None,
        };
        let session = Session::new("local", "local", summary);
        assert_eq!(session.status, Running);
        assert_eq!(session.id, session_id("local", "dev"));
    }

    #[test]
    fn trims_leading_blank_lines() {
        assert_eq!(trim_leading_blank_lines("\n  \nhello\n\nworld"), "hello\n\nworld");
        assert_eq!(trim_leading_blank_lines("hello"), "hello");
        assert_eq!(trim_leading_blank_lines("\n\n"), "");
    }
}
