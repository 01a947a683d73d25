//! tmux command lines and output parsing.
//!
//! [`Tmux`] only builds argv vectors; the caller decides how to run them
//! (directly, or wrapped in `docker exec`).

use std::collections::BTreeMap;

use crate::session::{PaneStatus, SessionSummary, Window};

/// tmux user option that hooks (e.g. agent notification hooks) set to
/// `idle`, `running` or `attention`.
pub const STATUS_OPTION: &str = "@pane_status";

/// Paste buffer used for submit-style input.
const PASTE_BUFFER: &str = "tmuxdeck";

const WINDOW_FORMAT: &str =
    "#{session_name}\t#{window_index}\t#{window_name}\t#{pane_current_command}\t#{@pane_status}\t#{window_bell_flag}";

const SHELLS: &[&str] = &["bash", "zsh", "sh", "fish", "dash", "ksh", "tcsh", "nu"];

/// Literal text plus how to terminate it.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeyInput {
    pub text: String,
    /// Press Enter right after typing the text.
    #[serde(default)]
    pub enter: bool,
    /// Deliver the text as a bracketed paste, then press Enter.
    #[serde(default)]
    pub submit: bool,
}

/// Options for `capture-pane`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CaptureOptions {
    /// Keep escape sequences for colors and attributes.
    #[serde(default)]
    pub ansi: bool,
    /// Return only the last `max_lines` lines, reaching into history.
    #[serde(default)]
    pub max_lines: Option<u32>,
}

/// Builds tmux argv vectors behind a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tmux {
    prefix: Vec<String>,
}

impl Tmux {
    /// tmux on the default server, or on an explicit socket.
    pub fn local(socket: Option<&str>) -> Self {
        let mut prefix = vec!["tmux".to_string()];
        if let Some(socket) = socket {
            prefix.push("-S".into());
            prefix.push(socket.into());
        }
        Self { prefix }
    }

    /// tmux inside a container, through `docker exec`.
    pub fn in_container(docker_bin: &str, container_id: &str) -> Self {
        Self {
            prefix: vec![
                docker_bin.to_string(),
                "exec".into(),
                container_id.to_string(),
                "tmux".into(),
            ],
        }
    }

    fn cmd<const N: usize>(&self, args: [&str; N]) -> Vec<String> {
        let mut argv = self.prefix.clone();
        argv.extend(args.iter().map(|s| s.to_string()));
        argv
    }

    pub fn list_all_windows(&self) -> Vec<String> {
        self.cmd(["list-windows", "-a", "-F", WINDOW_FORMAT])
    }

    pub fn list_windows(&self, session: &str) -> Vec<String> {
        self.cmd(["list-windows", "-t", &format!("={session}"), "-F", WINDOW_FORMAT])
    }

    pub fn capture_pane(&self, session: &str, window: u32, opts: CaptureOptions) -> Vec<String> {
        let target = target(session, window);
        let mut argv = self.cmd(["capture-pane", "-p", "-t", &target]);
        if opts.ansi {
            argv.push("-e".into());
        }
        if let Some(n) = opts.max_lines {
            argv.push("-S".into());
            argv.push(format!("-{n}"));
        }
        argv
    }

    pub fn pane_width(&self, session: &str, window: u32) -> Vec<String> {
        self.cmd(["display-message", "-p", "-t", &target(session, window), "#{pane_width}"])
    }

    /// The ordered tmux invocations that deliver `input`.
    pub fn send_keys(&self, session: &str, window: u32, input: &KeyInput) -> Vec<Vec<String>> {
        let target = target(session, window);
        if input.submit {
            let mut steps = Vec::new();
            if !input.text.is_empty() {
                steps.push(self.cmd(["set-buffer", "-b", PASTE_BUFFER, "--", &input.text]));
                steps.push(self.cmd(["paste-buffer", "-p", "-d", "-b", PASTE_BUFFER, "-t", &target]));
            }
            steps.push(self.cmd(["send-keys", "-t", &target, "Enter"]));
            return steps;
        }

        let mut steps = Vec::new();
        if !input.text.is_empty() {
            steps.push(self.cmd(["send-keys", "-t", &target, "-l", "--", &input.text]));
        }
        if input.enter {
            steps.push(self.cmd(["send-keys", "-t", &target, "Enter"]));
        }
        steps
    }
}

fn target(session: &str, window: u32) -> String {
    format!("={session}:{window}")
}

/// True when tmux reports that no server is running on the socket, which
/// simply means there are no sessions.
pub fn is_no_server(stderr: &str) -> bool {
    stderr.contains("no server running")
        || stderr.contains("error connecting to")
        || stderr.contains("no sessions")
}

/// True when tmux could not find the target session or window.
pub fn is_missing_target(stderr: &str) -> bool {
    stderr.contains("can't find session")
        || stderr.contains("can't find window")
        || stderr.contains("can't find pane")
        || stderr.contains("session not found")
}

/// Decide a window's status from the hook-provided tag, the bell flag and the
/// foreground command.
pub fn derive_status(tag: &str, bell_flag: &str, command: &str) -> PaneStatus {
    match PaneStatus::parse(tag) {
        PaneStatus::Unknown => {}
        known => return known,
    }
    if bell_flag.trim() == "1" {
        return PaneStatus::Attention;
    }
    let command = command.trim();
    if command.is_empty() {
        PaneStatus::Unknown
    } else if SHELLS.contains(&command.trim_start_matches('-')) {
        PaneStatus::Idle
    } else {
        PaneStatus::Running
    }
}

fn parse_window_line(line: &str) -> Option<(String, Window)> {
    let mut parts = line.split('\t');
    let session = parts.next()?.to_string();
    let index = parts.next()?.trim().parse().ok()?;
    let name = parts.next()?.to_string();
    let command = parts.next().unwrap_or("").to_string();
    let tag = parts.next().unwrap_or("");
    let bell = parts.next().unwrap_or("");
    let pane_status = derive_status(tag, bell, &command);
    Some((
        session,
        Window {
            index,
            name,
            command,
            pane_status,
        },
    ))
}

/// Parse `list-windows` output for a single session.
pub fn parse_windows(output: &str) -> Vec<Window> {
    let mut windows: Vec<Window> = output
        .lines()
        .filter_map(parse_window_line)
        .map(|(_, w)| w)
        .collect();
    windows.sort_by_key(|w| w.index);
    windows
}

/// Parse `list-windows -a` output into sessions, ordered by name.
pub fn parse_sessions(output: &str) -> Vec<SessionSummary> {
    let mut grouped: BTreeMap<String, Vec<Window>> = BTreeMap::new();
    for (session, window) in output.lines().filter_map(parse_window_line) {
        grouped.entry(session).or_default().push(window);
    }
    grouped
        .into_iter()
        .map(|(name, mut windows)| {
            windows.sort_by_key(|w| w.index);
            SessionSummary {
                name,
                windows,
                source: None,
            }
        })
        .collect()
}

/// Parse the `#{pane_width}` answer.
pub fn parse_pane_width(output: &str) -> Option<u16> {
    output.trim().parse().ok().filter(|w| *w > 0)
}

/// Keep only the last `max_lines` lines of a capture, ignoring trailing
/// blank rows tmux pads the visible area with.
pub fn tail_lines(text: &str, max_lines: u32) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(0, |i| i + 1);
    let start = end.saturating_sub(max_lines as usize);
    let mut out = lines[start..end].join("\n");
    if end > start {
        out.push('\n');
    }
    out
}
