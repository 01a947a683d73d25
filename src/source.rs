//! Container identifiers and the source they encode.
//!
//! Every session lives behind a container identifier string. The identifier's
//! shape alone decides which backend owns it:
//!
//! | identifier                  | source                                   |
//! |-----------------------------|------------------------------------------|
//! | `local`                     | tmux server of this process's user       |
//! | `host`                      | tmux server behind the host socket       |
//! | `bridge:<agent>`            | the agent's own tmux server              |
//! | `bridge:<agent>:<remote>`   | `<remote>` as seen from the agent        |
//! | anything else               | a Docker container id or name            |

use serde::Serialize;

pub const LOCAL_ID: &str = "local";
pub const HOST_ID: &str = "host";
pub const BRIDGE_PREFIX: &str = "bridge:";

/// The physical location of a container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// tmux on this machine; `host` selects the host socket instead of the
    /// default server.
    Local { host: bool },
    /// tmux inside a Docker container.
    Container { id: String },
    /// tmux on a remote agent. `remote` is the container identifier the agent
    /// should resolve on its side (`local`, `host`, or a container id).
    Bridge { agent: String, remote: String },
}

impl Source {
    /// Short tag used in listings and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Local { host: false } => "local",
            Source::Local { host: true } => "host",
            Source::Container { .. } => "container",
            Source::Bridge { .. } => "bridge",
        }
    }
}

/// Classify a container identifier. Pure: no I/O, no registry lookup.
///
/// Returns `None` if the identifier matches no known shape.
pub fn classify(container_id: &str) -> Option<Source> {
    match container_id {
        LOCAL_ID => return Some(Source::Local { host: false }),
        HOST_ID => return Some(Source::Local { host: true }),
        _ => {}
    }

    if let Some(rest) = container_id.strip_prefix(BRIDGE_PREFIX) {
        let (agent, remote) = match rest.split_once(':') {
            Some((agent, remote)) => (agent, remote),
            None => (rest, LOCAL_ID),
        };
        validate_agent_name(agent).ok()?;
        // The agent resolves `remote` itself, but it may not nest another bridge.
        if matches!(classify(remote)?, Source::Bridge { .. }) {
            return None;
        }
        return Some(Source::Bridge {
            agent: agent.to_string(),
            remote: remote.to_string(),
        });
    }

    if is_docker_reference(container_id) {
        return Some(Source::Container {
            id: container_id.to_string(),
        });
    }
    None
}

/// Build the container identifier for a bridge-side source.
pub fn bridge_container_id(agent: &str, remote: &str) -> String {
    if remote == LOCAL_ID {
        format!("{BRIDGE_PREFIX}{agent}")
    } else {
        format!("{BRIDGE_PREFIX}{agent}:{remote}")
    }
}

/// Validate an agent name. Names must be 1-64 chars, alphanumeric/hyphens/underscores/dots.
pub fn validate_agent_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("agent name must not be empty".into());
    }
    if name.len() > 64 {
        return Err(format!("agent name too long ({} chars, max 64)", name.len()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(format!("agent name contains invalid characters: {name}"));
    }
    Ok(())
}

/// Docker accepts ids (hex) and names matching `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
fn is_docker_reference(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    s.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_special_ids() {
        assert_eq!(classify("local"), Some(Source::Local { host: false }));
        assert_eq!(classify("host"), Some(Source::Local { host: true }));
    }

    #[test]
    fn classifies_bridge_ids() {
        assert_eq!(
            classify("bridge:laptop"),
            Some(Source::Bridge {
                agent: "laptop".into(),
                remote: "local".into()
            })
        );
        assert_eq!(
            classify("bridge:laptop:3f2a9c1d"),
            Some(Source::Bridge {
                agent: "laptop".into(),
                remote: "3f2a9c1d".into()
            })
        );
        assert_eq!(
            classify("bridge:laptop:host"),
            Some(Source::Bridge {
                agent: "laptop".into(),
                remote: "host".into()
            })
        );
    }

    #[test]
    fn rejects_nested_and_empty_bridges() {
        assert_eq!(classify("bridge:"), None);
        assert_eq!(classify("bridge:a:bridge:b"), None);
        assert_eq!(classify("bridge:bad name"), None);
    }

    #[test]
    fn classifies_docker_ids() {
        assert_eq!(
            classify("tmuxdeck-dev"),
            Some(Source::Container {
                id: "tmuxdeck-dev".into()
            })
        );
        assert_eq!(classify("-leading-dash"), None);
        assert_eq!(classify(""), None);
        assert_eq!(classify("has/slash"), None);
    }

    #[test]
    fn classify_is_deterministic() {
        for id in ["local", "host", "bridge:x", "bridge:x:abc", "abc123"] {
            assert_eq!(classify(id), classify(id));
        }
    }

    #[test]
    fn bridge_id_round_trips_through_classify() {
        let id = bridge_container_id("box", "local");
        assert_eq!(id, "bridge:box");
        let id = bridge_container_id("box", "web-1");
        assert_eq!(
            classify(&id),
            Some(Source::Bridge {
                agent: "box".into(),
                remote: "web-1".into()
            })
        );
    }
}
