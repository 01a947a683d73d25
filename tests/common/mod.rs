#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tmuxdeck::exec::{CommandRunner, ExecError};

/// What a scripted command answers.
#[derive(Debug, Clone)]
pub enum Outcome {
    Stdout(String),
    /// Non-zero exit with this stderr.
    Fails(String),
    /// The program does not exist.
    Missing,
    /// Never finishes within the caller's timeout.
    Hangs,
}

struct Rule {
    needles: Vec<String>,
    outcome: Outcome,
}

/// A [`CommandRunner`] that answers from a script instead of spawning
/// processes.
///
/// The first rule whose needles all appear in the argv wins; with no match
/// the command succeeds with empty output. Every argv is recorded.
#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, needles: &[&str], outcome: Outcome) -> &Self {
        self.rules.lock().push(Rule {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            outcome,
        });
        self
    }

    pub fn stdout(&self, needles: &[&str], out: &str) -> &Self {
        self.on(needles, Outcome::Stdout(out.to_string()))
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    /// Calls whose argv contains `needle`.
    pub fn calls_with(&self, needle: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter(|argv| argv.iter().any(|a| a == needle))
            .cloned()
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run<'a>(
        &'a self,
        argv: &'a [String],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, ExecError>> {
        Box::pin(async move {
            self.calls.lock().push(argv.to_vec());
            let program = argv.first().cloned().unwrap_or_default();
            let outcome = self
                .rules
                .lock()
                .iter()
                .find(|rule| rule.needles.iter().all(|n| argv.iter().any(|a| a == n)))
                .map(|rule| rule.outcome.clone());
            match outcome {
                None => Ok(Vec::new()),
                Some(Outcome::Stdout(out)) => Ok(out.into_bytes()),
                Some(Outcome::Fails(stderr)) => Err(ExecError::Failed {
                    program,
                    code: Some(1),
                    stderr,
                }),
                Some(Outcome::Missing) => Err(ExecError::NotFound(program)),
                Some(Outcome::Hangs) => {
                    tokio::time::sleep(timeout).await;
                    Err(ExecError::Timeout(program, timeout))
                }
            }
        })
    }
}

/// One line of `list-windows` output.
pub fn window_line(session: &str, index: u32, name: &str, command: &str, status: &str) -> String {
    format!("{session}\t{index}\t{name}\t{command}\t{status}\t0\n")
}

/// Serve `app` on an ephemeral loopback port.
pub async fn start_server(app: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

/// Poll `check` until it holds or two seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
