//! Fallback sequencing over an ordered list of attempts.
//!
//! The only retry dimension is "try the next configuration": an attempt is never
//! repeated, and there is no backoff. The sequencer is generic over the probe
//! function so the ordering rules can be exercised without a network.

use std::future::Future;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::AttemptFailure;
use crate::probe::{ProbeResult, Prober};
use crate::schema::request::Attempt;
use crate::sink::OutputSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    /// Attempt `i` is next.
    Pending(usize),
    /// Attempt `i` produced text.
    Success(usize),
    Exhausted,
}

impl SequenceState {
    pub fn start(len: usize) -> Self {
        if len == 0 {
            SequenceState::Exhausted
        } else {
            SequenceState::Pending(0)
        }
    }

    /// Transition after the pending attempt finished. Terminal states are absorbing.
    #[must_use]
    pub fn advance(self, len: usize, succeeded: bool) -> Self {
        match self {
            SequenceState::Pending(i) if succeeded => SequenceState::Success(i),
            SequenceState::Pending(i) if i + 1 < len => SequenceState::Pending(i + 1),
            SequenceState::Pending(_) => SequenceState::Exhausted,
            terminal => terminal,
        }
    }
}

#[derive(Debug)]
pub struct FallbackReport {
    pub state: SequenceState,
    /// One result per attempt actually made, in order.
    pub results: Vec<ProbeResult>,
    /// Files written by the sink during this run.
    pub saved: Vec<PathBuf>,
}

impl FallbackReport {
    pub fn winner(&self) -> Option<&ProbeResult> {
        match self.state {
            SequenceState::Success(_) => self.results.last(),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.winner().and_then(ProbeResult::text)
    }
}

/// Walk `attempts` in order until one succeeds. `probe` runs exactly once per
/// attempt examined; attempts after the winner are never passed to it.
pub async fn run_sequence<F, Fut>(attempts: &[Attempt], mut probe: F) -> FallbackReport
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = ProbeResult>,
{
    let mut state = SequenceState::start(attempts.len());
    let mut results = Vec::with_capacity(attempts.len());

    while let SequenceState::Pending(i) = state {
        let attempt = &attempts[i];
        info!(
            label = %attempt.label,
            "Attempt {}/{}: {} via {}",
            i + 1,
            attempts.len(),
            attempt.endpoint.path,
            attempt.scheme.label()
        );

        let result = probe(attempt.clone()).await;
        state = state.advance(attempts.len(), result.succeeded());
        results.push(result);
    }

    match state {
        SequenceState::Success(i) => info!(label = %attempts[i].label, "Fallback chain succeeded"),
        _ => warn!("All {} attempt(s) exhausted", attempts.len()),
    }

    FallbackReport {
        state,
        results,
        saved: Vec::new(),
    }
}

/// Run the chain against a live server. With a sink, the winner's text and raw JSON
/// are saved; a 2xx JSON body that yielded no text is dumped for debugging.
/// Sink failures are logged, never fatal.
pub async fn run_fallback(
    prober: &Prober,
    attempts: &[Attempt],
    sink: Option<&OutputSink>,
) -> FallbackReport {
    let mut report =
        run_sequence(attempts, |attempt| async move { prober.probe(&attempt).await }).await;

    let Some(sink) = sink else {
        return report;
    };

    let mut saved = Vec::new();
    for result in &report.results {
        if let (true, Some(AttemptFailure::Extraction(_)), Some(body)) =
            (result.is_2xx(), result.failure(), result.json())
        {
            keep(&mut saved, sink.save_debug(&result.label, body));
        }
    }

    if let Some(winner) = report.winner() {
        if let Ok(ref extraction) = winner.outcome {
            keep(
                &mut saved,
                sink.save_text_with_sources(&winner.label, &extraction.text, &extraction.sources()),
            );
        }
        if let Some(body) = winner.json() {
            keep(&mut saved, sink.save_response(&winner.label, body));
        }
    }

    report.saved = saved;
    report
}

fn keep(saved: &mut Vec<PathBuf>, written: crate::error::Result<PathBuf>) {
    match written {
        Ok(path) => saved.push(path),
        Err(e) => warn!("Could not write output file: {}", e),
    }
}

/// Run every attempt regardless of outcome. With a sink, every 2xx JSON body is
/// saved as `survey_<label>.json`.
pub async fn run_survey(
    prober: &Prober,
    attempts: &[Attempt],
    sink: Option<&OutputSink>,
) -> SurveyReport {
    let mut results = Vec::with_capacity(attempts.len());
    let mut saved = Vec::new();
    for attempt in attempts {
        let result = prober.probe(attempt).await;
        if let (Some(sink), true, Some(body)) = (sink, result.is_2xx(), result.json()) {
            keep(&mut saved, sink.save_survey(&result.label, body));
        }
        results.push(result);
    }
    SurveyReport { results, saved }
}

#[derive(Debug)]
pub struct SurveyReport {
    pub results: Vec<ProbeResult>,
    pub saved: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::{SchemaKind, CHAT_COMPLETIONS, MESSAGES};
    use crate::probe::ResponseBody;
    use crate::schema::extract::Extraction;
    use crate::schema::request::Prompt;
    use std::cell::RefCell;
    use std::time::Duration;

    fn attempt(label: &str) -> Attempt {
        Attempt::new(label, MESSAGES, Prompt::user("q"))
    }

    fn result(label: &str, text: Option<&str>) -> ProbeResult {
        ProbeResult {
            label: label.to_string(),
            method: MESSAGES.method,
            url: "http://test/v1/messages".to_string(),
            schema: SchemaKind::Messages,
            status: Some(if text.is_some() { 200 } else { 500 }),
            body: ResponseBody::Empty,
            outcome: match text {
                Some(t) => Ok(Extraction {
                    text: t.to_string(),
                    notes: Vec::new(),
                }),
                None => Err(AttemptFailure::Status {
                    status: 500,
                    preview: "boom".to_string(),
                }),
            },
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(SequenceState::start(0), SequenceState::Exhausted);
        assert_eq!(SequenceState::start(3), SequenceState::Pending(0));

        let s = SequenceState::Pending(0);
        assert_eq!(s.advance(3, false), SequenceState::Pending(1));
        assert_eq!(s.advance(3, true), SequenceState::Success(0));
        assert_eq!(SequenceState::Pending(2).advance(3, false), SequenceState::Exhausted);
        assert_eq!(SequenceState::Exhausted.advance(3, true), SequenceState::Exhausted);
        assert_eq!(SequenceState::Success(1).advance(3, false), SequenceState::Success(1));
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let attempts = vec![attempt("a"), attempt("b"), attempt("c")];
        let seen = RefCell::new(Vec::new());

        let report = run_sequence(&attempts, |a| {
            seen.borrow_mut().push(a.label.clone());
            let text = if a.label == "b" { Some("X") } else { None };
            let r = result(&a.label, text);
            async move { r }
        })
        .await;

        assert_eq!(report.state, SequenceState::Success(1));
        assert_eq!(report.text(), Some("X"));
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
        assert_eq!(report.results.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausts_in_order() {
        let attempts = vec![
            attempt("first"),
            Attempt::new("second", CHAT_COMPLETIONS, Prompt::user("q")),
            attempt("third"),
        ];
        let seen = RefCell::new(Vec::new());

        let report = run_sequence(&attempts, |a| {
            seen.borrow_mut().push(a.label.clone());
            let r = result(&a.label, None);
            async move { r }
        })
        .await;

        assert_eq!(report.state, SequenceState::Exhausted);
        assert!(report.text().is_none());
        assert!(report.winner().is_none());
        assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_empty_list_is_exhausted() {
        let report = run_sequence(&[], |a: Attempt| {
            let r = result(&a.label, Some("never"));
            async move { r }
        })
        .await;
        assert_eq!(report.state, SequenceState::Exhausted);
        assert!(report.results.is_empty());
    }
}
