//! Judgment orchestration: prompt → model → parse, with bounded transport
//! retries, one corrective retry on contract violations, and bounded
//! fan-out across the redlines of a document.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::config::JudgmentConfig;
use crate::models::{JudgmentFailure, Redline, Rule, Verdict};
use crate::pipeline::retry::{with_retry, RetryPolicy};

use super::parser::parse_verdict_response;
use super::prompt::{build_judgment_prompt, CORRECTION_INSTRUCTION, JUDGMENT_SYSTEM_PROMPT};
use super::types::ModelClient;
use super::JudgmentError;

/// One unit of judgment work: a redline and its matched rule, if any.
pub struct JudgmentJob<'a> {
    pub redline: &'a Redline,
    /// Playbook index and rule. None means "no rule matched", which is
    /// first-class input, not an error.
    pub rule: Option<(usize, &'a Rule)>,
}

/// Batch result. `verdicts.len() + failures.len()` always equals the number
/// of submitted jobs; both lists are in original redline order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub verdicts: Vec<Verdict>,
    pub failures: Vec<JudgmentFailure>,
}

/// Drives the model for one document's redlines.
pub struct JudgmentEngine {
    client: Box<dyn ModelClient + Send + Sync>,
    model: String,
    config: JudgmentConfig,
}

impl JudgmentEngine {
    pub fn new(
        client: Box<dyn ModelClient + Send + Sync>,
        model: &str,
        config: JudgmentConfig,
    ) -> Self {
        Self {
            client,
            model: model.to_string(),
            config,
        }
    }

    /// Judge a single redline.
    ///
    /// Transport errors retry with backoff up to the configured attempt
    /// count. A reply that violates the output contract earns exactly one
    /// corrective retry; a second violation is a terminal error for this
    /// redline only.
    pub fn judge_one(
        &self,
        redline: &Redline,
        rule: Option<(usize, &Rule)>,
        include_counter: bool,
    ) -> Result<Verdict, JudgmentError> {
        let policy = RetryPolicy::new(self.config.max_attempts, self.config.base_backoff);
        let prompt = build_judgment_prompt(
            redline,
            rule.map(|(_, r)| r),
            include_counter,
            self.config.max_context_chars,
        );
        let matched_rule = rule.map(|(index, _)| index);

        let reply = with_retry(
            &policy,
            "judgment",
            || self.client.complete(&self.model, JUDGMENT_SYSTEM_PROMPT, &prompt),
            |e| e.is_transient(),
        )?;

        match parse_verdict_response(&reply, redline.id, matched_rule, include_counter) {
            Ok(verdict) => Ok(verdict),
            Err(JudgmentError::MalformedResponse(first_violation)) => {
                tracing::warn!(
                    redline_id = redline.id,
                    error = %first_violation,
                    "Model reply violated the verdict contract, retrying with correction"
                );
                let corrective = format!("{prompt}\n\n{CORRECTION_INSTRUCTION}");
                let reply = with_retry(
                    &policy,
                    "judgment-correction",
                    || {
                        self.client
                            .complete(&self.model, JUDGMENT_SYSTEM_PROMPT, &corrective)
                    },
                    |e| e.is_transient(),
                )?;
                parse_verdict_response(&reply, redline.id, matched_rule, include_counter)
            }
            Err(other) => Err(other),
        }
    }

    /// Judge a batch of redlines with bounded fan-out.
    ///
    /// Per-redline failures are recorded, never propagated, so sibling
    /// redlines keep their verdicts. The only batch-level error is the
    /// document deadline, which cancels outstanding work and fails the
    /// batch as a whole.
    pub fn judge_batch(
        &self,
        jobs: &[JudgmentJob<'_>],
        include_counter: bool,
    ) -> Result<BatchOutcome, JudgmentError> {
        let total = jobs.len();
        if total == 0 {
            return Ok(BatchOutcome::default());
        }

        let deadline = Instant::now() + self.config.document_timeout;
        let cancelled = AtomicBool::new(false);
        let next = AtomicUsize::new(0);
        let results: Vec<Mutex<Option<Result<Verdict, JudgmentError>>>> =
            (0..total).map(|_| Mutex::new(None)).collect();

        let workers = self.config.fan_out.clamp(1, total);
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    if Instant::now() >= deadline {
                        cancelled.store(true, Ordering::Relaxed);
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= total {
                        break;
                    }
                    let job = &jobs[index];
                    let result = self.judge_one(job.redline, job.rule, include_counter);
                    *results[index].lock().expect("result slot poisoned") = Some(result);
                });
            }
        });

        let completed = results
            .iter()
            .filter(|cell| cell.lock().expect("result slot poisoned").is_some())
            .count();

        // A worker can trip the deadline flag while the last job is already
        // done; only an actually-incomplete batch is a timeout.
        if cancelled.load(Ordering::Relaxed) && completed < total {
            tracing::error!(
                completed,
                total,
                "Document judgment deadline exceeded, cancelling batch"
            );
            return Err(JudgmentError::DocumentTimeout { completed, total });
        }

        // Workers only stop early on cancellation, so every slot is filled
        // here. Re-assemble in original redline order.
        let mut outcome = BatchOutcome::default();
        for (index, cell) in results.into_iter().enumerate() {
            let slot = cell.into_inner().expect("result slot poisoned");
            match slot.expect("uncancelled batch left a slot empty") {
                Ok(verdict) => outcome.verdicts.push(verdict),
                Err(e) => {
                    tracing::warn!(
                        redline_id = jobs[index].redline.id,
                        error = %e,
                        "Judgment failed for redline, recording failure"
                    );
                    outcome
                        .failures
                        .push(JudgmentFailure::new(jobs[index].redline.id, e.to_string()));
                }
            }
        }
        Ok(outcome)
    }
}
