//! Implements InputPort. Inquire-based interactive prompts.
//!
//! Main menu -> start/resume an exam, sync results, history, sign out. The
//! exam loop renders one question at a time and checkpoints the timer at the
//! configured cadence.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use inquire::{Confirm, InquireError, MultiSelect, Select};

use crate::domain::{DomainError, Question, UserScope};
use crate::ports::{Identity, InputPort};
use crate::usecases::scoring::{HistoryStats, ScoreSummary, ScoringEngine};
use crate::usecases::session::{ExamSession, ExamSessionEngine};
use crate::usecases::sync_service::SyncEngine;

fn prompt_err(e: InquireError) -> DomainError {
    DomainError::Storage(format!("prompt failed: {e}"))
}

/// Rate-limits timer checkpoints to the configured cadence so every
/// interaction does not become a storage write. The first call is always due.
struct CheckpointGate {
    cadence: Duration,
    last: Option<Instant>,
}

impl CheckpointGate {
    fn new(cadence: Duration) -> Self {
        Self { cadence, last: None }
    }

    fn due(&mut self, now: Instant) -> bool {
        let due = self
            .last
            .is_none_or(|last| now.duration_since(last) >= self.cadence);
        if due {
            self.last = Some(now);
        }
        due
    }
}

/// TUI adapter. Inquire prompts over the exam engines.
pub struct TuiInputPort {
    session: Arc<ExamSessionEngine>,
    scoring: Arc<ScoringEngine>,
    sync: Arc<SyncEngine>,
    identity: Arc<dyn Identity>,
    /// (id, display name) of every available exam type.
    exam_types: Vec<(String, String)>,
    /// Minimum interval between timer checkpoints during an exam.
    checkpoint: Duration,
}

impl TuiInputPort {
    pub fn new(
        session: Arc<ExamSessionEngine>,
        scoring: Arc<ScoringEngine>,
        sync: Arc<SyncEngine>,
        identity: Arc<dyn Identity>,
        exam_types: Vec<(String, String)>,
        checkpoint: Duration,
    ) -> Self {
        Self {
            session,
            scoring,
            sync,
            identity,
            exam_types,
            checkpoint,
        }
    }

    async fn current_scope(&self) -> UserScope {
        UserScope::from_user_id(self.identity.current_user_id().await)
    }

    async fn start_exam(&self, scope: &UserScope) -> Result<(), DomainError> {
        if self.exam_types.is_empty() {
            println!("No exam types in the catalog.");
            return Ok(());
        }
        let labels: Vec<String> = self
            .exam_types
            .iter()
            .map(|(id, name)| format!("{name} ({id})"))
            .collect();
        let picked = Select::new("Exam type", labels.clone())
            .prompt()
            .map_err(prompt_err)?;
        let index = labels.iter().position(|l| *l == picked).unwrap_or(0);
        let exam_type_id = self.exam_types[index].0.clone();

        match self.session.start_exam(scope, &exam_type_id).await {
            Ok(session) => self.run_exam_loop(scope, session).await,
            Err(DomainError::AlreadyInProgress) => {
                println!("An exam is already in progress; resume or abandon it first.");
                Ok(())
            }
            Err(DomainError::InsufficientQuestions(shortfalls)) => {
                println!("Not enough approved questions to build this exam:");
                for s in shortfalls {
                    println!("  {}: need {}, have {}", s.domain, s.required, s.available);
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn resume_exam(&self, scope: &UserScope) -> Result<(), DomainError> {
        match self.session.resume_exam(scope).await? {
            Some(session) => {
                println!(
                    "Resuming with {} remaining.",
                    format_ms(session.attempt.remaining_time_ms)
                );
                self.run_exam_loop(scope, session).await
            }
            None => {
                println!("No exam to resume.");
                Ok(())
            }
        }
    }

    /// One question at a time. The timer is re-persisted at the configured
    /// checkpoint cadence, so a killed process loses at most one checkpoint
    /// interval of timer accuracy.
    async fn run_exam_loop(
        &self,
        scope: &UserScope,
        mut session: ExamSession,
    ) -> Result<(), DomainError> {
        let started = Instant::now();
        let budget_ms = session.attempt.remaining_time_ms;
        let mut index = 0usize;
        let mut gate = CheckpointGate::new(self.checkpoint);

        loop {
            let remaining_ms = budget_ms - started.elapsed().as_millis() as i64;
            if gate.due(Instant::now()) {
                self.session
                    .persist_remaining_time(scope, &session.attempt.id, remaining_ms)
                    .await?;
            }
            if remaining_ms <= 0 {
                println!("Time is up, submitting.");
                let summary = self.session.submit_exam(scope, &session.attempt.id).await?;
                print_summary(&summary);
                return Ok(());
            }

            let position =
                ExamSessionEngine::navigate_to_question(&session.answers, &session.questions, index)?;
            render_question(position.index, session.questions.len(), position.question);
            let answer = position.answer;
            if answer.is_answered() {
                println!("  current answer: {:?}", answer.selected);
            }
            if answer.is_flagged {
                println!("  [flagged for review]");
            }

            let actions = vec!["Answer", "Flag", "Next", "Previous", "Jump", "Submit", "Abandon"];
            let action = Select::new(
                &format!("[{} left]", format_ms(remaining_ms)),
                actions,
            )
            .prompt()
            .map_err(prompt_err)?;

            match action {
                "Answer" => {
                    let question = &session.questions[index];
                    let labels: Vec<String> = question
                        .options
                        .iter()
                        .map(|o| format!("{}: {}", o.id, o.text))
                        .collect();
                    let chosen = MultiSelect::new("Select answer(s)", labels.clone())
                        .prompt()
                        .map_err(prompt_err)?;
                    let selected: BTreeSet<String> = question
                        .options
                        .iter()
                        .zip(labels.iter())
                        .filter(|(_, label)| chosen.contains(label))
                        .map(|(o, _)| o.id.clone())
                        .collect();
                    if selected.is_empty() {
                        println!("Nothing selected; answer unchanged.");
                        continue;
                    }
                    let question_id = question.id.clone();
                    let updated = self
                        .session
                        .save_answer(scope, &session.attempt.id, &question_id, selected)
                        .await?;
                    session.answers[index] = updated;
                }
                "Flag" => {
                    let question_id = session.questions[index].id.clone();
                    let flagged = self
                        .session
                        .toggle_question_flag(scope, &session.attempt.id, &question_id)
                        .await?;
                    session.answers[index].is_flagged = flagged;
                }
                "Next" => {
                    if index + 1 < session.questions.len() {
                        index += 1;
                    }
                }
                "Previous" => {
                    index = index.saturating_sub(1);
                }
                "Jump" => {
                    let targets: Vec<String> = (1..=session.questions.len())
                        .map(|n| n.to_string())
                        .collect();
                    let picked = Select::new("Question number", targets)
                        .prompt()
                        .map_err(prompt_err)?;
                    if let Ok(n) = picked.parse::<usize>() {
                        index = n - 1;
                    }
                }
                "Submit" => {
                    let unanswered = session.answers.iter().filter(|a| !a.is_answered()).count();
                    if unanswered > 0 {
                        let go = Confirm::new(&format!("{unanswered} unanswered. Submit anyway?"))
                            .with_default(false)
                            .prompt()
                            .map_err(prompt_err)?;
                        if !go {
                            continue;
                        }
                    }
                    let summary = self.session.submit_exam(scope, &session.attempt.id).await?;
                    print_summary(&summary);
                    return Ok(());
                }
                "Abandon" => {
                    let go = Confirm::new("Abandon this attempt? It cannot be resumed.")
                        .with_default(false)
                        .prompt()
                        .map_err(prompt_err)?;
                    if go {
                        self.session.abandon_exam(scope, &session.attempt.id).await?;
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    async fn sync_results(&self, scope: &UserScope) -> Result<(), DomainError> {
        let Some(user_id) = scope.user_id().map(str::to_string) else {
            println!("Sign in to sync results; anonymous results stay local.");
            return Ok(());
        };
        let pending = self.sync.sync_pending_attempts(&user_id).await?;
        println!("Pending pass: {} synced, {} failed.", pending.synced, pending.failed);
        let retried = self.sync.retry_failed_attempts(&user_id).await?;
        println!(
            "Retry pass: {} synced, {} failed, {} skipped.",
            retried.synced, retried.failed, retried.skipped
        );
        Ok(())
    }

    async fn show_history(&self, scope: &UserScope) -> Result<(), DomainError> {
        let local = self.scoring.local_history(scope).await?;
        let synced = self.scoring.synced_history(scope).await?;
        print_history("Local (all results)", &local);
        print_history("Synced (server view)", &synced);
        Ok(())
    }

    async fn sign_out(&self, scope: &UserScope) -> Result<(), DomainError> {
        if scope.user_id().is_none() {
            println!("Not signed in.");
            return Ok(());
        }
        let go = Confirm::new("Sign out? Local exam data for this account will be removed.")
            .with_default(false)
            .prompt()
            .map_err(prompt_err)?;
        if go {
            self.sync.handle_sign_out(scope).await?;
            self.identity.sign_out().await?;
            println!("Signed out.");
        }
        Ok(())
    }
}

#[async_trait]
impl InputPort for TuiInputPort {
    async fn run(&self) -> Result<(), DomainError> {
        loop {
            let scope = self.current_scope().await;
            let who = scope.user_id().unwrap_or("anonymous").to_string();

            let mut options = vec!["Start exam"];
            if self.session.has_in_progress_exam(&scope).await? {
                options.insert(0, "Resume exam");
            }
            options.extend(["Sync results", "History", "Sign out", "Quit"]);

            let choice = Select::new(&format!("cert-prep ({who})"), options)
                .prompt()
                .map_err(prompt_err)?;

            match choice {
                "Start exam" => self.start_exam(&scope).await?,
                "Resume exam" => self.resume_exam(&scope).await?,
                "Sync results" => self.sync_results(&scope).await?,
                "History" => self.show_history(&scope).await?,
                "Sign out" => self.sign_out(&scope).await?,
                _ => return Ok(()),
            }
        }
    }
}

fn render_question(index: usize, total: usize, question: &Question) {
    println!();
    println!("Question {}/{} [{}]", index + 1, total, question.domain);
    println!("{}", question.content.body());
}

fn print_summary(summary: &ScoreSummary) {
    println!();
    println!(
        "Score: {}% ({}/{}) {}",
        summary.score,
        summary.correct_count,
        summary.total_questions,
        if summary.passed { "PASS" } else { "FAIL" }
    );
    println!("Time: {}", format_ms(summary.time_spent_ms));
    for domain in &summary.domains {
        println!(
            "  {}: {}% ({}/{}) {:?}",
            domain.domain_name, domain.percentage, domain.correct, domain.total, domain.strength
        );
    }
}

fn print_history(title: &str, stats: &HistoryStats) {
    println!(
        "{title}: {} attempts, {} passed, avg {:.1}%, best {}%",
        stats.attempts, stats.passed, stats.average_score, stats.best_score
    );
}

fn format_ms(ms: i64) -> String {
    let total_secs = (ms.max(0)) / 1_000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_gate_holds_between_intervals() {
        let mut gate = CheckpointGate::new(Duration::from_secs(30));
        let start = Instant::now();

        assert!(gate.due(start), "first checkpoint is immediate");
        assert!(!gate.due(start + Duration::from_secs(10)));
        assert!(!gate.due(start + Duration::from_secs(29)));
        assert!(gate.due(start + Duration::from_secs(31)));
        assert!(!gate.due(start + Duration::from_secs(40)));
    }

    #[test]
    fn zero_cadence_checkpoints_every_time() {
        let mut gate = CheckpointGate::new(Duration::ZERO);
        let now = Instant::now();
        assert!(gate.due(now));
        assert!(gate.due(now));
    }
}
