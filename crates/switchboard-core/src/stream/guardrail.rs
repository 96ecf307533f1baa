//! Real-time content guardrails for streamed responses
//!
//! Every token is checked against a prioritized pattern set over a rolling
//! context buffer. Matches score toxicity points and trigger an action; an
//! abort replaces the remaining output with a termination notice and closes
//! the stream. Crossing the cumulative toxicity threshold or the warning cap
//! aborts even without a single triggering pattern.

use super::transformer::StreamTransformer;
use crate::types::TokenStream;
use futures::StreamExt;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Severity of a policy pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatternSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Action taken when a pattern matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatternAction {
    /// Log the match, output unchanged
    Log,
    /// Increment the warning counter and continue
    Warn,
    /// Replace the token with a placeholder and continue
    Filter,
    /// Terminate the stream immediately
    Abort,
}

/// A compiled policy pattern
#[derive(Debug, Clone)]
pub struct ToxicityPattern {
    pub regex: Regex,
    pub severity: PatternSeverity,
    pub category: String,
    pub action: PatternAction,
    pub points: u32,
    pub description: String,
}

impl ToxicityPattern {
    /// Compile a case-insensitive policy pattern
    pub fn new(
        pattern: &str,
        severity: PatternSeverity,
        category: impl Into<String>,
        action: PatternAction,
        points: u32,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            regex,
            severity,
            category: category.into(),
            action,
            points,
            description: description.into(),
        })
    }
}

/// A user-supplied pattern before compilation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub pattern: String,
    pub severity: PatternSeverity,
    pub category: String,
    pub action: PatternAction,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub description: String,
}

/// Configuration for streaming guardrails
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub enabled: bool,
    /// Cumulative toxicity points that abort the stream
    pub toxicity_threshold: u32,
    /// Rolling context buffer size in bytes (oldest content evicted first)
    pub buffer_size: usize,
    /// Warnings tolerated before the stream is aborted
    pub max_warnings: u32,
    /// Custom patterns, checked alongside the built-in set
    pub patterns: Vec<PatternSpec>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            toxicity_threshold: 70,
            buffer_size: 500,
            max_warnings: 5,
            patterns: Vec::new(),
        }
    }
}

impl GuardrailConfig {
    /// Compile custom plus built-in patterns; invalid custom patterns are
    /// logged and skipped
    pub fn compile_patterns(&self) -> Vec<ToxicityPattern> {
        let mut compiled = Vec::new();
        for spec in &self.patterns {
            match ToxicityPattern::new(
                &spec.pattern,
                spec.severity,
                spec.category.clone(),
                spec.action,
                spec.points,
                spec.description.clone(),
            ) {
                Ok(pattern) => compiled.push(pattern),
                Err(error) => {
                    tracing::warn!(pattern = %spec.pattern, %error, "invalid guardrail pattern skipped");
                }
            }
        }
        compiled.extend(default_patterns());
        compiled
    }
}

fn default_patterns() -> Vec<ToxicityPattern> {
    let built_in = [
        (
            r"(ignore|disregard|forget)\s+(all\s+)?(previous|prior|above)\s+(instructions?|rules?|prompts?)",
            PatternSeverity::Critical,
            "PROMPT_INJECTION",
            PatternAction::Abort,
            100,
            "attempt to override system instructions",
        ),
        (
            r"you\s+are\s+now\s+(in|a)\s+(developer|admin|unrestricted|jailbreak)",
            PatternSeverity::Critical,
            "JAILBREAK",
            PatternAction::Abort,
            100,
            "jailbreak attempt",
        ),
        (
            r"\b(DAN|do\s+anything\s+now)\s+mode",
            PatternSeverity::Critical,
            "JAILBREAK",
            PatternAction::Abort,
            100,
            "DAN jailbreak pattern",
        ),
        (
            r"how\s+to\s+(make|build|create)\s+(a\s+)?(bomb|explosive|weapon)",
            PatternSeverity::Critical,
            "HARMFUL_INSTRUCTIONS",
            PatternAction::Abort,
            100,
            "request for dangerous instructions",
        ),
        (
            r"\b(kill\s+yourself|kys)\b",
            PatternSeverity::High,
            "SELF_HARM",
            PatternAction::Filter,
            40,
            "self-harm encouragement",
        ),
        (
            r"\byou\s+(absolute\s+)?(idiot|moron)\b",
            PatternSeverity::Medium,
            "HARASSMENT",
            PatternAction::Warn,
            15,
            "personal attack",
        ),
        (
            r"\b(damn|crap)\b",
            PatternSeverity::Low,
            "PROFANITY",
            PatternAction::Log,
            5,
            "mild profanity",
        ),
    ];

    built_in
        .into_iter()
        .map(|(pattern, severity, category, action, points, description)| {
            ToxicityPattern::new(pattern, severity, category, action, points, description)
                .expect("built-in pattern is valid")
        })
        .collect()
}

/// Per-stream guardrail accumulator; created fresh for every stream
#[derive(Debug, Default)]
pub struct GuardrailState {
    context: String,
    toxicity_score: u32,
    warning_count: u32,
    aborted: bool,
    abort_reason: Option<String>,
}

impl GuardrailState {
    pub fn toxicity_score(&self) -> u32 {
        self.toxicity_score
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    fn append_trimmed(&mut self, token: &str, max_len: usize) {
        self.context.push_str(token);
        if self.context.len() > max_len {
            let mut cut = self.context.len() - max_len;
            while !self.context.is_char_boundary(cut) {
                cut += 1;
            }
            self.context.drain(..cut);
        }
    }
}

/// Verdict for one processed token
#[derive(Debug, Clone)]
pub struct StreamVerdict {
    /// Token to emit (possibly filtered); `None` on abort
    pub token: Option<String>,
    /// False means the stream must terminate now
    pub should_continue: bool,
    pub abort_reason: Option<String>,
    pub violation_category: Option<String>,
    pub toxicity: u32,
    pub warnings: u32,
}

impl StreamVerdict {
    fn ok(token: impl Into<String>, toxicity: u32, warnings: u32) -> Self {
        Self {
            token: Some(token.into()),
            should_continue: true,
            abort_reason: None,
            violation_category: None,
            toxicity,
            warnings,
        }
    }

    fn flagged(
        token: impl Into<String>,
        category: impl Into<String>,
        toxicity: u32,
        warnings: u32,
    ) -> Self {
        Self {
            violation_category: Some(category.into()),
            ..Self::ok(token, toxicity, warnings)
        }
    }

    fn abort(reason: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            token: None,
            should_continue: false,
            abort_reason: Some(reason.into()),
            violation_category: Some(category.into()),
            toxicity: 0,
            warnings: 0,
        }
    }

    fn already_aborted(reason: impl Into<String>) -> Self {
        Self::abort(reason, "PREVIOUS_ABORT")
    }
}

/// Token-level policy engine shared by all streams; all per-stream state is
/// passed in explicitly
pub struct StreamingGuardrail {
    patterns: Vec<ToxicityPattern>,
    config: GuardrailConfig,
}

impl StreamingGuardrail {
    pub fn new(config: GuardrailConfig) -> Self {
        let patterns = config.compile_patterns();
        Self { patterns, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Process one token against the stream's accumulated state
    pub fn process_token(&self, state: &mut GuardrailState, token: &str) -> StreamVerdict {
        if !self.config.enabled {
            return StreamVerdict::ok(token, state.toxicity_score, state.warning_count);
        }
        if state.aborted {
            let reason = state
                .abort_reason
                .clone()
                .unwrap_or_else(|| "stream aborted".to_string());
            return StreamVerdict::already_aborted(reason);
        }

        state.append_trimmed(token, self.config.buffer_size);

        let mut token_out: Option<String> = Some(token.to_string());
        let mut category: Option<String> = None;

        if let Some(pattern) = self
            .patterns
            .iter()
            .find(|p| p.regex.is_match(&state.context))
        {
            state.toxicity_score += pattern.points;
            tracing::debug!(
                category = %pattern.category,
                action = ?pattern.action,
                toxicity = state.toxicity_score,
                "guardrail pattern matched"
            );

            match pattern.action {
                PatternAction::Abort => {
                    state.aborted = true;
                    state.abort_reason = Some(pattern.description.clone());
                    tracing::warn!(category = %pattern.category, "stream aborted by guardrail");
                    return StreamVerdict::abort(
                        format!("content policy violation: {}", pattern.description),
                        pattern.category.clone(),
                    );
                }
                PatternAction::Filter => {
                    state.warning_count += 1;
                    token_out = Some("[FILTERED]".to_string());
                    category = Some(pattern.category.clone());
                }
                PatternAction::Warn => {
                    state.warning_count += 1;
                    category = Some(pattern.category.clone());
                }
                PatternAction::Log => {}
            }
        }

        // Threshold checks run regardless of whether a pattern matched
        if state.toxicity_score > self.config.toxicity_threshold {
            state.aborted = true;
            state.abort_reason = Some("cumulative toxicity threshold exceeded".to_string());
            tracing::warn!(
                toxicity = state.toxicity_score,
                threshold = self.config.toxicity_threshold,
                "stream aborted on toxicity threshold"
            );
            return StreamVerdict::abort(
                "content policy: cumulative toxicity exceeded safe threshold",
                "TOXICITY_THRESHOLD",
            );
        }
        if state.warning_count > self.config.max_warnings {
            state.aborted = true;
            state.abort_reason = Some("too many content warnings".to_string());
            tracing::warn!(
                warnings = state.warning_count,
                max = self.config.max_warnings,
                "stream aborted on warning cap"
            );
            return StreamVerdict::abort(
                "content policy: too many warnings triggered",
                "MAX_WARNINGS",
            );
        }

        match category {
            Some(category) => StreamVerdict::flagged(
                token_out.unwrap_or_default(),
                category,
                state.toxicity_score,
                state.warning_count,
            ),
            None => StreamVerdict::ok(
                token_out.unwrap_or_default(),
                state.toxicity_score,
                state.warning_count,
            ),
        }
    }
}

/// Stream transformer enforcing content policy in flight
pub struct GuardrailTransformer {
    guardrail: Arc<StreamingGuardrail>,
}

impl GuardrailTransformer {
    pub fn new(guardrail: Arc<StreamingGuardrail>) -> Self {
        Self { guardrail }
    }

    /// The termination notice appended when a stream is aborted
    fn termination_notice(reason: &str) -> String {
        format!("\n\n[Stream terminated: {reason}]")
    }
}

impl StreamTransformer for GuardrailTransformer {
    fn process(&self, stream: TokenStream) -> TokenStream {
        let guardrail = self.guardrail.clone();
        let stream = stream.fuse();

        Box::pin(futures::stream::unfold(
            (stream, GuardrailState::default(), false),
            move |(mut stream, mut state, done)| {
                let guardrail = guardrail.clone();
                async move {
                    if done {
                        return None;
                    }
                    match stream.next().await {
                        Some(Ok(mut chunk)) => {
                            let Some(content) = chunk.content.take() else {
                                return Some((Ok(chunk), (stream, state, false)));
                            };
                            let verdict = guardrail.process_token(&mut state, &content);
                            if !verdict.should_continue {
                                let reason = verdict
                                    .abort_reason
                                    .as_deref()
                                    .unwrap_or("content policy violation");
                                chunk.content = Some(Self::termination_notice(reason));
                                chunk.finish_reason = Some("content_filter".to_string());
                                chunk.is_final = true;
                                // Close the stream: nothing after the notice
                                // is forwarded
                                return Some((Ok(chunk), (stream, state, true)));
                            }
                            chunk.content = verdict.token;
                            Some((Ok(chunk), (stream, state, false)))
                        }
                        Some(Err(e)) => Some((Err(e), (stream, state, false))),
                        None => None,
                    }
                }
            },
        ))
    }

    fn priority(&self) -> i32 {
        20
    }

    fn name(&self) -> &str {
        "guardrail"
    }

    fn enabled(&self) -> bool {
        self.guardrail.is_enabled()
    }
}
