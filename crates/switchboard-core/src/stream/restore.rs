//! Sensitive-value restoration for streamed responses
//!
//! Backend output may contain placeholder tokens of the shape `<TYPE_N>`
//! standing in for redacted sensitive text. Tokens can be split across
//! arbitrarily many stream fragments, so a bounded buffer holds back any
//! tail that looks like the start of a placeholder until it either completes
//! or turns out to be ordinary text. No byte is duplicated or dropped:
//! concatenated output equals the restored input.

use super::transformer::StreamTransformer;
use crate::types::{StreamChunk, TokenStream};
use dashmap::DashMap;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A complete placeholder token: `<EMAIL_1>`, `<PHONE_23>`, ...
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Z_]+_[0-9]+>").expect("placeholder pattern is valid"));

/// A tail that could still grow into a placeholder: `<`, `<EMA`, `<EMAIL_`
static PARTIAL_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<[A-Z_]*$").expect("partial pattern is valid"));

/// A tail with the index started but no closing bracket yet: `<EMAIL_12`
static PARTIAL_INDEXED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<[A-Z_]+_[0-9]*$").expect("partial pattern is valid"));

/// Maps placeholder tokens back to their original sensitive text
///
/// External-collaborator seam: the detector/tokenizer that produced the
/// placeholders owns the real mapping; the gateway only consumes restore.
pub trait PlaceholderResolver: Send + Sync {
    /// Original text for a full placeholder token (e.g. `<EMAIL_1>`)
    fn resolve(&self, placeholder: &str) -> Option<String>;
}

/// In-memory placeholder vault
#[derive(Debug, Default)]
pub struct TokenVault {
    entries: DashMap<String, String>,
}

impl TokenVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a placeholder token and the text it stands for
    pub fn insert(&self, placeholder: impl Into<String>, original: impl Into<String>) {
        self.entries.insert(placeholder.into(), original.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PlaceholderResolver for TokenVault {
    fn resolve(&self, placeholder: &str) -> Option<String> {
        self.entries.get(placeholder).map(|e| e.value().clone())
    }
}

/// Configuration for the restoration buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Longest tail treated as a potential placeholder before it is released
    /// as ordinary text
    pub max_token_len: usize,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self { max_token_len: 64 }
    }
}

/// Per-stream sliding buffer; exactly one lives per in-flight stream
struct FragmentBuffer {
    buf: String,
    resolver: Arc<dyn PlaceholderResolver>,
    max_token_len: usize,
}

impl FragmentBuffer {
    fn new(resolver: Arc<dyn PlaceholderResolver>, config: &RestoreConfig) -> Self {
        Self {
            buf: String::new(),
            resolver,
            max_token_len: config.max_token_len,
        }
    }

    /// Absorb one fragment and return the text that is safe to emit
    fn push(&mut self, fragment: &str) -> String {
        self.buf.push_str(fragment);

        if PLACEHOLDER.is_match(&self.buf) {
            self.buf = restore_all(&self.buf, self.resolver.as_ref());
        }

        match self.partial_tail_start() {
            Some(pos) => self.buf.drain(..pos).collect(),
            None => std::mem::take(&mut self.buf),
        }
    }

    /// Emit whatever remains, restoring what can be restored
    ///
    /// An unresolved trailing placeholder is emitted literally; dropping it
    /// would violate byte equality.
    fn flush(&mut self) -> String {
        if self.buf.is_empty() {
            return String::new();
        }
        let rest = std::mem::take(&mut self.buf);
        restore_all(&rest, self.resolver.as_ref())
    }

    /// Byte offset where a potential placeholder begins at the buffer tail
    fn partial_tail_start(&self) -> Option<usize> {
        let pos = self.buf.rfind('<')?;
        let tail = &self.buf[pos..];
        if tail.len() > self.max_token_len {
            // Too long to be a real token, release it as text
            return None;
        }
        if PARTIAL_BARE.is_match(tail) || PARTIAL_INDEXED.is_match(tail) {
            Some(pos)
        } else {
            None
        }
    }
}

fn restore_all(text: &str, resolver: &dyn PlaceholderResolver) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            match resolver.resolve(token) {
                Some(original) => original,
                None => {
                    tracing::debug!(token, "unresolvable placeholder left literal");
                    token.to_string()
                }
            }
        })
        .into_owned()
}

/// Stream transformer restoring placeholder tokens in flight
pub struct RestorationTransformer {
    resolver: Arc<dyn PlaceholderResolver>,
    config: RestoreConfig,
}

impl RestorationTransformer {
    pub fn new(resolver: Arc<dyn PlaceholderResolver>, config: RestoreConfig) -> Self {
        Self { resolver, config }
    }
}

impl StreamTransformer for RestorationTransformer {
    fn process(&self, stream: TokenStream) -> TokenStream {
        let buffer = FragmentBuffer::new(self.resolver.clone(), &self.config);
        let stream = stream.fuse();

        Box::pin(futures::stream::unfold(
            (stream, buffer, false),
            |(mut stream, mut buffer, done)| async move {
                if done {
                    return None;
                }
                match stream.next().await {
                    Some(Ok(mut chunk)) => {
                        if let Some(content) = chunk.content.take() {
                            let mut emitted = buffer.push(&content);
                            if chunk.is_final {
                                emitted.push_str(&buffer.flush());
                            }
                            chunk.content = (!emitted.is_empty()).then_some(emitted);
                        } else if chunk.is_final {
                            let rest = buffer.flush();
                            if !rest.is_empty() {
                                chunk.content = Some(rest);
                            }
                        }
                        Some((Ok(chunk), (stream, buffer, false)))
                    }
                    Some(Err(e)) => Some((Err(e), (stream, buffer, false))),
                    None => {
                        // Upstream ended without a terminal chunk
                        let rest = buffer.flush();
                        if rest.is_empty() {
                            None
                        } else {
                            Some((Ok(StreamChunk::content(rest)), (stream, buffer, true)))
                        }
                    }
                }
            },
        ))
    }

    fn priority(&self) -> i32 {
        10
    }

    fn name(&self) -> &str {
        "restoration"
    }
}
