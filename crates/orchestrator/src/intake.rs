//! Inbound email webhook adapter
//!
//! Mailgun-style payloads are authenticated with
//! `HMAC-SHA256(signing_key, timestamp + token)`, classified by keyword into
//! an intent, and turned into a task for the intent's agent set.

use agent_hub_common::{
    AgentId, ExecutionMode, HubError, IntakeConfig, IntakeRoutes, IntentKind,
    SequentialFailurePolicy, Task, TaskOrigin,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::service::{SubmitTask, TaskService};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Fields of an inbound email webhook that the intake cares about
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEmail {
    pub timestamp: String,
    pub token: String,
    pub signature: String,
    /// Bare address extracted from the sender field
    pub sender: String,
    /// Subject with reply/forward prefixes removed
    pub subject: String,
    pub body: String,
}

static ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\s*([^<>\s]+@[^<>\s]+)\s*>").expect("valid address regex"));
static REPLY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(re|fw|fwd)\s*:\s*").expect("valid prefix regex"));

impl InboundEmail {
    pub fn from_form(form: &HashMap<String, String>) -> Result<Self, IntakeError> {
        let field = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| form.get(*name))
                .map(|value| value.trim())
                .find(|value| !value.is_empty())
                .map(str::to_string)
        };

        let timestamp = field(&["timestamp"]).ok_or(IntakeError::MissingField("timestamp"))?;
        let token = field(&["token"]).ok_or(IntakeError::MissingField("token"))?;
        let signature = field(&["signature"]).ok_or(IntakeError::MissingField("signature"))?;
        let sender = field(&["sender", "from", "From"]).ok_or(IntakeError::MissingField("sender"))?;
        let subject = field(&["subject", "Subject"]).unwrap_or_default();
        let body = field(&["stripped-text", "body-plain"]).unwrap_or_default();

        Ok(Self {
            timestamp,
            token,
            signature,
            sender: extract_address(&sender),
            subject: strip_reply_prefixes(&subject),
            body,
        })
    }

    /// Task description built from subject and body
    pub fn description(&self) -> String {
        match (self.subject.is_empty(), self.body.is_empty()) {
            (false, false) => format!("{}\n\n{}", self.subject, self.body),
            (false, true) => self.subject.clone(),
            (true, false) => self.body.clone(),
            (true, true) => format!("Email from {} with no content", self.sender),
        }
    }
}

fn extract_address(raw: &str) -> String {
    ADDRESS
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

fn strip_reply_prefixes(subject: &str) -> String {
    let mut current = subject.trim();
    while let Some(found) = REPLY_PREFIX.find(current) {
        current = current[found.end()..].trim_start();
    }
    current.to_string()
}

/// Checks webhook signatures; every payload fails when no key is configured
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    signing_key: Option<String>,
    max_age_secs: u64,
}

impl SignatureVerifier {
    pub fn new(signing_key: Option<String>, max_age_secs: u64) -> Self {
        Self {
            signing_key,
            max_age_secs,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.signing_key.is_some()
    }

    pub fn verify(&self, timestamp: &str, token: &str, signature: &str) -> bool {
        self.verify_at(timestamp, token, signature, Utc::now().timestamp())
    }

    pub fn verify_at(&self, timestamp: &str, token: &str, signature: &str, now: i64) -> bool {
        let Some(key) = &self.signing_key else {
            return false;
        };
        let Ok(sent_at) = timestamp.parse::<i64>() else {
            return false;
        };
        if self.max_age_secs > 0 && now.abs_diff(sent_at) > self.max_age_secs {
            return false;
        }
        let Ok(signature_bytes) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.as_bytes());
        mac.update(token.as_bytes());
        mac.verify_slice(&signature_bytes).is_ok()
    }

    /// Hex signature for `timestamp + token`, or `None` without a key
    pub fn sign(&self, timestamp: &str, token: &str) -> Option<String> {
        let key = self.signing_key.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).ok()?;
        mac.update(timestamp.as_bytes());
        mac.update(token.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

static BUG_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(bug|bugs|error|errors|crash|crashes|crashed|broken|fails?|failed|failing|failure|exception|not working|regression)\b",
    )
    .expect("valid bug regex")
});
static FEATURE_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(feature|features|enhancement|request|would like|wish|suggest|suggestion|add support|improve|improvement)\b",
    )
    .expect("valid feature regex")
});
static QUESTION_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\b(how|what|why|when|where|which|question|can i|is it possible)\b|\?)")
        .expect("valid question regex")
});

/// Keyword classifier; bug reports win over feature requests, which win
/// over questions
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn classify(&self, subject: &str, body: &str) -> IntentKind {
        let text = format!("{}\n{}", subject, body);
        if BUG_KEYWORDS.is_match(&text) {
            IntentKind::BugReport
        } else if FEATURE_KEYWORDS.is_match(&text) {
            IntentKind::FeatureRequest
        } else if QUESTION_KEYWORDS.is_match(&text) {
            IntentKind::Question
        } else {
            IntentKind::General
        }
    }
}

/// Maps an intent to the agents that handle it
#[derive(Debug, Clone)]
pub struct IntakeRouter {
    routes: IntakeRoutes,
}

impl IntakeRouter {
    pub fn new(routes: IntakeRoutes) -> Self {
        Self { routes }
    }

    pub fn route(&self, intent: IntentKind) -> (Vec<AgentId>, ExecutionMode) {
        (
            self.routes.agents_for(intent).to_vec(),
            ExecutionMode::Sequential {
                on_failure: SequentialFailurePolicy::EmptyContext,
            },
        )
    }
}

/// Webhook entry point: authenticate, classify, route, submit
pub struct EmailIntake {
    verifier: SignatureVerifier,
    classifier: IntentClassifier,
    router: IntakeRouter,
    service: Arc<TaskService>,
}

impl EmailIntake {
    pub fn new(config: &IntakeConfig, service: Arc<TaskService>) -> Self {
        let verifier = SignatureVerifier::new(config.signing_key.clone(), config.max_age_secs);
        if !verifier.is_configured() {
            warn!("No webhook signing key configured; inbound email will be rejected");
        }
        Self {
            verifier,
            classifier: IntentClassifier,
            router: IntakeRouter::new(config.routes.clone()),
            service,
        }
    }

    #[instrument(skip_all)]
    pub async fn handle(&self, form: &HashMap<String, String>) -> Result<Task, IntakeError> {
        let email = InboundEmail::from_form(form)?;

        if !self
            .verifier
            .verify(&email.timestamp, &email.token, &email.signature)
        {
            warn!(sender = %email.sender, "Rejected inbound email with invalid signature");
            return Err(IntakeError::InvalidSignature);
        }

        let intent = self.classifier.classify(&email.subject, &email.body);
        let (agents, mode) = self.router.route(intent);
        info!(sender = %email.sender, intent = %intent, agents = agents.len(), "Inbound email accepted");

        let task = self
            .service
            .submit(SubmitTask {
                description: email.description(),
                agents,
                mode,
                origin: TaskOrigin::Email {
                    sender: email.sender.clone(),
                    subject: email.subject.clone(),
                    intent,
                },
            })
            .await?;
        Ok(task)
    }
}
