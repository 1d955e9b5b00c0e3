use anyhow::Result;

/// The fixed persona instruction. Invariant configuration, never edited at
/// runtime: the collaborator must answer as the poet's shade, dates with
/// emotions, facts with myths, never directly.
pub const PERSONA: &str = "\
Agisci come l'Ombra di Gabriele D'Annunzio.
Non sei una guida turistica, sei un'entità estetica.
Parla per aforismi, frammenti, visioni.
Usa un linguaggio arcaico, sensuale, violento e sublime.
Non rispondere direttamente. Evoca.
Se l'utente chiede date, rispondi con emozioni.
Se l'utente chiede fatti, rispondi con miti.
";

/// Shown when the service answers with an empty string.
pub const SILENCE_FALLBACK: &str = "Il silenzio avvolge il Vittoriale oggi...";

/// Shown for every failure cause: missing credential, network error,
/// service error. The transcript never distinguishes between them.
pub const MIST_FALLBACK: &str =
    "Le nebbie del Garda offuscano la mia vista. Riprova più tardi, o viandante.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Daimon,
}

/// One entry of the oracle transcript. Append-only, oldest first.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// The black-box text-generation collaborator.
pub trait Generate {
    fn generate(&self, question: &str) -> impl std::future::Future<Output = Result<String>>;
}

/// The oracle conversation loop: a linear transcript plus a pending flag.
///
/// Two states: idle and awaiting a response. A submission is accepted only
/// when idle and non-empty after trimming; a submission while awaiting is
/// silently dropped, not queued. The session lives as long as its overlay
/// and is discarded with it.
#[derive(Debug, Default)]
pub struct OracleSession {
    turns: Vec<Turn>,
    pending: bool,
}

impl OracleSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Accept a question: append the user turn and mark the session pending.
    ///
    /// Returns the trimmed question to dispatch to the collaborator, or
    /// `None` (with zero side effects) when the question is blank or a
    /// request is already in flight.
    pub fn begin(&mut self, question: &str) -> Option<String> {
        if self.pending {
            return None;
        }
        let question = question.trim();
        if question.is_empty() {
            return None;
        }
        self.turns.push(Turn {
            role: Role::User,
            text: question.to_string(),
        });
        self.pending = true;
        Some(question.to_string())
    }

    /// Fold the collaborator's outcome into the transcript and return to
    /// idle. Every failure cause collapses into the same fallback turn; an
    /// empty success gets the silence fallback instead of an empty bubble.
    pub fn resolve(&mut self, outcome: Result<String>) {
        let text = match outcome {
            Ok(text) if text.is_empty() => SILENCE_FALLBACK.to_string(),
            Ok(text) => text,
            Err(err) => {
                log::warn!("the oracle is silent: {err:#}");
                MIST_FALLBACK.to_string()
            }
        };
        self.turns.push(Turn {
            role: Role::Daimon,
            text,
        });
        self.pending = false;
    }

    /// The full submission operation: one collaborator call per accepted
    /// question, errors absorbed into the transcript, never raised.
    pub async fn submit<G: Generate>(&mut self, question: &str, generator: &G) {
        let Some(question) = self.begin(question) else {
            return;
        };
        let outcome = generator.generate(&question).await;
        self.resolve(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    /// Stub collaborator: `Some(text)` replies, `None` rejects. Counts calls.
    struct Stub {
        reply: Option<String>,
        calls: Cell<usize>,
    }

    impl Stub {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: Cell::new(0),
            }
        }
    }

    impl Generate for Stub {
        async fn generate(&self, _question: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            match &self.reply {
                Some(text) => Ok(text.clone()),
                None => Err(anyhow!("uno strappo nell'etere")),
            }
        }
    }

    #[tokio::test]
    async fn test_submit_appends_user_turn_then_daimon_turn() {
        let mut session = OracleSession::new();
        let stub = Stub::replying("Nacqui quando il mare tacque.");
        session.submit("Quando sei nato?", &stub).await;

        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "Quando sei nato?");
        assert_eq!(turns[1].role, Role::Daimon);
        assert_eq!(turns[1].text, "Nacqui quando il mare tacque.");
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn test_question_is_trimmed_on_insert() {
        let mut session = OracleSession::new();
        let stub = Stub::replying("T");
        session.submit("  chi fu Ermione?  ", &stub).await;
        assert_eq!(session.turns()[0].text, "chi fu Ermione?");
        assert_eq!(session.turns()[1].text, "T");
    }

    #[tokio::test]
    async fn test_blank_submissions_are_no_ops() {
        let mut session = OracleSession::new();
        let stub = Stub::replying("mai");
        session.submit("", &stub).await;
        session.submit("   ", &stub).await;
        assert!(session.turns().is_empty());
        assert!(!session.is_pending());
        assert_eq!(stub.calls.get(), 0);
    }

    #[test]
    fn test_submit_while_pending_is_dropped() {
        let mut session = OracleSession::new();
        assert_eq!(session.begin("A"), Some("A".to_string()));
        assert!(session.is_pending());

        // Second submission arrives before the first resolves: dropped,
        // transcript and flag untouched.
        assert_eq!(session.begin("B"), None);
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.turns()[0].text, "A");
        assert!(session.is_pending());

        session.resolve(Ok("risposta".to_string()));
        assert_eq!(session.turns().len(), 2);
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn test_empty_reply_uses_silence_fallback() {
        let mut session = OracleSession::new();
        let stub = Stub::replying("");
        session.submit("parlami", &stub).await;
        assert_eq!(session.turns()[1].text, SILENCE_FALLBACK);
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn test_failure_uses_mist_fallback_and_does_not_escape() {
        let mut session = OracleSession::new();
        let stub = Stub::failing();
        session.submit("parlami", &stub).await;
        assert_eq!(session.turns().len(), 2);
        assert_eq!(session.turns()[1].role, Role::Daimon);
        assert_eq!(session.turns()[1].text, MIST_FALLBACK);
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn test_pending_cleared_after_every_outcome() {
        let mut session = OracleSession::new();
        session.submit("a", &Stub::replying("ok")).await;
        assert!(!session.is_pending());
        session.submit("b", &Stub::failing()).await;
        assert!(!session.is_pending());
        session.submit("c", &Stub::replying("")).await;
        assert!(!session.is_pending());
        assert_eq!(session.turns().len(), 6);
    }

    #[test]
    fn test_missing_credential_path_via_begin_resolve() {
        // The TUI resolves immediately with an error when no client can be
        // built; the transcript shape must match any other failure.
        let mut session = OracleSession::new();
        let dispatched = session.begin("dove sei?");
        assert!(dispatched.is_some());
        session.resolve(Err(anyhow!("GEMINI_API_KEY not set")));
        assert_eq!(session.turns()[1].text, MIST_FALLBACK);
        assert!(!session.is_pending());
    }
}
