// Token counting module
// Deterministic chat-message token accounting with tiktoken-rs (cl100k_base)
//
// The overhead model follows the published cl100k chat accounting convention:
// every message costs TOKENS_PER_MESSAGE on top of its string fields, a `name`
// field costs TOKENS_PER_NAME more, and every reply is primed with
// REPLY_PRIMING_TOKENS. Counts must stay numerically identical to that
// convention so runs remain comparable.

use once_cell::sync::OnceCell;
use tiktoken_rs::CoreBPE;

use crate::error::{ClientError, Result};
use crate::models::ChatMessage;

/// Name of the encoding used for all accounting
pub const ENCODING_NAME: &str = "cl100k_base";

/// Service tokens per message (<|start|>{role}<|message|> framing)
const TOKENS_PER_MESSAGE: usize = 3;

/// Extra token when a message carries a `name`
const TOKENS_PER_NAME: usize = 1;

/// Every reply is primed with <|start|>assistant<|message|>
const REPLY_PRIMING_TOKENS: usize = 3;

/// Process-wide encoding table, loaded once
static ENCODING: OnceCell<CoreBPE> = OnceCell::new();

/// Load the cl100k_base table, or return the already loaded one
fn load_encoding() -> Result<&'static CoreBPE> {
    ENCODING.get_or_try_init(|| {
        tracing::info!(encoding = ENCODING_NAME, "Initializing token counter");
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| ClientError::Tokenizer(format!("{}: {}", ENCODING_NAME, e)))?;
        tracing::info!(encoding = ENCODING_NAME, "Token counter initialized");
        Ok(bpe)
    })
}

/// Handle to the shared cl100k_base encoding.
///
/// Holding one proves the table loaded; counting never fails afterwards.
#[derive(Clone, Copy)]
pub struct TokenCounter {
    bpe: &'static CoreBPE,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoding", &ENCODING_NAME)
            .finish()
    }
}

impl TokenCounter {
    /// Initialize (idempotently) and return the counter.
    ///
    /// A failure here is fatal for the whole measurement run.
    pub fn cl100k_base() -> Result<Self> {
        Ok(Self {
            bpe: load_encoding()?,
        })
    }

    /// Number of tokens in a plain text span.
    ///
    /// Special-token markers in the text are encoded as ordinary text.
    pub fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }

    /// Counts tokens in a list of chat messages.
    ///
    /// Per message: TOKENS_PER_MESSAGE plus every string field (role, content,
    /// name), plus TOKENS_PER_NAME if a name is present. REPLY_PRIMING_TOKENS
    /// is added once at the end, so an empty list still costs 3.
    pub fn count_messages(&self, messages: &[ChatMessage]) -> usize {
        let mut total_tokens = 0;

        for message in messages {
            total_tokens += TOKENS_PER_MESSAGE;
            total_tokens += self.count_text(&message.role);
            total_tokens += self.count_text(&message.content);

            if let Some(name) = &message.name {
                total_tokens += self.count_text(name);
                total_tokens += TOKENS_PER_NAME;
            }
        }

        total_tokens + REPLY_PRIMING_TOKENS
    }

    /// Tokens attributed to a generated completion: one assistant message
    pub fn count_completion(&self, generated_text: &str) -> usize {
        self.count_messages(&[ChatMessage::assistant(generated_text)])
    }
}
