//! Token accounting under a fixed tokenizer contract.
//!
//! `count` and `clip` must agree: clipping a text to `n` tokens and counting
//! the result never yields more than `n`.

use crate::errors::TribunalError;
use crate::model::json_kind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clipped {
    pub token_count: usize,
    pub text: String,
}

pub trait TokenAccountant: Send + Sync {
    /// Stable identifier; part of the cache fingerprint context.
    fn name(&self) -> &'static str;

    fn count(&self, text: &str) -> usize;

    /// Returns `text` unchanged with its true count when it fits.
    ///
    /// Otherwise returns the longest prefix of at most `max_tokens` tokens
    /// that decodes as valid UTF-8. When the cut would split a multi-byte
    /// character the prefix backs off to fewer tokens, so `token_count` can
    /// be below `max_tokens`; it always counts the tokens of the returned
    /// `text`.
    fn clip(&self, text: &str, max_tokens: usize) -> Clipped;
}

/// Counts an untyped payload, failing for anything that is not a JSON string.
pub fn count_payload(
    accountant: &dyn TokenAccountant,
    payload: &Value,
) -> Result<usize, TribunalError> {
    match payload {
        Value::String(s) => Ok(accountant.count(s)),
        other => Err(TribunalError::invalid_input(format!(
            "token count requires text, got {}",
            json_kind(other)
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    /// BPE used by the gpt-4 family.
    #[default]
    Cl100k,
    /// One token per whitespace-delimited word.
    Whitespace,
}

pub fn accountant_for(kind: TokenizerKind) -> anyhow::Result<Arc<dyn TokenAccountant>> {
    Ok(match kind {
        TokenizerKind::Cl100k => Arc::new(Cl100kAccountant::new()?),
        TokenizerKind::Whitespace => Arc::new(WhitespaceAccountant),
    })
}

pub struct Cl100kAccountant {
    bpe: CoreBPE,
}

impl Cl100kAccountant {
    pub fn new() -> anyhow::Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| anyhow::anyhow!("failed to load cl100k_base encoding: {}", e))?;
        Ok(Self { bpe })
    }
}

impl TokenAccountant for Cl100kAccountant {
    fn name(&self) -> &'static str {
        "cl100k_base"
    }

    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn clip(&self, text: &str, max_tokens: usize) -> Clipped {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return Clipped {
                token_count: tokens.len(),
                text: text.to_string(),
            };
        }

        // A cut can land inside a multi-byte character; back off until the
        // prefix decodes as valid UTF-8.
        let mut n = max_tokens;
        while n > 0 {
            if let Ok(prefix) = self.bpe.decode(tokens[..n].to_vec()) {
                return Clipped {
                    token_count: n,
                    text: prefix,
                };
            }
            n -= 1;
        }
        Clipped {
            token_count: 0,
            text: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceAccountant;

impl TokenAccountant for WhitespaceAccountant {
    fn name(&self) -> &'static str {
        "whitespace"
    }

    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn clip(&self, text: &str, max_tokens: usize) -> Clipped {
        let total = self.count(text);
        if total <= max_tokens {
            return Clipped {
                token_count: total,
                text: text.to_string(),
            };
        }

        let mut seen = 0usize;
        let mut in_word = false;
        for (idx, ch) in text.char_indices() {
            if ch.is_whitespace() {
                if in_word {
                    in_word = false;
                    if seen == max_tokens {
                        return Clipped {
                            token_count: seen,
                            text: text[..idx].to_string(),
                        };
                    }
                }
            } else if !in_word {
                if seen == max_tokens {
                    return Clipped {
                        token_count: seen,
                        text: text[..idx].trim_end().to_string(),
                    };
                }
                in_word = true;
                seen += 1;
            }
        }
        Clipped {
            token_count: seen,
            text: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whitespace_clip_keeps_text_that_fits() {
        let acc = WhitespaceAccountant;
        let c = acc.clip("  one two  three ", 3);
        assert_eq!(c.token_count, 3);
        assert_eq!(c.text, "  one two  three ");
    }

    #[test]
    fn whitespace_clip_cuts_after_max_words() {
        let acc = WhitespaceAccountant;
        let c = acc.clip("one two three four", 2);
        assert_eq!(c, Clipped { token_count: 2, text: "one two".into() });
        assert_eq!(acc.count(&c.text), 2);

        let c = acc.clip("one two three", 0);
        assert_eq!(c.token_count, 0);
        assert_eq!(c.text, "");
    }

    #[test]
    fn count_payload_rejects_non_text() {
        let acc = WhitespaceAccountant;
        assert_eq!(count_payload(&acc, &json!("a b c")).unwrap(), 3);
        let err = count_payload(&acc, &json!(42)).unwrap_err();
        assert!(matches!(err, TribunalError::InvalidInput(_)));
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn cl100k_clip_is_deterministic_and_bounded() {
        let acc = Cl100kAccountant::new().unwrap();
        let text = "Deep breathing, grounding and regular sleep help with anxiety. ".repeat(20);
        let full = acc.count(&text);
        assert!(full > 16);

        let a = acc.clip(&text, 16);
        let b = acc.clip(&text, 16);
        assert_eq!(a, b);
        assert_eq!(a.token_count, 16);
        assert!(acc.count(&a.text) <= 16);
        assert!(text.starts_with(&a.text));

        let whole = acc.clip(&text, full);
        assert_eq!(whole.text, text);
        assert_eq!(whole.token_count, full);
    }

    #[test]
    fn cl100k_clip_backs_off_inside_multibyte_characters() {
        let acc = Cl100kAccountant::new().unwrap();
        let text = "治疗师的回答需要清晰而且富有同理心";
        for max in 0..acc.count(text) {
            let c = acc.clip(text, max);
            assert!(c.token_count <= max);
            assert!(text.starts_with(&c.text));
        }
    }
}
