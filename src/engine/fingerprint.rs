//! The Request Fingerprint: a deterministic 256-bit digest
//! over `{model_id, ordered messages as (role,content), max_tokens,
//! temperature, system_prompt}`, hex-encoded to 64 lowercase characters.
//!
//! Field-order sensitivity is resolved by joining parts after sorting
//! key=value fragments for stability. Message order itself is preserved
//! because each message's fragment key embeds its zero-padded index
//! (`message[0000]`, `message[0001]`, ...), so lexicographic sorting of
//! the fragment list never reorders the conversation — it only makes the
//! digest independent of whatever order this module happens to build the
//! fragment list in. Content longer than 1000 characters is replaced by
//! its own digest before concatenation, to bound key size. Booleans are
//! never included and temperature is omitted when zero so that a
//! streaming and non-streaming call for the same prompt collide in the
//! cache.

use sha2::{Digest, Sha256};
use skillrunner_common::CompletionRequest;

const LONG_CONTENT_THRESHOLD: usize = 1000;

fn digest_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bound a piece of message/system-prompt content to a fixed-size token:
/// short content passes through verbatim, long content is replaced by its
/// own digest.
fn content_token(content: &str) -> String {
    if content.len() > LONG_CONTENT_THRESHOLD {
        digest_hex(content)
    } else {
        content.to_string()
    }
}

/// Hash a skill's raw input string to the same digest format as
/// [`fingerprint`], used as the checkpoint resume key.
pub fn hash_input(input: &str) -> String {
    digest_hex(input)
}

/// Compute the 64-character lowercase hex fingerprint of a completion
/// request.
pub fn fingerprint(req: &CompletionRequest) -> String {
    let mut fragments: Vec<String> = Vec::with_capacity(req.messages.len() + 3);

    fragments.push(format!("model_id={}", req.model_id));
    fragments.push(format!("max_tokens={}", req.max_tokens));

    if req.temperature != 0.0 {
        fragments.push(format!("temperature={}", req.temperature));
    }

    if let Some(system_prompt) = &req.system_prompt {
        fragments.push(format!("system_prompt={}", content_token(system_prompt)));
    }

    for (i, message) in req.messages.iter().enumerate() {
        fragments.push(format!(
            "message[{i:04}]={}:{}",
            message.role,
            content_token(&message.content)
        ));
    }

    fragments.sort();
    digest_hex(&fragments.join("\n"))
}
