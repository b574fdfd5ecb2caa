//! A tiny stack machine evaluating locking/unlocking script pairs.
//!
//! Scripts are sequences of string tokens. Only three tokens carry special
//! meaning; everything else is a literal push. The evaluator is deterministic
//! and has no external effects — it never touches the UTXO set or the network.

use shared::Hash256;

const OP_DUP: &str = "OP_DUP";
const OP_HASH160: &str = "OP_HASH160";
const OP_EQUALVERIFY_PREFIX: &str = "OP_EQUALVERIFY";

/// A script is an ordered list of opaque string tokens.
pub type Script = Vec<String>;

/// Runs `unlocking` then `locking` on the same stack and reports whether the
/// pair succeeded. Stack underflow on any operator is treated as failure, not
/// a panic.
#[must_use]
pub fn evaluate_pair(unlocking: &Script, locking: &Script) -> bool {
    let mut stack: Vec<String> = Vec::new();
    run(unlocking, &mut stack) && run(locking, &mut stack)
}

fn run(script: &Script, stack: &mut Vec<String>) -> bool {
    for token in script {
        if token == OP_DUP {
            let Some(top) = stack.last().cloned() else {
                return false;
            };
            stack.push(top);
        } else if token == OP_HASH160 {
            let Some(top) = stack.pop() else {
                return false;
            };
            stack.push(Hash256::keccak256(top.as_bytes()).to_string());
        } else if token.starts_with(OP_EQUALVERIFY_PREFIX) {
            let (Some(a), Some(b)) = (stack.pop(), stack.pop()) else {
                return false;
            };
            if a != b {
                return false;
            }
        } else {
            stack.push(token.clone());
        }
    }
    true
}
