//! Pass D: text-key slug inference. See spec.md §4.3.

use std::collections::HashMap;

use super::labels::PassA;
use crate::instr::{FLAGS_TWO_WORD, FLAGS_VALUE, OP_CALL, OP_LEAVE, OP_PUSH, TEXT_CALL_IDIOMS};
use crate::word::decode_word;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "at", "is", "are", "was",
    "were", "be", "been", "it", "this", "that", "i", "you", "he", "she", "we", "they", "my",
    "your", "his", "her", "its", "our", "their", "with", "for", "as", "by", "from",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Slug,
    Title,
}

/// Derive a human-readable key per TEXT entry, per spec.md §4.3 Pass D.
/// Entries not referenced by the `speak`/`tell`/`title` idioms keep their
/// default `sNNN` key.
pub fn infer_text_keys(data: &[u16], pass_a: &PassA, strings: &[String]) -> Vec<String> {
    let mut classification: HashMap<usize, Classification> = HashMap::new();

    for &pc in &pass_a.executed_pcs {
        let w = decode_word(data[pc]);
        if w.is_long || w.opcode != OP_CALL || w.flags != FLAGS_VALUE {
            continue;
        }
        let call_id = w.arg as u8;
        let Some(&(_, leave_arg, needs_title_prefix)) =
            TEXT_CALL_IDIOMS.iter().find(|&&(id, _, _)| id == call_id)
        else {
            continue;
        };

        let Some(&next_word) = data.get(pc + 1) else { continue };
        let nw = decode_word(next_word);
        if nw.is_long || nw.opcode != OP_LEAVE || nw.flags != FLAGS_VALUE || nw.arg != leave_arg as u16 {
            continue;
        }

        if pc == 0 {
            continue;
        }
        let prev_pc = pc - 1;
        if !pass_a.executed_pcs.contains(&prev_pc) {
            continue;
        }
        let prev_w = decode_word(data[prev_pc]);
        if prev_w.is_long || prev_w.opcode != OP_PUSH || prev_w.flags != FLAGS_VALUE {
            continue;
        }
        let idx = prev_w.arg as usize;
        if idx >= strings.len() {
            continue;
        }

        if needs_title_prefix {
            // The caption push16 is the *previous executed instruction*
            // before the index push, not simply `prev_pc - 1` — push16
            // itself occupies two words, so its raw value word sits
            // between it and whatever follows.
            let Some(&caption_pc) = pass_a.executed_pcs.range(..prev_pc).next_back() else {
                continue;
            };
            let caption_w = decode_word(data[caption_pc]);
            if caption_w.is_long || caption_w.opcode != OP_PUSH || caption_w.flags != FLAGS_TWO_WORD {
                continue;
            }
            let Some(&caption_val) = data.get(caption_pc + 1) else { continue };
            if caption_val != 0x00B3 {
                continue;
            }
            classification.insert(idx, Classification::Title);
        } else {
            classification.insert(idx, Classification::Slug);
        }
    }

    let base_keys: Vec<String> = strings
        .iter()
        .enumerate()
        .map(|(idx, s)| match classification.get(&idx) {
            Some(Classification::Title) => "s_title".to_string(),
            Some(Classification::Slug) => {
                let tokens = tokenize_slug(s);
                if tokens.is_empty() {
                    format!("s{idx:03}")
                } else {
                    format!("s_{}", tokens.into_iter().take(4).collect::<Vec<_>>().join("_"))
                }
            }
            None => format!("s{idx:03}"),
        })
        .collect();

    disambiguate(base_keys)
}

/// Split a string into lower-cased alphanumeric tokens, dropping
/// apostrophes between word characters, then remove stop words and
/// single-character tokens unless that would leave fewer than three.
fn tokenize_slug(s: &str) -> Vec<String> {
    let cleaned = drop_apostrophes(s);
    let lower = cleaned.to_ascii_lowercase();
    let tokens: Vec<String> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let filtered: Vec<String> = tokens
        .iter()
        .filter(|t| t.len() > 1 && !STOP_WORDS.contains(&t.as_str()))
        .cloned()
        .collect();

    if filtered.len() < 3 {
        tokens
    } else {
        filtered
    }
}

fn drop_apostrophes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    for (i, &c) in chars.iter().enumerate() {
        let prev_word = i > 0 && chars[i - 1].is_alphanumeric();
        let next_word = i + 1 < chars.len() && chars[i + 1].is_alphanumeric();
        if c == '\'' && prev_word && next_word {
            continue;
        }
        out.push(c);
    }
    out
}

fn disambiguate(keys: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    keys.into_iter()
        .map(|key| {
            let count = seen.entry(key.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                key
            } else {
                format!("{key}_{}", *count)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_simple_sentence() {
        assert_eq!(tokenize_slug("Hello, traveler!"), vec!["hello", "traveler"]);
    }

    #[test]
    fn restores_tokens_when_filtering_leaves_too_few() {
        // "to the" are stop words / too short; filtering would leave zero tokens.
        assert_eq!(tokenize_slug("to the"), vec!["to", "the"]);
    }

    #[test]
    fn drops_apostrophe_inside_word() {
        assert_eq!(tokenize_slug("don't go"), vec!["dont", "go"]);
    }
}
