//! Fusion engine
//!
//! Consecutive slots overlap in time, so their texts usually repeat a few
//! words at the seam. Fusion tokenizes both sides, finds the repeated
//! region with a fuzzy suffix/prefix match, and trims it off the start of
//! the newer slot. The trim never touches the end of the older slot: each
//! slot's text stays anchored to its own start timestamp.

use std::sync::Arc;

use crate::messages::ServerMessage;
use crate::session::engine::{Engine, SlotEmission};
use crate::session::types::{FusedCaption, SlotPhase};
use crate::timer::epoch_ms;
use uuid::Uuid;

/// Punctuation treated as standalone tokens
const PUNCT: &[char] = &['.', ',', '!', '?', ';', ':', '…', '»', '«', '"', '\''];

/// Tokens that attach to the preceding word when rendering
const CLOSING: &[&str] = &[".", ",", "!", "?", ";", ":", "…", "»", "\"", "'"];

/// Tokens that attach to the following word when rendering
const OPENING: &[&str] = &["«", "\"", "'"];

/// Longest overlap considered, in tokens
const MAX_OVERLAP: usize = 15;

/// Per-token similarity a position must reach to count as a match
const TOKEN_SIMILARITY: f64 = 0.8;

/// Fraction of matching positions a candidate overlap must reach
const MATCH_RATIO: f64 = 0.7;

/// Split text into word and punctuation tokens
pub fn tokenize(text: &str) -> Vec<String> {
    let mut spaced = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        if PUNCT.contains(&ch) {
            spaced.push(' ');
            spaced.push(ch);
            spaced.push(' ');
        } else {
            spaced.push(ch);
        }
    }
    spaced.split_whitespace().map(str::to_string).collect()
}

/// Join tokens back into display text, reattaching punctuation
pub fn detokenize(tokens: &[String]) -> String {
    let mut out = String::new();
    let mut suppress_space = true;
    for token in tokens {
        if !suppress_space && !CLOSING.contains(&token.as_str()) {
            out.push(' ');
        }
        out.push_str(token);
        suppress_space = OPENING.contains(&token.as_str());
    }
    out.trim().to_string()
}

/// Levenshtein edit distance over characters
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Similarity in [0, 1] on lower-cased words; two empty strings score 0
pub fn word_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    1.0 - edit_distance(&a, &b) as f64 / max_len as f64
}

/// Fuzzy overlap between the end of `a` and the start of `b`
///
/// Tries candidate lengths k = 1..=min(|a|, |b|, 15) in increasing order
/// and keeps the longest k whose positionwise match ratio reaches 0.7.
/// Returns the overlap length and the matching suffix of `a`.
pub fn find_overlap(a: &[String], b: &[String]) -> (usize, Vec<String>) {
    let max_k = a.len().min(b.len()).min(MAX_OVERLAP);
    let mut best = 0;
    for k in 1..=max_k {
        let matches = (0..k)
            .filter(|&i| word_similarity(&a[a.len() - k + i], &b[i]) >= TOKEN_SIMILARITY)
            .count();
        if matches as f64 / k as f64 >= MATCH_RATIO && k > best {
            best = k;
        }
    }
    (best, a[a.len() - best..].to_vec())
}

impl Engine {
    /// Finalize a slot once its settle window has elapsed
    ///
    /// Computes the overlap between this slot and its predecessor, records
    /// it on this slot, and emits the predecessor's final text. Slot 0 has
    /// no predecessor and emits itself directly.
    pub fn finalize_slot(self: &Arc<Self>, slot_index: u64) {
        let mut emission: Option<SlotEmission> = None;
        let mut fused: Option<FusedCaption> = None;
        {
            let mut state = self.state.lock();
            let Some(cur) = state.slot(slot_index) else {
                return;
            };
            let cur_tokens = tokenize(&cur.raw_text());

            if slot_index == 0 {
                let settings = state.settings;
                let slot = state.slot_mut(0).expect("slot 0 exists");
                slot.phase = SlotPhase::Fused;
                slot.sent = true;
                if cur_tokens.is_empty() {
                    return;
                }
                slot.final_text = detokenize(&cur_tokens);
                let record = FusedCaption {
                    id: Uuid::new_v4(),
                    text: slot.final_text.clone(),
                    created_at_ms: epoch_ms(),
                    video_timestamp_ms: slot.start_video_offset_ms,
                    slot_index: 0,
                    next_slot_index: 0,
                    overlap_count: 0,
                };
                emission = Some(SlotEmission::of(slot, &settings));
                state.fused_history.push(record.clone());
                fused = Some(record);
            } else {
                let prev_index = slot_index - 1;
                let prev_tokens = match state.slot(prev_index) {
                    Some(prev) => tokenize(&prev.raw_text()),
                    None => return,
                };
                let (overlap, _) = find_overlap(&prev_tokens, &cur_tokens);
                if let Some(cur) = state.slot_mut(slot_index) {
                    cur.overlap_from_prev = Some(overlap);
                }

                let settings = state.settings;
                let Some(prev) = state.slot_mut(prev_index) else {
                    return;
                };
                // Slot 0 already emitted at its own finalize; only the
                // overlap assignment above persists.
                if prev.sent {
                    return;
                }
                prev.phase = SlotPhase::Fused;
                prev.sent = true;
                if prev_tokens.is_empty() {
                    return;
                }
                let skip = prev.overlap_from_prev.unwrap_or(0).min(prev_tokens.len());
                prev.final_text = detokenize(&prev_tokens[skip..]);
                if prev.final_text.is_empty() {
                    return;
                }
                let record = FusedCaption {
                    id: Uuid::new_v4(),
                    text: prev.final_text.clone(),
                    created_at_ms: epoch_ms(),
                    video_timestamp_ms: prev.start_video_offset_ms,
                    slot_index: prev_index,
                    next_slot_index: slot_index,
                    // Tokens dropped from the emitted slot's start, as set
                    // when its own successor finalized.
                    overlap_count: skip,
                };
                emission = Some(SlotEmission::of(prev, &settings));
                state.fused_history.push(record.clone());
                fused = Some(record);
            }
        }

        if let Some(record) = fused {
            tracing::debug!(
                slot = record.slot_index,
                overlap = record.overlap_count,
                "fused caption emitted"
            );
            self.hub.to_admins(&ServerMessage::FragmentFusedCaption {
                overlap_count: record.overlap_count,
                caption: record,
            });
        }
        if let Some(emission) = emission {
            self.deliver_slot(emission);
        }
    }

    /// Emit every still-unsent slot, oldest first, as best-effort catch-up
    /// when the rotation stops
    pub fn flush_remaining_slots(self: &Arc<Self>) {
        let mut out: Vec<(SlotEmission, FusedCaption)> = Vec::new();
        {
            let mut state = self.state.lock();
            let settings = state.settings;
            for index in 0..state.slots.len() {
                if state.slots[index].sent {
                    continue;
                }
                let tokens = tokenize(&state.slots[index].raw_text());
                let slot = &mut state.slots[index];
                slot.phase = SlotPhase::Fused;
                slot.sent = true;
                if tokens.is_empty() {
                    continue;
                }
                let skip = slot.overlap_from_prev.unwrap_or(0).min(tokens.len());
                slot.final_text = detokenize(&tokens[skip..]);
                if slot.final_text.is_empty() {
                    continue;
                }
                let record = FusedCaption {
                    id: Uuid::new_v4(),
                    text: slot.final_text.clone(),
                    created_at_ms: epoch_ms(),
                    video_timestamp_ms: slot.start_video_offset_ms,
                    slot_index: slot.slot_index,
                    next_slot_index: slot.slot_index,
                    overlap_count: skip,
                };
                let emission = SlotEmission::of(slot, &settings);
                state.fused_history.push(record.clone());
                out.push((emission, record));
            }
        }

        for (emission, record) in out {
            self.hub.to_admins(&ServerMessage::FragmentFusedCaption {
                overlap_count: record.overlap_count,
                caption: record,
            });
            self.deliver_slot_now(emission);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_tokenize_splits_punctuation() {
        assert_eq!(
            tokenize("sont Marseille, Nice"),
            tokens(&["sont", "Marseille", ",", "Nice"])
        );
        assert_eq!(tokenize("«Bonjour»"), tokens(&["«", "Bonjour", "»"]));
        assert_eq!(tokenize("   "), Vec::<String>::new());
    }

    #[test]
    fn test_detokenize_reattaches_punctuation() {
        assert_eq!(
            detokenize(&tokens(&["sont", "Marseille", ",", "Nice"])),
            "sont Marseille, Nice"
        );
        assert_eq!(detokenize(&tokens(&["«", "oui", "»"])), "«oui»");
        assert_eq!(detokenize(&[]), "");
    }

    #[test]
    fn test_roundtrip_normalizes_whitespace() {
        let input = "Les  grandes   villes sont Marseille,Nice";
        assert_eq!(
            detokenize(&tokenize(input)),
            "Les grandes villes sont Marseille, Nice"
        );
        // Already-normalized text round-trips unchanged
        let normalized = "Les grandes villes sont Marseille, Nice et Toulon.";
        assert_eq!(detokenize(&tokenize(normalized)), normalized);
    }

    #[test]
    fn test_word_similarity() {
        assert_eq!(word_similarity("", ""), 0.0);
        assert_eq!(word_similarity("mot", "mot"), 1.0);
        assert_eq!(word_similarity("Mot", "mot"), 1.0);
        // One edit over four characters
        assert!((word_similarity("mots", "mota") - 0.75).abs() < 1e-9);
        assert_eq!(word_similarity("abc", ""), 0.0);
    }

    #[test]
    fn test_find_overlap_empty_sides() {
        let a = tokens(&["un", "deux"]);
        assert_eq!(find_overlap(&a, &[]).0, 0);
        assert_eq!(find_overlap(&[], &a).0, 0);
    }

    #[test]
    fn test_find_overlap_identity_capped() {
        let a = tokens(&["a", "b", "c"]);
        assert_eq!(find_overlap(&a, &a).0, 3);

        let long: Vec<String> = (0..20).map(|i| format!("w{i}")).collect();
        assert_eq!(find_overlap(&long, &long).0, 15);
    }

    #[test]
    fn test_find_overlap_scenario() {
        // End of slot 0 vs start of slot 1
        let prev = tokenize("Les grandes villes sont Marseille,");
        let cur = tokenize("sont Marseille, Nice et Toulon");
        let (len, suffix) = find_overlap(&prev, &cur);
        assert_eq!(len, 3);
        assert_eq!(suffix, tokens(&["sont", "Marseille", ","]));
        assert_eq!(detokenize(&cur[len..]), "Nice et Toulon");
    }

    #[test]
    fn test_find_overlap_tolerates_typos() {
        // "Marseile" vs "Marseille": similarity 8/9 > 0.8, so the window
        // still matches with one misspelled word out of three.
        let prev = tokenize("villes sont Marseile");
        let cur = tokenize("sont Marseille Nice");
        let (len, _) = find_overlap(&prev, &cur);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_find_overlap_rejects_disjoint_text() {
        let prev = tokenize("rien à voir ici");
        let cur = tokenize("complètement autre chose");
        assert_eq!(find_overlap(&prev, &cur).0, 0);
    }

    #[test]
    fn test_find_overlap_prefers_longer_window() {
        let prev = tokens(&["x", "a", "b", "b"]);
        let cur = tokens(&["a", "b", "b", "y"]);
        let (len, suffix) = find_overlap(&prev, &cur);
        assert_eq!(len, 3);
        assert_eq!(suffix, tokens(&["a", "b", "b"]));
    }
}
