//! Section-aware document chunker.
//!
//! Splits a parent document into child chunks for embedding and keyword
//! matching. Strategies are tried in priority order and the first one that
//! yields at least two usable pieces wins:
//!
//! 1. Structural section boundaries (`### ` headers, `---` rules).
//! 2. Blank-line paragraph boundaries with greedy buffering up to `max_chunk`.
//! 3. Single-line boundaries with the same greedy buffering.
//! 4. Fall back to the whole document as one child.
//!
//! Documents shorter than `whole_doc_threshold` are never split. Empty or
//! whitespace-only input yields no chunks at all.

use crate::config::ChunkingConfig;

/// All length thresholds count characters, not bytes, so multibyte
/// scripts measure the same as ASCII.
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split a document into child chunk texts.
pub fn split_document(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if char_len(trimmed) < config.whole_doc_threshold {
        return vec![trimmed.to_string()];
    }

    if let Some(children) = split_sections(trimmed, config.min_length) {
        return children;
    }

    let paragraphs: Vec<&str> = trimmed.split("\n\n").collect();
    if paragraphs.len() > 1 {
        if let Some(children) = buffer_pieces(&paragraphs, "\n\n", config) {
            return children;
        }
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    if let Some(children) = buffer_pieces(&lines, "\n", config) {
        return children;
    }

    vec![trimmed.to_string()]
}

/// Strategy 1: split on section headers and horizontal rules, keeping
/// only pieces that clear the minimum length.
fn split_sections(text: &str, min_length: usize) -> Option<Vec<String>> {
    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let is_rule = line.trim() == "---";
        let is_header = line.starts_with("### ");

        if (is_rule || is_header) && !current.trim().is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        if is_rule {
            // The rule line itself is a separator, not content.
            continue;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.trim().is_empty() {
        sections.push(current);
    }

    if sections.len() < 2 {
        return None;
    }

    let children: Vec<String> = sections
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| char_len(s) >= min_length)
        .collect();

    if children.len() >= 2 {
        Some(children)
    } else {
        None
    }
}

/// Strategies 2 and 3: greedily concatenate pieces into a buffer until the
/// next piece would push it past `max_chunk`, then flush.
///
/// A buffer is only flushed once it clears `min_length`, so no emitted
/// chunk is ever shorter than the floor; a short trailing buffer is merged
/// into the previous chunk instead of being dropped, so every word of the
/// input survives.
fn buffer_pieces(pieces: &[&str], separator: &str, config: &ChunkingConfig) -> Option<Vec<String>> {
    let mut children: Vec<String> = Vec::new();
    let mut buffer = String::new();
    // Length in characters, tracked incrementally.
    let mut buffer_chars = 0usize;

    for piece in pieces {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let piece_chars = char_len(piece);
        let would_overflow = buffer_chars > 0 && buffer_chars + piece_chars >= config.max_chunk;
        if would_overflow && buffer_chars >= config.min_length {
            children.push(std::mem::take(&mut buffer));
            buffer_chars = 0;
        }
        if buffer_chars > 0 {
            buffer.push_str(separator);
            buffer_chars += char_len(separator);
        }
        buffer.push_str(piece);
        buffer_chars += piece_chars;
    }

    if buffer_chars > 0 {
        if buffer_chars >= config.min_length || children.is_empty() {
            children.push(buffer);
        } else {
            let last = children.last_mut().unwrap();
            last.push_str(separator);
            last.push_str(&buffer);
        }
    }

    if children.len() >= 2 {
        Some(children)
    } else {
        None
    }
}
