//! Chunking strategies and boundary heuristics.
//!
//! This module turns normalized document text into ordered chunk records.
//! Highlights:
//!
//! - Four strategies behind one enum: `sentence`, `paragraph`, `fixed_size`,
//!   and `semantic`, dispatched exhaustively so adding a strategy is a
//!   compile-time-checked change.
//! - Character budgets: `max_chunk_size` bounds every produced chunk;
//!   `overlap` seeds trailing context across boundaries where a split
//!   occurred inside continuous prose.
//! - Deterministic boundaries: a fresh call on identical text and options
//!   re-derives identical chunk contents; ties are always broken by greedy
//!   left-to-right packing.
//! - The `min_chunk_size` filter discards trailing fragments; boundary
//!   content shorter than the minimum does not survive chunking.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::ChunkingError;

/// Strategy used to derive chunk boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Split on sentence terminators and pack sentences greedily.
    Sentence,
    /// One chunk per blank-line-delimited paragraph; oversized paragraphs
    /// are packed sentence-wise with sentence overlap between pieces.
    Paragraph,
    /// Sliding character window with whitespace snap-back.
    FixedSize,
    /// Paragraphs that fit pass through unchanged; oversized paragraphs
    /// degrade to the sentence strategy.
    Semantic,
}

impl ChunkStrategy {
    /// Stable lowercase name used in chunk metadata and API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sentence => "sentence",
            Self::Paragraph => "paragraph",
            Self::FixedSize => "fixed_size",
            Self::Semantic => "semantic",
        }
    }
}

impl std::str::FromStr for ChunkStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sentence" => Ok(Self::Sentence),
            "paragraph" => Ok(Self::Paragraph),
            "fixed_size" | "fixed-size" | "fixed" => Ok(Self::FixedSize),
            "semantic" => Ok(Self::Semantic),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size and overlap options applied to a chunking run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ChunkOptions {
    /// Hard upper bound on chunk length, in characters.
    pub max_chunk_size: usize,
    /// Context carried across split boundaries, in characters.
    pub overlap: usize,
    /// Chunks shorter than this are discarded after splitting.
    pub min_chunk_size: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap: 100,
            min_chunk_size: 10,
        }
    }
}

/// A single chunk produced from a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    /// Identifier assigned to the chunk at creation.
    pub id: String,
    /// Chunk text content.
    pub content: String,
    /// Position of the chunk within the document, assigned after filtering.
    pub index: usize,
    /// Number of characters in the content.
    pub char_count: usize,
    /// Number of whitespace-separated words in the content.
    pub word_count: usize,
}

/// Split text into ordered chunks using the requested strategy.
///
/// Whitespace-only input yields an empty vector; the ingestion coordinator
/// treats that as a hard failure rather than an empty success.
pub fn chunk(
    text: &str,
    strategy: ChunkStrategy,
    options: ChunkOptions,
) -> Result<Vec<ChunkPiece>, ChunkingError> {
    if options.max_chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if options.overlap >= options.max_chunk_size {
        return Err(ChunkingError::OverlapTooLarge);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw = match strategy {
        ChunkStrategy::Sentence => sentence_chunks(text, options),
        ChunkStrategy::Paragraph => paragraph_chunks(text, options),
        ChunkStrategy::FixedSize => fixed_size_chunks(text, options),
        ChunkStrategy::Semantic => semantic_chunks(text, options),
    };

    let pieces = raw
        .into_iter()
        .filter(|content| content.trim().chars().count() >= options.min_chunk_size)
        .enumerate()
        .map(|(index, content)| {
            let char_count = content.chars().count();
            let word_count = content.split_whitespace().count();
            ChunkPiece {
                id: Uuid::new_v4().to_string(),
                content,
                index,
                char_count,
                word_count,
            }
        })
        .collect();

    Ok(pieces)
}

/// Split text into sentences on terminator punctuation followed by whitespace.
///
/// Internal whitespace is collapsed so boundaries do not depend on the
/// original line wrapping.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?')
            && chars.peek().is_none_or(|next| next.is_whitespace())
        {
            push_collapsed(&mut sentences, &current);
            current.clear();
        }
    }
    push_collapsed(&mut sentences, &current);

    sentences
}

fn push_collapsed(target: &mut Vec<String>, candidate: &str) {
    let collapsed = candidate.split_whitespace().collect::<Vec<_>>().join(" ");
    if !collapsed.is_empty() {
        target.push(collapsed);
    }
}

/// Greedily pack sentences into chunks, seeding each new chunk with the
/// trailing ~`overlap / 10` words of its predecessor.
fn sentence_chunks(text: &str, options: ChunkOptions) -> Vec<String> {
    let overlap_words = options.overlap / 10;
    pack_sentences(split_sentences(text), options.max_chunk_size, overlap_words)
}

fn pack_sentences(sentences: Vec<String>, max: usize, overlap_words: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        let pieces = if sentence.chars().count() > max {
            split_words_to_budget(&sentence, max)
        } else {
            vec![sentence]
        };

        for piece in pieces {
            if current.is_empty() {
                current = piece;
            } else if current.chars().count() + 1 + piece.chars().count() <= max {
                current.push(' ');
                current.push_str(&piece);
            } else {
                let seed = trailing_words(&current, overlap_words);
                chunks.push(std::mem::take(&mut current));
                if !seed.is_empty()
                    && seed.chars().count() + 1 + piece.chars().count() <= max
                {
                    current = format!("{seed} {piece}");
                } else {
                    current = piece;
                }
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Pack whitespace-separated words into budget-sized strings, hard-splitting
/// any single word longer than the budget.
fn split_words_to_budget(text: &str, budget: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_pieces: Vec<String> = if word.chars().count() > budget {
            word.chars()
                .collect::<Vec<_>>()
                .chunks(budget)
                .map(|window| window.iter().collect())
                .collect()
        } else {
            vec![word.to_string()]
        };

        for word_piece in word_pieces {
            if current.is_empty() {
                current = word_piece;
            } else if current.chars().count() + 1 + word_piece.chars().count() <= budget {
                current.push(' ');
                current.push_str(&word_piece);
            } else {
                pieces.push(std::mem::take(&mut current));
                current = word_piece;
            }
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn trailing_words(text: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(count);
    words[start..].join(" ")
}

/// Split text on blank-line boundaries.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// One chunk per paragraph. Oversized paragraphs are packed sentence-wise,
/// with the last one or two sentences of each piece carried into the next so
/// continuous prose keeps local context across the split.
fn paragraph_chunks(text: &str, options: ChunkOptions) -> Vec<String> {
    let mut chunks = Vec::new();

    for paragraph in split_paragraphs(text) {
        if paragraph.chars().count() <= options.max_chunk_size {
            chunks.push(paragraph);
            continue;
        }

        let pieces = pack_sentences(split_sentences(&paragraph), options.max_chunk_size, 0);
        let mut previous: Option<String> = None;
        for piece in pieces {
            let seeded = match previous.as_deref() {
                Some(prior) if options.overlap > 0 => {
                    let seed = trailing_sentences(prior, options.overlap);
                    if !seed.is_empty()
                        && seed.chars().count() + 1 + piece.chars().count()
                            <= options.max_chunk_size
                    {
                        format!("{seed} {piece}")
                    } else {
                        piece.clone()
                    }
                }
                _ => piece.clone(),
            };
            previous = Some(piece);
            chunks.push(seeded);
        }
    }

    chunks
}

/// Take the last sentence of `text`, plus the one before it when the last
/// sentence alone is shorter than `appetite` characters.
fn trailing_sentences(text: &str, appetite: usize) -> String {
    let sentences = split_sentences(text);
    match sentences.len() {
        0 => String::new(),
        1 => sentences[0].clone(),
        n => {
            let last = &sentences[n - 1];
            if last.chars().count() < appetite {
                format!("{} {}", sentences[n - 2], last)
            } else {
                last.clone()
            }
        }
    }
}

/// Sliding character window with whitespace snap-back.
///
/// The window end snaps back to the nearest preceding whitespace when the cut
/// would otherwise land mid-word, unless snapping would discard more than 20%
/// of the window. With zero overlap the produced chunks concatenate back to
/// the exact input text.
fn fixed_size_chunks(text: &str, options: ChunkOptions) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let max = options.max_chunk_size;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let nominal_end = (start + max).min(chars.len());
        let mut end = nominal_end;

        let cuts_mid_word = nominal_end < chars.len()
            && !chars[nominal_end].is_whitespace()
            && !chars[nominal_end - 1].is_whitespace();
        if cuts_mid_word
            && let Some(ws) = (start..nominal_end).rev().find(|&i| chars[i].is_whitespace())
        {
            let snapped_end = ws + 1;
            let discarded = nominal_end - snapped_end;
            if discarded * 5 <= nominal_end - start {
                end = snapped_end;
            }
        }

        chunks.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        start = if options.overlap > 0 {
            end.saturating_sub(options.overlap).max(start + 1)
        } else {
            end
        };
    }

    chunks
}

/// Paragraphs that fit pass through unchanged; oversized paragraphs degrade
/// to the sentence strategy.
fn semantic_chunks(text: &str, options: ChunkOptions) -> Vec<String> {
    let mut chunks = Vec::new();
    for paragraph in split_paragraphs(text) {
        if paragraph.chars().count() <= options.max_chunk_size {
            chunks.push(paragraph);
        } else {
            chunks.extend(sentence_chunks(&paragraph, options));
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(max: usize, overlap: usize, min: usize) -> ChunkOptions {
        ChunkOptions {
            max_chunk_size: max,
            overlap,
            min_chunk_size: min,
        }
    }

    fn contents(pieces: &[ChunkPiece]) -> Vec<&str> {
        pieces.iter().map(|piece| piece.content.as_str()).collect()
    }

    #[test]
    fn paragraph_strategy_splits_on_blank_lines() {
        let pieces = chunk(
            "Paragraph one.\n\nParagraph two.",
            ChunkStrategy::Paragraph,
            options(1000, 100, 10),
        )
        .expect("chunking succeeds");

        assert_eq!(contents(&pieces), vec!["Paragraph one.", "Paragraph two."]);
        assert_eq!(pieces[0].index, 0);
        assert_eq!(pieces[1].index, 1);
    }

    #[test]
    fn sentence_strategy_packs_greedily_and_respects_budget() {
        let text = "One ran fast. Two ran faster. Three kept walking. Four sat down.";
        let pieces = chunk(text, ChunkStrategy::Sentence, options(35, 0, 1))
            .expect("chunking succeeds");

        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.char_count <= 35, "chunk too long: {:?}", piece.content);
        }

        let chunk_words: Vec<&str> = pieces
            .iter()
            .flat_map(|piece| piece.content.split_whitespace())
            .collect();
        let original_words: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(chunk_words, original_words);
    }

    #[test]
    fn sentence_strategy_seeds_overlap_words() {
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa lambda mu.";
        let pieces = chunk(text, ChunkStrategy::Sentence, options(40, 20, 1))
            .expect("chunking succeeds");

        assert!(pieces.len() >= 2);
        // ~overlap/10 = 2 trailing words of the prior chunk seed the next one
        let first_tail = trailing_words(&pieces[0].content, 2);
        assert!(
            pieces[1].content.starts_with(&first_tail),
            "expected {:?} to start with {:?}",
            pieces[1].content,
            first_tail
        );
    }

    #[test]
    fn fixed_size_reconstructs_exactly_without_overlap() {
        let text = "The quick brown fox jumps over the lazy dog near the river bank";
        let pieces = chunk(text, ChunkStrategy::FixedSize, options(20, 0, 1))
            .expect("chunking succeeds");

        let rebuilt: String = pieces.iter().map(|piece| piece.content.as_str()).collect();
        assert_eq!(rebuilt, text);
        for piece in &pieces {
            assert!(piece.char_count <= 20);
        }
    }

    #[test]
    fn fixed_size_snaps_back_to_whitespace() {
        let text = "alpha beta gamma delta epsilon";
        let pieces = chunk(text, ChunkStrategy::FixedSize, options(12, 0, 1))
            .expect("chunking succeeds");

        // every boundary lands after a whitespace, never mid-word
        for piece in &pieces[..pieces.len() - 1] {
            assert!(
                piece.content.ends_with(' '),
                "boundary cut mid-word: {:?}",
                piece.content
            );
        }
    }

    #[test]
    fn fixed_size_keeps_full_window_when_snap_discards_too_much() {
        // one long token: snapping would discard the whole window
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        let pieces = chunk(text, ChunkStrategy::FixedSize, options(10, 0, 1))
            .expect("chunking succeeds");
        let rebuilt: String = pieces.iter().map(|piece| piece.content.as_str()).collect();
        assert_eq!(rebuilt, text);
        assert_eq!(pieces[0].char_count, 10);
    }

    #[test]
    fn fixed_size_overlap_repeats_window_tail() {
        let text = "0123456789abcdefghij";
        let pieces = chunk(text, ChunkStrategy::FixedSize, options(10, 4, 1))
            .expect("chunking succeeds");

        assert_eq!(pieces[0].content, "0123456789");
        assert!(pieces[1].content.starts_with("6789"));
    }

    #[test]
    fn semantic_passes_fitting_paragraphs_through() {
        let text = "Short paragraph stays whole.\n\nAnother short one.";
        let pieces = chunk(text, ChunkStrategy::Semantic, options(100, 10, 1))
            .expect("chunking succeeds");
        assert_eq!(
            contents(&pieces),
            vec!["Short paragraph stays whole.", "Another short one."]
        );
    }

    #[test]
    fn semantic_degrades_oversized_paragraphs_to_sentences() {
        let long = "First sentence here. Second sentence here. Third sentence here.";
        let text = format!("Tiny opener.\n\n{long}");
        let pieces = chunk(&text, ChunkStrategy::Semantic, options(30, 0, 1))
            .expect("chunking succeeds");

        assert_eq!(pieces[0].content, "Tiny opener.");
        assert!(pieces.len() > 2);
        for piece in &pieces[1..] {
            assert!(piece.char_count <= 30);
        }
    }

    #[test]
    fn min_chunk_size_filter_drops_short_chunks_and_reindexes() {
        let text = "Significant paragraph with enough length.\n\nok";
        let pieces = chunk(text, ChunkStrategy::Paragraph, options(1000, 0, 10))
            .expect("chunking succeeds");

        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].index, 0);
        assert!(pieces[0].content.starts_with("Significant"));
    }

    #[test]
    fn chunking_is_deterministic_for_fixed_inputs() {
        let text = "Alpha one two. Beta three four. Gamma five six.\n\nDelta seven eight.";
        for strategy in [
            ChunkStrategy::Sentence,
            ChunkStrategy::Paragraph,
            ChunkStrategy::FixedSize,
            ChunkStrategy::Semantic,
        ] {
            let first = chunk(text, strategy, options(25, 10, 1)).expect("first run");
            let second = chunk(text, strategy, options(25, 10, 1)).expect("second run");
            assert_eq!(contents(&first), contents(&second), "strategy {strategy}");
        }
    }

    #[test]
    fn whitespace_only_input_yields_zero_chunks() {
        let pieces = chunk("   \n\t  ", ChunkStrategy::Sentence, options(100, 0, 1))
            .expect("chunking succeeds");
        assert!(pieces.is_empty());
    }

    #[test]
    fn rejects_invalid_budgets() {
        let error = chunk("text", ChunkStrategy::Sentence, options(0, 0, 1)).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));

        let error = chunk("text", ChunkStrategy::Sentence, options(10, 10, 1)).unwrap_err();
        assert!(matches!(error, ChunkingError::OverlapTooLarge));
    }

    #[test]
    fn word_counts_match_content() {
        let pieces = chunk(
            "Counting words in a chunk.",
            ChunkStrategy::Sentence,
            options(100, 0, 1),
        )
        .expect("chunking succeeds");
        assert_eq!(pieces[0].word_count, 5);
        assert_eq!(pieces[0].char_count, "Counting words in a chunk.".len());
    }

    #[test]
    fn strategy_round_trips_through_strings() {
        for strategy in [
            ChunkStrategy::Sentence,
            ChunkStrategy::Paragraph,
            ChunkStrategy::FixedSize,
            ChunkStrategy::Semantic,
        ] {
            let parsed: ChunkStrategy = strategy.as_str().parse().expect("parse");
            assert_eq!(parsed, strategy);
        }
        assert!("recursive".parse::<ChunkStrategy>().is_err());
    }
}
