use html2text::from_read;
use regex::Regex;
use std::sync::OnceLock;

/// Words per provider request. Larger chunks drift in tone.
pub const DEFAULT_CHUNK_WORD_LIMIT: usize = 450;

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://[^\s]+").unwrap())
}

fn whitespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn sentence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Sentences end in terminal punctuation; a trailing fragment without one still counts
    PATTERN.get_or_init(|| Regex::new(r"[^.!?]+[.!?]+|[^.!?]+$").unwrap())
}

fn html_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap())
}

/// Clean text by removing HTML tags and URLs and normalizing whitespace
pub fn clean_text(text: &str) -> String {
    // Plain text goes through untouched so its punctuation and line structure survive
    let plain_text = if html_pattern().is_match(text) {
        from_read(text.as_bytes(), usize::MAX)
    } else {
        text.to_string()
    };

    let without_urls = url_pattern().replace_all(&plain_text, "");
    let normalized = whitespace_pattern().replace_all(&without_urls, " ");

    normalized.trim().to_string()
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Break a text into pieces of at most `max_words` words, ignoring punctuation
fn force_split_by_words(text: &str, max_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words)
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Split text into ordered chunks of at most `max_words` words.
///
/// Sentences are kept whole when they fit. A sentence over the limit is split
/// on commas, and a comma-separated part still over the limit is cut by word
/// count. Same input, same output.
pub fn split_text(text: &str, max_words: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, chunks: &mut Vec<String>| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        current.clear();
    };

    for sentence in sentence_pattern().find_iter(text) {
        let sentence = sentence.as_str().trim();
        if sentence.is_empty() {
            continue;
        }

        let sentence_words = count_words(sentence);

        if sentence_words > max_words {
            flush(&mut current, &mut chunks);

            for part in sentence.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }

                let part_words = count_words(part);
                if part_words > max_words {
                    chunks.extend(force_split_by_words(part, max_words));
                } else if count_words(&current) + part_words <= max_words {
                    if !current.is_empty() {
                        current.push_str(", ");
                    }
                    current.push_str(part);
                } else {
                    flush(&mut current, &mut chunks);
                    current.push_str(part);
                }
            }
        } else if count_words(&current) + sentence_words <= max_words {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        } else {
            flush(&mut current, &mut chunks);
            current.push_str(sentence);
        }
    }

    flush(&mut current, &mut chunks);
    chunks
}
