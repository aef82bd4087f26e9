use once_cell::sync::Lazy;
use regex::Regex;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9]+(?:['’][A-Za-z]+)?").unwrap());
static SENTENCE_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+(?:\s|$)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextStats {
    pub words: usize,
    pub sentences: usize,
    pub syllables: usize,
}

impl TextStats {
    pub fn flesch_reading_ease(&self) -> Option<f32> {
        if self.words == 0 {
            return None;
        }
        Some(flesch_reading_ease(
            self.words as f32 / self.sentences.max(1) as f32,
            self.syllables as f32 / self.words as f32,
        ))
    }
}

/// Flesch Reading Ease from average words per sentence and syllables per word.
pub fn flesch_reading_ease(words_per_sentence: f32, syllables_per_word: f32) -> f32 {
    206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word
}

pub fn text_stats(text: &str) -> TextStats {
    let words: Vec<&str> = WORD_RE.find_iter(text).map(|m| m.as_str()).collect();
    if words.is_empty() {
        return TextStats::default();
    }
    let syllables = words.iter().map(|w| count_syllables(w)).sum();
    // Trailing text without terminal punctuation still forms a sentence.
    let mut sentences = SENTENCE_END_RE.find_iter(text).count();
    let tail = SENTENCE_END_RE
        .find_iter(text)
        .last()
        .map(|m| &text[m.end()..])
        .unwrap_or(text);
    if WORD_RE.is_match(tail) {
        sentences += 1;
    }
    TextStats {
        words: words.len(),
        sentences: sentences.max(1),
        syllables,
    }
}

/// Vowel-group syllable estimate with the usual silent-e adjustment.
pub fn count_syllables(word: &str) -> usize {
    let lower: Vec<char> = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if lower.is_empty() {
        // Numbers and symbols read as one unit.
        return 1;
    }
    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0usize;
    let mut prev_vowel = false;
    for &ch in &lower {
        let vowel = is_vowel(ch);
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }
    let n = lower.len();
    if n > 2 && lower[n - 1] == 'e' && !is_vowel(lower[n - 2]) && count > 1 {
        let le_ending = lower[n - 2] == 'l' && !is_vowel(lower[n - 3]);
        if !le_ending {
            count -= 1;
        }
    }
    count.max(1)
}
