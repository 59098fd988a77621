//! Fitting banner text into a fixed box.
//!
//! drawtext cannot wrap, so text is laid out here with approximate glyph
//! metrics: shrink the font first, then split into two lines, and only
//! then truncate with an ellipsis.

use serde::Serialize;

const ELLIPSIS: char = '…';
/// Characters a line may break after
const BREAKS: [char; 7] = [' ', '　', '、', '。', '・', ',', '-'];

/// Approximate advance width of a glyph, in ems
pub fn char_width_em(c: char) -> f64 {
    match c {
        ' ' => 0.3,
        'A'..='Z' | '0'..='9' => 0.62,
        'a'..='z' => 0.52,
        // CJK, kana, full-width forms
        '\u{2E80}'..='\u{9FFF}' | '\u{AC00}'..='\u{D7AF}' | '\u{F900}'..='\u{FAFF}' | '\u{FF00}'..='\u{FFEF}' => 1.0,
        _ => 0.55,
    }
}

/// Rendered width of `text` at `font_size` pixels
pub fn measure(text: &str, font_size: u32) -> f64 {
    text.chars().map(char_width_em).sum::<f64>() * f64::from(font_size)
}

/// Laid-out text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedText {
    pub lines: Vec<String>,
    pub font_size: u32,
    pub truncated: bool,
}

impl FittedText {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Total block height with 1.2 line spacing
    pub fn height(&self) -> u32 {
        let lines = self.lines.len().max(1) as f64;
        (f64::from(self.font_size) * (1.0 + 1.2 * (lines - 1.0))).ceil() as u32
    }
}

/// A box of fixed width and a font size range to fit into it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub max_width: f64,
    pub max_font: u32,
    pub min_font: u32,
    pub step: u32,
}

impl TextBox {
    pub fn new(max_width: f64, max_font: u32, min_font: u32) -> Self {
        Self {
            max_width,
            max_font: max_font.max(min_font),
            min_font,
            step: 2,
        }
    }

    /// Candidate sizes, largest first, always ending at `min_font`
    fn sizes(&self) -> Vec<u32> {
        let mut sizes: Vec<u32> = (self.min_font..=self.max_font)
            .rev()
            .step_by(self.step.max(1) as usize)
            .collect();
        if sizes.last() != Some(&self.min_font) {
            sizes.push(self.min_font);
        }
        sizes
    }

    fn fits(&self, line: &str, size: u32) -> bool {
        measure(line, size) <= self.max_width
    }

    pub fn fit(&self, text: &str) -> FittedText {
        let text = text.trim();
        let sizes = self.sizes();

        for &size in &sizes {
            if self.fits(text, size) {
                return FittedText {
                    lines: vec![text.to_string()],
                    font_size: size,
                    truncated: false,
                };
            }
        }

        if let Some((first, second)) = split_near_middle(text) {
            for &size in &sizes {
                if self.fits(&first, size) && self.fits(&second, size) {
                    return FittedText {
                        lines: vec![first, second],
                        font_size: size,
                        truncated: false,
                    };
                }
            }
        }

        self.truncate(text)
    }

    /// Two greedy lines at the minimum size. The second line gets an
    /// ellipsis only when text is left over.
    fn truncate(&self, text: &str) -> FittedText {
        let size = self.min_font;
        let chars: Vec<char> = text.chars().collect();

        let first_len = longest_prefix(&chars, |candidate| self.fits(candidate, size));
        // Prefer breaking at a word boundary in the back half of the line
        let first_len = chars[..first_len]
            .iter()
            .rposition(|c| BREAKS.contains(c))
            .filter(|&pos| pos * 2 >= first_len)
            .map_or(first_len, |pos| pos + 1);

        let first: String = chars[..first_len].iter().collect::<String>().trim_end().to_string();
        let rest = &chars[first_len..];
        let rest: Vec<char> = rest.iter().copied().skip_while(|c| c.is_whitespace()).collect();

        let whole_rest: String = rest.iter().collect::<String>().trim_end().to_string();
        if self.fits(&whole_rest, size) {
            let mut lines = vec![first];
            if !whole_rest.is_empty() {
                lines.push(whole_rest);
            }
            return FittedText {
                lines,
                font_size: size,
                truncated: false,
            };
        }

        let second_len = longest_prefix(&rest, |candidate| self.fits(&format!("{candidate}{ELLIPSIS}"), size));
        let mut second: String = rest[..second_len].iter().collect::<String>().trim_end().to_string();
        second.push(ELLIPSIS);

        FittedText {
            lines: vec![first, second],
            font_size: size,
            truncated: true,
        }
    }
}

/// Length of the longest prefix of `chars` accepted by `fits`
fn longest_prefix(chars: &[char], fits: impl Fn(&str) -> bool) -> usize {
    let mut len = 0;
    let mut current = String::new();
    for &c in chars {
        current.push(c);
        if !fits(&current) {
            break;
        }
        len += 1;
    }
    len
}

/// Split at the break character closest to the middle, at or before it.
/// Text without break characters (typical for Japanese) splits at the middle.
fn split_near_middle(text: &str) -> Option<(String, String)> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 2 {
        return None;
    }
    let mid = chars.len() / 2;

    let split = chars[..=mid]
        .iter()
        .rposition(|c| BREAKS.contains(c))
        .filter(|&pos| pos > 0)
        .map_or(mid, |pos| pos + 1);

    let first: String = chars[..split].iter().collect::<String>().trim_end().to_string();
    let second: String = chars[split..].iter().collect::<String>().trim_start().to_string();
    (!first.is_empty() && !second.is_empty()).then_some((first, second))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_keeps_max_size() {
        let fitted = TextBox::new(1000.0, 48, 24).fit("Dog comes home");
        assert_eq!(fitted.lines, vec!["Dog comes home"]);
        assert_eq!(fitted.font_size, 48);
        assert!(!fitted.truncated);
    }

    #[test]
    fn shrinks_before_wrapping() {
        // 20 lowercase chars at 0.52em: 10.4em -> fits at 40px (416) but not 48 (499)
        let text = "abcdefghijklmnopqrst";
        let fitted = TextBox::new(420.0, 48, 24).fit(text);
        assert_eq!(fitted.lines.len(), 1);
        assert!(fitted.font_size < 48);
        assert!(measure(text, fitted.font_size) <= 420.0);
    }

    #[test]
    fn greedy_split_holds_text_the_middle_split_cannot() {
        // Middle split leaves 14 b's (72.8px) on line one; greedy fits 13 and the rest
        let text = "bbbbbbbbbbbbbbbb a a a a a a";
        let fitted = TextBox::new(70.0, 10, 10).fit(text);
        assert!(!fitted.truncated);
        assert_eq!(fitted.lines, vec!["bbbbbbbbbbbbb", "bbb a a a a a a"]);
        assert!(!fitted.text().contains(ELLIPSIS));
    }

    #[test]
    fn wraps_at_word_boundary() {
        let text = "rescued kitten reunites with family after long winter";
        let fitted = TextBox::new(500.0, 48, 24).fit(text);
        assert_eq!(fitted.lines.len(), 2);
        assert!(!fitted.truncated);
        assert_eq!(fitted.lines.join(" "), text);
    }

    #[test]
    fn japanese_splits_at_punctuation() {
        let (first, second) = split_near_middle("行方不明の犬、三百キロ先の家族のもとへ").unwrap();
        assert!(first.ends_with('、'));
        assert_eq!(format!("{first}{second}"), "行方不明の犬、三百キロ先の家族のもとへ");
    }

    #[test]
    fn truncates_last() {
        let text = "an extremely long headline that cannot possibly fit even on two lines of a very narrow box";
        let b = TextBox::new(200.0, 40, 20);
        let fitted = b.fit(text);
        assert!(fitted.truncated);
        assert_eq!(fitted.font_size, 20);
        assert_eq!(fitted.lines.len(), 2);
        assert!(fitted.lines[1].ends_with(ELLIPSIS));
        for line in &fitted.lines {
            assert!(measure(line, 20) <= 200.0, "{line} overflows");
        }
    }

    #[test]
    fn sizes_include_min() {
        let sizes = TextBox::new(100.0, 47, 24).sizes();
        assert_eq!(sizes.first(), Some(&47));
        assert_eq!(sizes.last(), Some(&24));
    }

    #[test]
    fn height_accounts_for_line_spacing() {
        let fitted = FittedText {
            lines: vec!["a".into(), "b".into()],
            font_size: 40,
            truncated: false,
        };
        assert_eq!(fitted.height(), 88);
    }
}
