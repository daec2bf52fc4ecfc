//! Picks a self-introduced name out of a free-text message.

const INTRODUCTIONS: &[&str] = &["my name is ", "my name's ", "call me ", "i go by "];

/// Words that may precede an introduction within its clause.
const LEAD_INS: &[&str] = &[
    "hi", "hey", "hello", "and", "so", "well", "oh", "ok", "okay", "also", "btw",
];

const CLAUSE_BREAKS: &[char] = &['.', '!', '?', ',', ';', ':', '\n'];

/// Longest accepted name, in characters.
const MAX_NAME_CHARS: usize = 40;

/// Extract a name from phrasings such as "My name is Ava" or "call me Sam".
///
/// The phrase must open a clause, optionally after a lead-in like "hey".
/// Takes at most two words, stopping at punctuation, and capitalizes each.
pub fn extract_name(message: &str) -> Option<String> {
    let rest = message
        .split(CLAUSE_BREAKS)
        .map(|clause| skip_lead_in(clause.trim_start()))
        .find_map(introduced_name)?;

    let words: Vec<String> = rest
        .split(|c: char| !(c.is_alphabetic() || c == '-' || c == '\'' || c == ' '))
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .take(2)
        .map(capitalize)
        .collect();

    let name = words.join(" ");
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return None;
    }
    Some(name)
}

/// Text after an introduction phrase that opens `clause`.
fn introduced_name(clause: &str) -> Option<&str> {
    INTRODUCTIONS.iter().find_map(|intro| {
        // Introductions are ASCII, so a match ends on a char boundary.
        let head = clause.get(..intro.len())?;
        head.eq_ignore_ascii_case(intro).then(|| &clause[intro.len()..])
    })
}

fn skip_lead_in(clause: &str) -> &str {
    match clause.split_once(char::is_whitespace) {
        Some((first, rest)) if LEAD_INS.iter().any(|w| first.eq_ignore_ascii_case(w)) => {
            rest.trim_start()
        }
        _ => clause,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
