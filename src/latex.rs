// LaTeX text commands that show up in arXiv titles and abstracts.
//
// Accents and escaped symbols become plain unicode and run on raw text.
// Formatting commands become tags and run on already escaped text, so the
// only markup they can produce is their own.

use once_cell::sync::Lazy;
use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: String,
}

fn rule(pattern: &str, replacement: &str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("valid latex rule"),
        replacement: replacement.to_string(),
    }
}

static ACCENT_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    // (command, combining mark); braced form first so `\'{e}` is not read as `\'{`.
    let marks = [
        (r"\\'", "\u{0301}"),
        (r"\\`", "\u{0300}"),
        (r"\\\^", "\u{0302}"),
        (r#"\\""#, "\u{0308}"),
        (r"\\~", "\u{0303}"),
        (r"\\=", "\u{0304}"),
    ];
    // letter commands need a word boundary or `\vec`, `\cite` would match.
    let letter_marks = [(r"\\u", "\u{0306}"), (r"\\v", "\u{030C}"), (r"\\c", "\u{0327}")];

    let mut rules = Vec::new();
    for (cmd, mark) in marks {
        rules.push(accent_rule(&format!(r"{}\{{([^}}]+)\}}", cmd), mark));
        rules.push(accent_rule(&format!(r"{}([a-zA-Z])", cmd), mark));
    }
    for (cmd, mark) in letter_marks {
        rules.push(accent_rule(&format!(r"{}\{{([^}}]+)\}}", cmd), mark));
        rules.push(accent_rule(&format!(r"{}\s*([a-zA-Z])\b", cmd), mark));
    }
    rules.push(rule(r"\\_", "_"));
    rules.push(rule(r"\\%", "%"));
    rules
});

fn accent_rule(pattern: &str, mark: &str) -> Rule {
    rule(pattern, &format!("${{1}}{}", mark))
}

static MARKUP_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"\\emph\{([^}]+)\}", "<em>${1}</em>"),
        rule(r"\\textbf\{([^}]+)\}", "<strong>${1}</strong>"),
        rule(r"\\textit\{([^}]+)\}", "<em>${1}</em>"),
        rule(r"\\textsc\{([^}]+)\}", r#"<span style="font-variant: small-caps;">${1}</span>"#),
        rule(r"\\texttt\{([^}]+)\}", "<code>${1}</code>"),
        rule(r"\\textrm\{([^}]+)\}", r#"<span style="font-style: normal;">${1}</span>"#),
    ]
});

fn apply(rules: &[Rule], text: &str) -> String {
    rules.iter().fold(text.to_string(), |acc, r| {
        r.pattern.replace_all(&acc, r.replacement.as_str()).into_owned()
    })
}

/// Turns accent commands into combining characters and unescapes `\_`, `\%`.
pub fn normalize_text(raw: &str) -> String {
    apply(&ACCENT_RULES, raw)
}

/// Converts text formatting commands into HTML tags. Input must already be escaped.
pub fn markup(escaped: &str) -> String {
    apply(&MARKUP_RULES, escaped)
}
