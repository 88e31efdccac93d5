//! Decides whether two streamed fragments need a space between them.
//!
//! Spaces must never land inside a `$...$` / `$$...$$` span or inside a
//! LaTeX command name that arrived in pieces (`\te` + `xt`).

use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    /// Command names that are complete tokens on their own.
    static ref STANDALONE_COMMANDS: HashSet<&'static str> = [
        // operators
        "cdot", "times", "div", "pm", "mp", "ast", "star", "circ", "bullet", "oplus", "otimes",
        // functions
        "sin", "cos", "tan", "sec", "csc", "cot", "arcsin", "arccos", "arctan", "sinh", "cosh",
        "tanh", "log", "ln", "lg", "exp", "lim", "max", "min", "sup", "inf", "det", "gcd", "deg",
        // big operators and calculus
        "sum", "prod", "int", "iint", "oint", "partial", "nabla", "infty",
        // lowercase greek
        "alpha", "beta", "gamma", "delta", "epsilon", "varepsilon", "zeta", "eta", "theta",
        "vartheta", "iota", "kappa", "lambda", "mu", "nu", "xi", "pi", "varpi", "rho", "sigma",
        "tau", "upsilon", "phi", "varphi", "chi", "psi", "omega",
        // uppercase greek
        "Gamma", "Delta", "Theta", "Lambda", "Xi", "Pi", "Sigma", "Upsilon", "Phi", "Psi", "Omega",
        // relations
        "le", "leq", "ge", "geq", "ne", "neq", "approx", "equiv", "sim", "simeq", "cong", "propto",
        "ll", "gg", "perp", "parallel", "mid",
        // sets and logic
        "in", "notin", "ni", "subset", "supset", "subseteq", "supseteq", "cup", "cap", "emptyset",
        "forall", "exists", "neg", "land", "lor",
        // arrows
        "to", "gets", "rightarrow", "leftarrow", "Rightarrow", "Leftarrow", "leftrightarrow",
        "Leftrightarrow", "implies", "iff", "mapsto",
        // spacing and dots
        "quad", "qquad", "ldots", "cdots", "vdots", "ddots", "dots",
        // misc
        "angle", "triangle", "degree", "prime",
    ]
    .into_iter()
    .collect();
}

const CLOSING_PUNCTUATION: &[char] = &['.', ',', '!', '?', ':', ';', ')', '\'', '"'];
const OPENING_PUNCTUATION: &[char] = &['\'', '"', '('];

/// Whether `name` (without the backslash) is a complete command on its own.
pub fn is_standalone_command(name: &str) -> bool {
    STANDALONE_COMMANDS.contains(name)
}

/// Running parity of the math delimiters seen in an accumulated string.
///
/// `$$` pairs are counted left to right without overlap, which is the same
/// as summing `run / 2` over every maximal run of `$`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MathParity {
    single_odd: bool,
    double_odd: bool,
    trailing_run_odd: bool,
}

impl MathParity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(text: &str) -> Self {
        let mut parity = Self::new();
        parity.push_str(text);
        parity
    }

    pub fn push_str(&mut self, text: &str) {
        for c in text.chars() {
            if c == '$' {
                self.single_odd = !self.single_odd;
                self.trailing_run_odd = !self.trailing_run_odd;
                if !self.trailing_run_odd {
                    self.double_odd = !self.double_odd;
                }
            } else {
                self.trailing_run_odd = false;
            }
        }
    }

    /// Odd number of `$` seen so far.
    pub fn in_inline_math(&self) -> bool {
        self.single_odd
    }

    /// Odd number of `$$` seen so far.
    pub fn in_display_math(&self) -> bool {
        self.double_odd
    }
}

/// Decides whether a single space goes between `prev` and `next`.
///
/// Rescans `prev` for delimiter parity; use [`should_insert_space_with`]
/// when the parity is already tracked.
pub fn should_insert_space(prev: &str, next: &str) -> bool {
    should_insert_space_with(&MathParity::of(prev), prev, next)
}

/// Same decision as [`should_insert_space`], with `parity` being
/// `MathParity::of(prev)`.
pub fn should_insert_space_with(parity: &MathParity, prev: &str, next: &str) -> bool {
    let (Some(last), Some(first)) = (prev.chars().next_back(), next.chars().next()) else {
        return false;
    };

    // Existing whitespace already separates the fragments.
    if last.is_whitespace() || first.is_whitespace() {
        return false;
    }

    if parity.in_inline_math() || parity.in_display_math() {
        return false;
    }

    if last == '\\' {
        return false;
    }

    if first.is_ascii_alphabetic() {
        if let Some(name) = trailing_command_name(prev) {
            if !is_standalone_command(name) {
                return false;
            }
        }
    }

    if first == '$' {
        return false;
    }

    if CLOSING_PUNCTUATION.contains(&first) {
        return false;
    }

    if OPENING_PUNCTUATION.contains(&last) {
        return false;
    }

    true
}

/// Letters of a `\name` run at the very end of `text`, if any.
fn trailing_command_name(text: &str) -> Option<&str> {
    let letters = text
        .bytes()
        .rev()
        .take_while(u8::is_ascii_alphabetic)
        .count();
    if letters == 0 {
        return None;
    }
    let start = text.len() - letters;
    let before = text[..start].chars().next_back()?;
    (before == '\\').then(|| &text[start..])
}
