use rulegram::{Grammar, ParseResultVerbose, RuleAttempt};
use std::sync::Arc;

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(input: &str, grammars: &[Arc<Grammar>], res: &ParseResultVerbose, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Matching: \"{}\"", input.trim()), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Grammars ━━━", ansi::GRAY));
    print_grammars(grammars, &palette);

    println!("\n{}", palette.paint("━━━ Attempts ━━━", ansi::GRAY));
    print_attempts(&res.details.attempts, &palette);

    println!("\n{}", palette.paint("━━━ Parses ━━━", ansi::GRAY));
    if res.parses.is_empty() {
        println!("{}", palette.dim("  No full parse"));
        println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
        println!("  • No enabled public rule covers every word");
        println!("  • A referenced rule could not be resolved (see warnings)");
        println!("\n{}", palette.dim("  Tip: Set RUST_LOG=rulegram=trace to follow the matcher"));
    } else {
        for (idx, parse) in res.parses.iter().enumerate() {
            println!(
                "  {} {} {} {}",
                palette.paint(format!("[{}]", idx), ansi::GRAY),
                palette.bold(palette.paint(format!("<{}.{}>", parse.grammar, parse.rule_name), ansi::GREEN)),
                palette.dim("│ tags:"),
                palette.paint(if parse.tags.is_empty() { "-".to_string() } else { parse.tags.join(" ") }, ansi::YELLOW),
            );
            println!("      {} {}", palette.dim("tree:"), palette.paint(parse.tree.to_string(), ansi::CYAN));
        }
    }

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Calls: {}  │  Parses: {}",
        palette.paint(format!("{:?}", res.details.total), ansi::GREEN),
        palette.paint(res.details.calls.to_string(), ansi::CYAN),
        palette.dim(res.parses.len().to_string()),
    );
    println!();
}

fn print_grammars(grammars: &[Arc<Grammar>], palette: &ansi::Palette) {
    for grammar in grammars {
        let public = grammar.rules().filter(|(_, r)| r.public).count();
        println!(
            "  {} {}",
            palette.paint(grammar.name(), ansi::BLUE),
            palette.dim(format!("{} rules ({} public)", grammar.rules().count(), public)),
        );
        for import in grammar.imports() {
            println!("    {} {}", palette.dim("import"), import);
        }
    }
}

fn print_attempts(attempts: &[RuleAttempt], palette: &ansi::Palette) {
    if attempts.is_empty() {
        println!("  {}", palette.dim("No rule tried"));
        return;
    }
    for attempt in attempts {
        println!(
            "  {} {}  {} {}  {} {}  {} {}",
            palette.paint(format!("<{}.{}>", attempt.grammar, attempt.rule), ansi::CYAN),
            palette.dim(format!("{:?}", attempt.duration)),
            palette.dim("calls:"),
            palette.paint(attempt.calls.to_string(), ansi::YELLOW),
            palette.dim("depth:"),
            palette.paint(attempt.max_depth.to_string(), ansi::YELLOW),
            palette.dim("full:"),
            if attempt.full > 0 {
                palette.paint(format!("✓ {}/{}", attempt.full, attempt.candidates), ansi::GREEN)
            } else {
                palette.dim(format!("✗ 0/{}", attempt.candidates))
            }
        );
    }
}
