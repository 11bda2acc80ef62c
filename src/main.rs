mod debug_report;

use rulegram::{Grammar, GrammarStore, Options, SourceLoader, parse_verbose_with, simplify};
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() {
    env_logger::init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let grammars = match load_grammars(&config.grammars, config.simplify) {
        Ok(grammars) => grammars,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    let opts = Options { grammar: None, rule: config.rule.clone() };
    match parse_verbose_with(&config.input, &grammars, &opts) {
        Ok(res) => debug_report::print_run(&config.input, &grammars, &res, config.color),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

struct CliConfig {
    input: String,
    grammars: Vec<PathBuf>,
    rule: Option<String>,
    simplify: bool,
    color: bool,
}

/// Load every grammar file plus, from the same directory, the grammars they
/// import.
fn load_grammars(paths: &[PathBuf], simplify_grammars: bool) -> Result<Vec<Arc<Grammar>>, Box<dyn std::error::Error>> {
    let mut store = GrammarStore::new(true);
    for path in paths {
        let loader = SourceLoader::json_directory(path.parent().unwrap_or(Path::new(".")));
        let grammar = loader.load_path(path)?;
        let name = grammar.name().to_string();
        store.store(&name, grammar);
        store.load_imports(&name, &loader, true, false, None)?;
    }
    let grammars = store.list_all();
    if simplify_grammars { Ok(simplify(&grammars, true, true)?) } else { Ok(grammars) }
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<String> = None;
    let mut grammars: Vec<PathBuf> = Vec::new();
    let mut rule: Option<String> = None;
    let mut simplify = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("rulegram {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--simplify" => simplify = true,
            "--grammar" | "-g" => {
                let value = args.next().ok_or_else(|| "error: --grammar expects a file".to_string())?;
                grammars.push(PathBuf::from(value));
            }
            "--rule" | "-r" => {
                let value = args.next().ok_or_else(|| "error: --rule expects a rule name".to_string())?;
                rule = Some(value);
            }
            "--input" | "-i" => {
                let value = args.next().ok_or_else(|| "error: --input expects a value".to_string())?;
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(value);
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    if input.is_some() {
                        return Err("error: input provided multiple times".to_string());
                    }
                    input = Some(rest);
                }
                break;
            }
            _ if arg.starts_with("--grammar=") => {
                grammars.push(PathBuf::from(arg.trim_start_matches("--grammar=")));
            }
            _ if arg.starts_with("--rule=") => {
                rule = Some(arg.trim_start_matches("--rule=").to_string());
            }
            _ if arg.starts_with("--input=") => {
                let value = arg.trim_start_matches("--input=");
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(value.to_string());
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(rest);
                break;
            }
        }
    }

    if grammars.is_empty() {
        return Err(format!("error: no grammar given\n\n{}", help_text()));
    }

    let input = match input {
        Some(value) => value,
        None => read_stdin_input()?,
    };

    if input.trim().is_empty() {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }

    Ok(CliConfig { input, grammars, rule, simplify, color })
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "rulegram {version}

Match an utterance against rule grammars and show every parse.

Usage:
  rulegram --grammar <file.json>... [OPTIONS] [--] <utterance...>
  rulegram --grammar <file.json>... [OPTIONS] --input <text>

Options:
  -g, --grammar <file>       JSON grammar source. Repeatable. Imported grammars
                             are loaded from the same directory.
  -r, --rule <name>          Only match this rule (default: every enabled
                             public rule).
  -i, --input <text>         Utterance to match. If omitted, reads remaining
                             args or stdin when no args are provided.
  --simplify                 Eliminate <NULL> and <VOID> before matching.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  RUST_LOG=rulegram=trace    Show matcher and simplifier traces.

Exit codes:
  0  Success (with or without a parse).
  1  Grammar could not be loaded, linked or matched.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
    )
}
