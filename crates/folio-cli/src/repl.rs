//! Interactive REPL for Folio.
//!
//! Launch with `folio repl`. Enrichment requests return immediately and run
//! in the background; use `/status` or `/show` to watch them settle.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use tokio::runtime::Handle;

use folio::Dispatch;

use crate::render::{render_report, status_label};
use crate::session::Session;

/// A REPL command and whether its arguments are project keys.
struct Command {
    name: &'static str,
    about: &'static str,
    takes_keys: bool,
}

const fn command(name: &'static str, about: &'static str, takes_keys: bool) -> Command {
    Command {
        name,
        about,
        takes_keys,
    }
}

const COMMANDS: &[Command] = &[
    command("/list", "List projects and their summary status", false),
    command("/enrich", "Request summaries for one or more projects", true),
    command("/all", "Request summaries for every project", false),
    command("/status", "Show the enrichment state of every project", false),
    command("/show", "Show a project's summary or error", true),
    command("/wait", "Wait for a project (or everything) to settle", true),
    command("/clear", "Clear the screen", false),
    command("/help", "Show available commands", false),
    command("/exit", "Quit the REPL", false),
];

fn takes_keys(name: &str) -> bool {
    COMMANDS.iter().any(|c| c.name == name && c.takes_keys)
}

/// REPL helper for tab completion of commands and project keys.
struct FolioHelper {
    keys: Vec<String>,
}

impl Completer for FolioHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|c| c.name.starts_with(input))
                .map(|c| Pair {
                    display: format!("{:<16} {}", c.name, c.about),
                    replacement: format!("{} ", c.name),
                })
                .collect();
            return Ok((0, matches));
        }

        let cmd = input.split(' ').next().unwrap_or("");
        if takes_keys(cmd) {
            let word_start = input.rfind(' ').map(|i| i + 1).unwrap_or(0);
            let prefix = &input[word_start..];
            let matches: Vec<Pair> = self
                .keys
                .iter()
                .filter(|k| k.starts_with(prefix))
                .map(|k| Pair {
                    display: k.clone(),
                    replacement: format!("{k} "),
                })
                .collect();
            return Ok((word_start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for FolioHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        COMMANDS
            .iter()
            .find(|c| c.name.starts_with(line) && c.name != line)
            .map(|c| c.name[line.len()..].to_string())
    }
}

impl Highlighter for FolioHelper {}
impl Validator for FolioHelper {}
impl Helper for FolioHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Run the interactive REPL.
///
/// Must run on a blocking thread (not inside an async task); `handle` is used
/// to wait on the tracker for `/wait`.
pub fn run(session: Session, handle: Handle) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mfolio v{}\x1b[0m \x1b[90m\u{2014} project summaries\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let keys = session.catalog().keys().map(str::to_string).collect();
    let mut rl: Editor<FolioHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(FolioHelper { keys }));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".folio_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mfolio>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let mut parts = input.splitn(2, ' ');
                let cmd = parts.next().unwrap_or("");
                let args = parts.next().unwrap_or("").trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "list" | "status" => cmd_status(&session),
                    "enrich" => cmd_enrich(&session, args),
                    "all" => {
                        let keys: Vec<String> =
                            session.catalog().keys().map(str::to_string).collect();
                        cmd_enrich(&session, &keys.join(" "));
                    }
                    "show" => cmd_show(&session, args),
                    "wait" => cmd_wait(&session, &handle, args),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for c in COMMANDS {
        eprintln!("    {:<18} {}", c.name, c.about);
    }
    eprintln!();
    eprintln!("  Tip: Tab completes commands and project keys.");
    eprintln!();
}

fn cmd_status(session: &Session) {
    eprintln!();
    for report in session.reports() {
        eprintln!(
            "    {:<28} {:<12} {}",
            report.key,
            report.state.status(),
            status_label(&report.state)
        );
    }
    eprintln!();
}

fn cmd_enrich(session: &Session, args: &str) {
    if args.is_empty() {
        eprintln!("  Usage: /enrich <key> [key...]");
        return;
    }
    for key in args.split_whitespace() {
        match session.request(key) {
            Ok(Dispatch::Started { .. }) => {
                eprintln!("  {key}: {}", status_label(&session.tracker().state(key)))
            }
            Ok(Dispatch::Suppressed) => eprintln!("  {key}: already summarizing"),
            Err(e) => eprintln!("  {e}"),
        }
    }
}

fn cmd_show(session: &Session, args: &str) {
    let Some(key) = args.split_whitespace().next() else {
        eprintln!("  Usage: /show <key>");
        return;
    };
    match session.report(key) {
        Ok(report) => {
            eprintln!();
            eprint!("{}", render_report(&report));
            eprintln!();
        }
        Err(e) => eprintln!("  {e}"),
    }
}

fn cmd_wait(session: &Session, handle: &Handle, args: &str) {
    let keys: Vec<String> = match args.split_whitespace().next() {
        Some(key) => vec![key.to_string()],
        None => session
            .tracker()
            .snapshot()
            .into_iter()
            .filter(|(_, state)| state.is_in_flight())
            .map(|(key, _)| key)
            .collect(),
    };

    for key in &keys {
        handle.block_on(session.tracker().wait_until_settled(key));
        cmd_show(session, key);
    }
}
