use std::{io::Write, path::PathBuf};

use clap::Parser;
use lumbung::{
    DatabaseConfig, ResultSet, Value,
    command::{Command, CommandHandler, Handle, Reply, Request},
    types::DEFAULT_PAGE_SIZE,
};
use rustyline::{DefaultEditor, error::ReadlineError};
use tracing_subscriber::EnvFilter;

const HISTORY_FILE: &str = ".lumbung_history";

/// Interactive shell for a Lumbung database.
#[derive(Debug, Parser)]
#[command(name = "lumbung", version, about)]
struct Args {
    /// Database file; an in-memory database is used when omitted
    path: Option<PathBuf>,

    /// Page size for a newly created database file
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Skip fsync after each statement
    #[arg(long)]
    no_sync: bool,
}

impl Args {
    fn config(&self) -> DatabaseConfig {
        let builder = DatabaseConfig::builder()
            .page_size(self.page_size)
            .sync_on_commit(!self.no_sync);
        match &self.path {
            Some(path) => builder.path(path).build(),
            None => builder.memory().build(),
        }
    }
}

fn welcome_message(title: &str) -> String {
    let line = "=".repeat(title.len() + 8);
    format!("{line}\n    {title}\n{line}\nType 'help' for commands.")
}

fn read_multiline_command(rl: &mut DefaultEditor) -> rustyline::Result<String> {
    let mut input = String::new();
    let mut prompt = "lumbung> ";

    loop {
        let line = rl.readline(prompt)?;
        let trimmed_line = line.trim_end();

        // Trailing backslash continues the command on the next line
        if let Some(head) = trimmed_line.strip_suffix('\\') {
            input.push_str(head);
            input.push(' ');
            prompt = "      -> ";
        } else {
            input.push_str(trimmed_line);
            break;
        }
    }

    Ok(input)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_result_set(result: &ResultSet) {
    let rendered: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(render_value).collect())
        .collect();
    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            rendered
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();
    let format_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
    };
    println!("{}", format_row(&result.columns));
    println!(
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &rendered {
        println!("{}", format_row(row));
    }
    println!("({} row{})", result.len(), if result.len() == 1 { "" } else { "s" });
}

fn process_command(handler: &mut CommandHandler, handle: Handle, request_id: &mut u64, command: &str) -> bool {
    let cmd = command.trim();

    match cmd.to_lowercase().as_str() {
        "exit" | "quit" | "q" => {
            println!("Goodbye!");
            return false;
        }
        "help" | "h" => {
            println!(
                r#"
Available commands:
  help, h          - Show this help message
  clear, ctrl + l  - Clear the screen
  exit, quit, q    - Exit the database

Any other input runs as SQL.
Use '\' at the end of a line for multiline input.
Use Up/Down arrows to navigate command history.
"#
            );
        }
        "clear" => {
            print!("\x1B[2J\x1B[1;1H");
            let _ = std::io::stdout().flush();
        }
        "" => {}
        _ => {
            *request_id += 1;
            let response = handler.handle(Request {
                id: *request_id,
                command: Command::Execute {
                    handle,
                    sql: cmd.to_string(),
                },
            });
            match response.outcome {
                Ok(Reply::Rows(result)) => print_result_set(&result),
                Ok(Reply::Affected(n)) => println!("OK, {n} row(s) affected"),
                Ok(other) => println!("{other:?}"),
                Err(e) => eprintln!("{}: {}", e.kind, e.message),
            }
        }
    }

    true
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut handler = CommandHandler::new();
    let init = handler.handle(Request {
        id: 0,
        command: Command::Init {
            config: Some(args.config()),
        },
    });
    let handle = match init.outcome {
        Ok(Reply::Initialized { handle }) => handle,
        Ok(other) => return Err(format!("unexpected reply to init: {other:?}").into()),
        Err(e) => return Err(format!("{}: {}", e.kind, e.message).into()),
    };

    println!("{}", welcome_message("LUMBUNG DB"));
    match &args.path {
        Some(path) => println!("Connected to {}", path.display()),
        None => println!("Connected to a transient in-memory database"),
    }

    let mut rl = DefaultEditor::new()?;
    let _ = rl.load_history(HISTORY_FILE);
    let mut request_id = 0;

    loop {
        match read_multiline_command(&mut rl) {
            Ok(input) => {
                let command = input.trim().to_string();
                if !command.is_empty() {
                    rl.add_history_entry(&command)?;
                    if !process_command(&mut handler, handle, &mut request_id, &command) {
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("EOF");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    let _ = rl.save_history(HISTORY_FILE);
    handler.handle(Request {
        id: request_id + 1,
        command: Command::Close { handle },
    });
    Ok(())
}
