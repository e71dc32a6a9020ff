use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use walkdir::WalkDir;

use dlg_api::{
    compile, compile_strict, CreateEngineOptions, DialogueEngine, DialogueSink, SavedState,
    SpeakerLine, Value,
};

#[derive(Debug, Parser)]
#[command(name = "dlg")]
#[command(about = "Play, check and inspect dialogue scripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play a script interactively on the terminal.
    Run(RunArgs),
    /// Compile scripts and report diagnostics without playing them.
    Check(CheckArgs),
    /// Dump the compiled graph of one script as JSON.
    Graph(GraphArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    script: PathBuf,
    #[arg(long = "seed")]
    seed: Option<u32>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// A script file or a directory searched recursively for .dlg files.
    path: PathBuf,
}

#[derive(Debug, Args)]
struct GraphArgs {
    script: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {:#}", error);
            2
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run(args) => run_player(args),
        Command::Check(args) => run_check(args),
        Command::Graph(args) => run_graph(args),
    }
}

struct ConsoleSink;

impl DialogueSink for ConsoleSink {
    fn on_speaker_line(&mut self, line: &SpeakerLine) {
        println!("{}: {}", line.speaker, line.text);
    }

    fn on_event(&mut self, name: &str, args: &[Value]) {
        let rendered: Vec<String> = args.iter().map(|value| value.to_string()).collect();
        println!("  (event {} {})", name, rendered.join(" "));
    }

    fn on_finished(&mut self) {
        println!("-- end --");
    }
}

fn run_player(args: RunArgs) -> Result<i32> {
    let source = fs::read_to_string(&args.script)
        .with_context(|| format!("reading {}", args.script.display()))?;
    let mut sink = ConsoleSink;
    let mut engine = dlg_api::create_engine(
        &source,
        CreateEngineOptions {
            globals: None,
            random_seed: args.seed,
        },
        &mut sink,
    )?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    while engine.is_active() {
        print_choices(&engine);
        print!("> ");
        io::stdout().flush()?;
        let Some(input) = lines.next() else {
            break;
        };
        let input = input?;
        let input = input.trim();
        match input {
            ":quit" | ":q" => break,
            ":restart" => {
                engine.restart(true, None, true, &mut sink)?;
                continue;
            }
            _ if input.starts_with(":save") => {
                save_session(&engine, input.strip_prefix(":save").unwrap_or("").trim())?;
                continue;
            }
            _ if input.starts_with(":load") => {
                load_session(&mut engine, input.strip_prefix(":load").unwrap_or("").trim(), &mut sink)?;
                continue;
            }
            _ => {}
        }
        if engine.is_waiting_for_choice() {
            match input.parse::<usize>() {
                Ok(number) if number >= 1 && number <= engine.choices().len() => {
                    engine.choose(number - 1, &mut sink)?;
                }
                _ => println!("pick a number between 1 and {}", engine.choices().len()),
            }
        } else {
            engine.continue_dialogue(&mut sink)?;
        }
    }
    Ok(0)
}

fn print_choices(engine: &DialogueEngine) {
    if !engine.is_waiting_for_choice() {
        return;
    }
    for (index, choice) in engine.choices().iter().enumerate() {
        let text = choice.text.as_deref().unwrap_or("(continue)");
        let mark = if choice.taken_before { "*" } else { " " };
        println!("  {}{} {}", index + 1, mark, text);
    }
}

fn save_session(engine: &DialogueEngine, path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("usage: :save <file>");
    }
    let state = engine.saved_state()?;
    let json = serde_json::to_string_pretty(&state)?;
    fs::write(path, json).with_context(|| format!("writing {}", path))?;
    println!("saved to {}", path);
    Ok(())
}

fn load_session(
    engine: &mut DialogueEngine,
    path: &str,
    sink: &mut dyn DialogueSink,
) -> Result<()> {
    if path.is_empty() {
        bail!("usage: :load <file>");
    }
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let state: SavedState = serde_json::from_str(&json)?;
    engine.restore_saved_state(state, sink)?;
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<i32> {
    let files = collect_scripts(&args.path)?;
    if files.is_empty() {
        bail!("no .dlg scripts under {}", args.path.display());
    }
    let mut failed = false;
    for file in files {
        let source =
            fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
        let result = compile(&source);
        if result.log.is_empty() {
            println!("{}: ok", file.display());
            continue;
        }
        for diagnostic in &result.log.diagnostics {
            println!("{}: {}", file.display(), diagnostic);
        }
        failed |= result.log.has_errors();
    }
    Ok(if failed { 1 } else { 0 })
}

fn collect_scripts(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "dlg")
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn run_graph(args: GraphArgs) -> Result<i32> {
    let source = fs::read_to_string(&args.script)
        .with_context(|| format!("reading {}", args.script.display()))?;
    let script = compile_strict(&source)?;
    println!("{}", serde_json::to_string_pretty(&script)?);
    Ok(0)
}
