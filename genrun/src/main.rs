use genvm::{GeneratorError, Repl, Runtime, Value, interp::parse_literal};

#[derive(clap::Parser)]
#[command(name = "genrun", version, about = "Generator assembly runner")]
struct Cli {
    /// Execute assembly source
    #[arg(short, long)]
    eval: Option<String>,

    /// Generator function to run
    #[arg(long, default_value = "main")]
    entry: String,

    /// Stop after this many produced values
    #[arg(short, long)]
    limit: Option<usize>,

    /// Values passed with send() instead of next(), one per step
    #[arg(short, long)]
    send: Vec<String>,

    /// Assembly file to execute
    file: Option<std::path::PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    // Initialize logger (controlled by RUST_LOG)
    env_logger::init();

    let cli = <Cli as clap::Parser>::parse();

    let source = if let Some(script) = cli.eval.clone() {
        script
    } else if let Some(ref file) = cli.file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error reading file {}: {e}", file.display());
                std::process::exit(1);
            }
        }
    } else {
        // No script argument -> start the interactive stepping REPL
        run_persistent_repl()?;
        return Ok(());
    };

    if let Err(err) = run(&source, &cli) {
        eprintln!("{err}");
        if let Some(exception) = err.thrown() {
            for cause in exception.chain().iter().skip(1) {
                eprintln!("  caused by {cause}");
            }
        }
        if let Some(file_path) = cli.file.as_ref() {
            eprintln!("  in file: {}", file_path.display());
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run(source: &str, cli: &Cli) -> Result<(), GeneratorError> {
    let mut rt = Runtime::from_source(source)?;
    let generator = rt.spawn(&cli.entry, Vec::new())?;
    let mut sends = cli.send.iter();
    let mut produced = 0usize;

    rt.rewind(&generator)?;
    while rt.valid(&generator)? {
        flush(&mut rt);
        let key = rt.key(&generator)?.unwrap_or(Value::Null);
        let value = rt.current(&generator)?.unwrap_or(Value::Null);
        println!("{key:?} => {value:?}");
        produced += 1;
        if cli.limit.is_some_and(|limit| produced >= limit) {
            log::info!("stopping after {produced} values");
            rt.destroy(&generator)?;
            flush(&mut rt);
            return Ok(());
        }

        match sends.next() {
            Some(text) => {
                let value = parse_literal(text).unwrap_or_else(|| Value::str(text));
                rt.send(&generator, value)?;
            }
            None => rt.next(&generator)?,
        }
    }
    flush(&mut rt);
    if let Some(retval) = generator.retval() {
        println!("return {retval:?}");
    }
    Ok(())
}

fn flush(rt: &mut Runtime<genvm::Interpreter>) {
    for line in rt.take_output() {
        println!("{line}");
    }
}

// Persistent rustyline-powered REPL loop extracted into a helper to keep `main()` small.
#[allow(clippy::println_empty_string)]
fn run_persistent_repl() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    use rustyline::Editor;
    use rustyline::error::ReadlineError;
    use std::path::PathBuf;

    let ver = clap::crate_version!();
    println!("genvm stepping REPL v{ver}. Define functions with fn ... end, then `start NAME`. Type 'exit' or Ctrl-D to quit.");

    let mut rl = match Editor::<(), rustyline::history::FileHistory>::new() {
        Ok(e) => e,
        Err(err) => {
            eprintln!("Failed to initialize line editor: {err}");
            std::process::exit(1);
        }
    };

    let history_path: Option<PathBuf> = std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".genvm_history"));
    if let Some(ref p) = history_path
        && let Err(err) = rl.load_history(p)
    {
        log::debug!("no history loaded from {}: {err}", p.display());
    }

    let mut repl = Repl::new();
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "gen> " } else { ".... " };

        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if buffer.is_empty() && (trimmed == "exit" || trimmed == ".exit") {
                    break;
                }

                if buffer.is_empty() {
                    buffer = line.clone();
                } else {
                    buffer.push('\n');
                    buffer.push_str(&line);
                }

                // a function definition keeps reading until its `end`
                if !Repl::is_complete_input(&buffer) {
                    continue;
                }

                if buffer.trim().is_empty() {
                    buffer.clear();
                    continue;
                }

                rl.add_history_entry(buffer.clone())?;

                match repl.eval(&buffer) {
                    Ok(out) if out.is_empty() => {}
                    Ok(out) => println!("{out}"),
                    Err(e) => {
                        eprintln!("{e}");
                        if buffer.lines().count() == 1 {
                            eprintln!("  at: {}", buffer.trim());
                        }
                    }
                }

                buffer.clear();
            }
            Err(ReadlineError::Interrupted) => {
                println!("");
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye");
                break;
            }
            Err(err) => {
                eprintln!("Readline error: {err}");
                break;
            }
        }
    }

    if let Some(ref p) = history_path {
        rl.save_history(p)?;
    }
    Ok(())
}
