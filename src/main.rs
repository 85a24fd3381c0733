use clap::{Parser, Subcommand};
use colored::Colorize;
use sandterm::{CommandResult, Config, Engine};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sandterm", version)]
#[command(about = "A restricted terminal: whitelisted commands confined to a sandbox directory.")]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Sandbox root, overriding the configured one
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session
    Shell,
    /// Execute a single command line
    Run {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// The command line, either quoted as one argument or as separate words
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// List the allowed commands
    Allowed {
        #[arg(long)]
        json: bool,
    },
    /// Show configuration
    Config,
}

fn init_logging(level: &str, verbose: bool) {
    let default = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_engine(cfg: &Config) -> Option<Arc<Engine>> {
    match Engine::new(cfg) {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            eprintln!(
                "{} could not prepare sandbox root {}: {}",
                "Error:".red(),
                cfg.sandbox.root,
                e
            );
            None
        }
    }
}

/// Route Ctrl+C to the running native process. With nothing to cancel,
/// `on_idle` decides what happens.
fn install_interrupt(engine: &Arc<Engine>, on_idle: fn()) {
    let engine = Arc::clone(engine);
    if let Err(e) = ctrlc::set_handler(move || {
        if engine.supervisor().is_running() {
            engine.cancel();
        } else {
            on_idle();
        }
    }) {
        tracing::warn!("could not install Ctrl+C handler: {}", e);
    }
}

fn print_result(result: &CommandResult) {
    if !result.stdout.is_empty() {
        println!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprintln!("{}", result.stderr.red());
    }
    if let Some(rc) = result.rc.filter(|rc| *rc != 0) {
        println!("{}", format!("[exit {}]", rc).dimmed());
    }
}

fn run_shell(engine: Arc<Engine>) {
    println!("{}", format!("sandterm v{}", env!("CARGO_PKG_VERSION")).bold());
    println!("Sandbox: {}", engine.root().display().to_string().green());
    println!(
        "Type {} for the command list, {} to exit.\n",
        "help".cyan(),
        "Ctrl+D".dimmed()
    );

    install_interrupt(&engine, || {});

    let mut rl = match rustyline::DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("{} failed to initialize readline: {}", "Error:".red(), e);
            return;
        }
    };

    loop {
        let cwd = engine.cwd();
        let prompt = format!("{}$ ", engine.resolver().relative(&cwd).blue().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);
                print_result(&engine.execute(input));
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("Use Ctrl+D to exit.");
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }
}

fn run_once(engine: Arc<Engine>, command: &[String], json: bool) -> ExitCode {
    install_interrupt(&engine, || {
        std::process::exit(130);
    });

    let line = match command {
        [single] => single.clone(),
        words => shell_words::join(words),
    };
    let result = engine.execute(&line);

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error serializing result: {}", e),
        }
    } else {
        print_result(&result);
    }

    if result.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (mut cfg, diagnostic) = Config::load();
    init_logging(&cfg.logging.level, cli.verbose);
    if let Some(message) = diagnostic {
        tracing::warn!("{}", message);
    }
    if let Some(root) = cli.root {
        cfg.sandbox.root = root.display().to_string();
    }

    match cli.command {
        Commands::Shell => {
            let Some(engine) = build_engine(&cfg) else {
                return ExitCode::FAILURE;
            };
            run_shell(engine);
            ExitCode::SUCCESS
        }
        Commands::Run { json, command } => {
            let Some(engine) = build_engine(&cfg) else {
                return ExitCode::FAILURE;
            };
            run_once(engine, &command, json)
        }
        Commands::Allowed { json } => {
            let allowed = Engine::allowed();
            if json {
                println!("{}", serde_json::json!({ "allowed": allowed }));
            } else {
                println!("{}", "Allowed commands:".bold());
                println!();
                for verb in allowed {
                    println!("  {}", verb.cyan());
                }
            }
            ExitCode::SUCCESS
        }
        Commands::Config => {
            println!("{}", "Current configuration:".bold());
            if let Some(path) = Config::path() {
                println!("{}", format!("({})", path.display()).dimmed());
            }
            println!();
            match cfg.to_toml() {
                Ok(s) => println!("{}", s),
                Err(e) => eprintln!("Error serializing config: {}", e),
            }
            ExitCode::SUCCESS
        }
    }
}
