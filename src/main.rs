use clap::{Parser as ClapParser, Subcommand};
use report_expr::cli::{self, CheckOptions, CheckResult, CliError};
use report_expr::{Engine, EngineConfig};
use std::io::{self, Read};
use std::path::PathBuf;

#[derive(ClapParser)]
#[command(name = "rexpr")]
#[command(about = "rexpr - evaluate report expressions and inspect their grammar")]
#[command(version)]
struct Cli {
    /// Log engine diagnostics (parse failures, unresolved functions) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Grammar file replacing the built-in expression grammar
    #[arg(long, global = true)]
    grammar: Option<PathBuf>,

    /// Default delimiter for join()
    #[arg(long, global = true)]
    delimiter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate expressions in order against JSON input
    Eval {
        /// Expressions to evaluate; assignments carry over to later ones
        #[arg(required = true)]
        expressions: Vec<String>,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Check that expressions compile and print them fully parenthesized
    Check {
        #[arg(required = true)]
        expressions: Vec<String>,
    },

    /// List the tokens of an expression
    Tokens {
        expression: String,

        /// Keep comments, attached to the following token
        #[arg(long)]
        comments: bool,
    },

    /// Show the parse tree of an expression
    Tree { expression: String },

    /// Print a grammar file (or the built-in grammar) in normalized form
    Grammar { file: Option<PathBuf> },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let attach_comments = matches!(cli.command, Commands::Tokens { comments: true, .. });
    let mut config = EngineConfig::default().with_attached_comments(attach_comments);
    if let Some(path) = &cli.grammar {
        config = config.with_grammar(std::fs::read_to_string(path)?);
    }
    if let Some(delimiter) = cli.delimiter {
        config = config.with_join_delimiter(delimiter);
    }
    let engine = Engine::with_config(config)?;

    match cli.command {
        Commands::Eval {
            expressions,
            input,
            pretty,
        } => run_eval(&engine, expressions, input, pretty),
        Commands::Check { expressions } => {
            for expression in &expressions {
                println!("{}", engine.try_compile(expression)?);
            }
            Ok(())
        }
        Commands::Tokens { expression, .. } => {
            print!("{}", cli::format_tokens(engine.grammar(), &expression)?);
            Ok(())
        }
        Commands::Tree { expression } => {
            print!("{}", cli::parse_tree_of(engine.grammar(), &expression)?);
            Ok(())
        }
        Commands::Grammar { file: Some(path) } => {
            print!("{}", cli::describe_grammar(&std::fs::read_to_string(path)?)?);
            Ok(())
        }
        Commands::Grammar { file: None } => {
            print!("{}", engine.grammar());
            Ok(())
        }
    }
}

fn run_eval(
    engine: &Engine,
    expressions: Vec<String>,
    input: Option<String>,
    pretty: bool,
) -> Result<(), CliError> {
    let input = match input {
        Some(s) => Some(s),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Some(buffer).filter(|b| !b.trim().is_empty())
        }
        None => None,
    };

    let options = CheckOptions {
        expressions,
        input,
        syntax_only: false,
    };

    if let CheckResult::Success(output) = cli::execute_check(engine, &options)? {
        let json = if pretty {
            serde_json::to_string_pretty(&output)
        } else {
            serde_json::to_string(&output)
        }?;
        println!("{}", json);
    }
    Ok(())
}
