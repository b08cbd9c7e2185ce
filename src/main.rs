//! fservice CLI - run built-in services from request files

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use fservice::{builtin_registry, Context, EventLog, FixSuggestion, Outbox, Request, Result};

/// Exit code when the run finished with validation errors
const EXIT_INVALID: i32 = 2;

#[derive(Parser)]
#[command(name = "fservice")]
#[command(about = "Declarative service resolution engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a request file and print the outcome as JSON
    Run {
        /// Path to a request .yaml file
        file: String,

        /// Locale for validation messages (overrides the request file)
        #[arg(short, long)]
        locale: Option<String>,

        /// Run after-commit callbacks when the run succeeds
        #[arg(long)]
        commit: bool,

        /// Include the resolution event log in the output
        #[arg(long)]
        events: bool,
    },

    /// List built-in services and traits
    List,

    /// Show the flattened declarations of a service
    Inspect {
        /// Service name
        service: String,
    },
}

fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            locale,
            commit,
            events,
        } => run_request(&file, locale.as_deref(), commit, events),
        Commands::List => list_services().map(|_| 0),
        Commands::Inspect { service } => inspect_service(&service).map(|_| 0),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            if let Some(suggestion) = e.fix_suggestion() {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

fn run_request(file: &str, locale: Option<&str>, commit: bool, with_events: bool) -> Result<i32> {
    let request = Request::load(file)?;
    let outbox = Outbox::new();
    let events = EventLog::new();

    let ctx = Context::builder(builtin_registry(&outbox)?)
        .locale(request.locale(locale))
        .event_log(events.clone())
        .build();

    let mut service = ctx.service(&request.descriptor())?;
    let outcome = service.run()?;

    if outcome.is_ok() && (commit || request.commit) {
        service.run_after_commit_callbacks()?;
    }

    let mut output = serde_json::to_value(&outcome)?;
    if commit || request.commit {
        output["notifications"] = json!(outbox.messages());
    }
    if with_events {
        output["events"] = events.to_json();
    }
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(if outcome.is_ok() { 0 } else { EXIT_INVALID })
}

fn list_services() -> Result<()> {
    let registry = builtin_registry(&Outbox::new())?;

    for name in registry.names() {
        let blueprint = registry.blueprint(name)?;
        let kind = if blueprint.has_loader("result") {
            "service".green()
        } else {
            "trait".cyan()
        };
        println!("{:<18} {}", name.bold(), kind);
    }

    Ok(())
}

fn inspect_service(name: &str) -> Result<()> {
    let registry = builtin_registry(&Outbox::new())?;
    let blueprint = registry.blueprint(name)?;

    println!("{} {}", "Service:".cyan().bold(), blueprint.name().bold());
    if !blueprint.traits().is_empty() {
        println!("  {} {}", "Traits:".cyan(), blueprint.traits().join(", "));
    }

    println!("  {}", "Loaders:".cyan());
    for key in blueprint.loader_keys() {
        let deps: Vec<&str> = blueprint
            .loader(key)
            .map(|l| l.deps().iter().map(|d| d.key()).collect())
            .unwrap_or_default();
        println!("    {} ← [{}]", key, deps.join(", "));
    }

    println!("  {}", "Rules:".cyan());
    for key in blueprint.rule_keys() {
        let rules: Vec<String> = blueprint
            .rules(key)
            .map(|rule| match blueprint.rule_origin(key, rule) {
                Some(origin) if origin != blueprint.name() => format!("{} ({})", rule, origin.dimmed()),
                _ => rule.to_string(),
            })
            .collect();
        println!("    {}: {}", key, rules.join(" | "));
    }

    let callbacks: Vec<&str> = blueprint.callback_keys().collect();
    if !callbacks.is_empty() {
        println!("  {} {}", "Callbacks:".cyan(), callbacks.join(", "));
    }

    for key in blueprint.promise_keys() {
        println!("  {} {} after [{}]", "Promise:".cyan(), key, blueprint.promises(key).join(", "));
    }

    println!("  {}", "Names:".cyan());
    for (key, label) in blueprint.bind_names() {
        println!("    {} = \"{}\"", key, label);
    }

    Ok(())
}
