use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::SystemTime;

use clap::Parser;
use colored::Colorize;
use env_logger::Env;

use mathscript::{
    FunctionError, HostSink, InMemoryGlobals, Registry, SourceEntry, SourceProvider, Value,
};

#[derive(Parser)]
#[command(name = "mathscript")]
#[command(about = "Run mathscript function definitions")]
#[command(version)]
struct Args {
    /// Directory containing .math function definitions
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Evaluate a bare expression instead of running a function
    #[arg(short, long)]
    expr: Option<String>,

    /// List the available functions and exit
    #[arg(short, long)]
    list: bool,

    /// Function to run
    function: Option<String>,

    /// Positional numeric arguments for the function
    args: Vec<f64>,
}

/// Serves `<dir>/<id>.math` files; modification times come straight from the
/// filesystem, so an unchanged directory rescans to nothing.
struct DirSourceProvider {
    dir: PathBuf,
}

impl SourceProvider for DirSourceProvider {
    fn list(&self) -> Vec<SourceEntry> {
        let mut entries = Vec::new();
        let Ok(dir) = fs::read_dir(&self.dir) else {
            return entries;
        };
        for entry in dir.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |e| e != "math") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push(SourceEntry {
                id: stem.to_string(),
                modified,
            });
        }
        entries
    }

    fn read(&self, id: &str) -> io::Result<String> {
        fs::read_to_string(self.dir.join(format!("{id}.math")))
    }
}

/// Prints each named output as `name = value`.
struct Print;

impl HostSink for Print {
    fn accept(&mut self, name: &str, value: &Value) {
        println!("{} = {value}", name.cyan());
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut registry = Registry::new();
    registry.scan(&DirSourceProvider {
        dir: args.dir.clone(),
    });

    if args.list {
        for id in registry.ids() {
            let f = registry.get(id).unwrap();
            if f.in_error() {
                println!("{} {}", id.red(), f.error_string());
            } else {
                println!("{} ({})", id.cyan(), f.ins().join(", "));
            }
        }
        return;
    }

    let globals = InMemoryGlobals::new();
    let result = match (&args.expr, &args.function) {
        (Some(expr), _) => registry
            .run_expression(expr, &globals)
            .map(|value| println!("{value}")),
        (None, Some(function)) => {
            let values = args.args.iter().copied().map(Value::Number).collect();
            registry
                .run_into(function, values, &globals, &mut Print)
                .map(|_| ())
        }
        (None, None) => {
            eprintln!("{}: give a function name or --expr", "error".red());
            process::exit(2);
        }
    };

    if let Err(e) = result {
        report(e);
        process::exit(1);
    }
}

fn report(e: FunctionError) {
    eprintln!("{}: {e}", "error".red());
}
