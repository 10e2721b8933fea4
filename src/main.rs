use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tfscope::addrs::InstanceKey;
use tfscope::settings::{self, Settings};
use tfscope::states::read_state;
use tfscope::{
    load_config, parse_module_instance, value_from_flatmap, ContextMeta, Diagnostics, Evaluator,
    Flatmap, Loader, SchemaCache, Severity, State, Type, Value, WalkOperation,
};

#[derive(Parser)]
#[command(name = "tfscope")]
#[command(about = "Resolve references against HCL configuration and legacy state", long_about = None)]
struct Cli {
    /// Settings file (ignored when missing)
    #[arg(long, default_value = "tfscope.toml")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve references and print their values
    Eval(EvalArgs),
    /// Decode a JSON flatmap file against an object type
    Decode {
        /// Object type, e.g. 'object({id = string, tags = map(string)})'
        #[arg(long = "type")]
        ty: Type,
        /// JSON file holding a flat string-to-string map
        file: PathBuf,
    },
}

#[derive(Args)]
struct EvalArgs {
    /// Root module directory or HCL file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Legacy JSON state file
    #[arg(long)]
    state: Option<PathBuf>,
    /// Provider schemas JSON file
    #[arg(long)]
    schemas: Option<PathBuf>,
    #[arg(long)]
    workspace: Option<String>,
    #[arg(long)]
    operation: Option<WalkOperation>,
    /// Module instance to evaluate in, e.g. module.net[0]
    #[arg(long, default_value = "")]
    module: String,
    /// Value of count.index in scope
    #[arg(long, conflicts_with = "each_key")]
    count_index: Option<i64>,
    /// for_each key in scope
    #[arg(long)]
    each_key: Option<String>,
    /// References to resolve, e.g. aws_instance.web[0].id
    #[arg(value_name = "REF", required = true)]
    refs: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = settings::load_settings_from_path(&cli.settings)
        .with_context(|| format!("failed to load {}", cli.settings.display()))?
        .unwrap_or_default();

    match cli.command {
        Commands::Eval(args) => {
            let results = run_eval(&settings, &args)?;
            let mut failed = false;
            for (reference, value, diags) in results {
                println!("{reference} = {value}");
                for d in &diags {
                    match d.severity {
                        Severity::Error => error!("{d}"),
                        Severity::Warning => warn!("{d}"),
                    }
                }
                failed |= diags.has_errors();
            }
            if failed {
                bail!("one or more references could not be resolved");
            }
        }
        Commands::Decode { ty, file } => {
            let value = run_decode(&ty, &file)?;
            println!("{value}");
        }
    }
    Ok(())
}

fn build_evaluator(settings: &Settings, args: &EvalArgs) -> Result<Evaluator> {
    let config_path = args.config.as_ref().unwrap_or(&settings.config);
    let config = load_config(config_path, &FsLoader)
        .with_context(|| format!("loading configuration {}", config_path.display()))?;

    let state = match args.state.as_ref().or(settings.state.as_ref()) {
        Some(path) => read_state(path)?,
        None => {
            info!("no state file given, using empty state");
            State::default()
        }
    };

    let schemas = match args.schemas.as_ref().or(settings.schemas.as_ref()) {
        Some(path) => {
            let src = fs::read_to_string(path)
                .with_context(|| format!("reading provider schemas {}", path.display()))?;
            SchemaCache::from_json(&src)
                .with_context(|| format!("parsing provider schemas {}", path.display()))?
        }
        None => SchemaCache::new(),
    };
    info!("loaded {} provider schema(s)", schemas.len());

    Ok(Evaluator {
        operation: args.operation.unwrap_or(settings.operation),
        meta: ContextMeta {
            env: args
                .workspace
                .clone()
                .unwrap_or_else(|| settings.workspace.clone()),
        },
        config: Arc::new(config),
        provider_schemas: Arc::new(schemas),
        state: Arc::new(RwLock::new(state)),
    })
}

fn run_eval(settings: &Settings, args: &EvalArgs) -> Result<Vec<(String, Value, Diagnostics)>> {
    let evaluator = build_evaluator(settings, args)?;
    let module = parse_module_instance(&args.module)?;
    let key = match (&args.count_index, &args.each_key) {
        (Some(i), _) => InstanceKey::Int(*i),
        (None, Some(k)) => InstanceKey::Str(k.clone()),
        (None, None) => InstanceKey::NoKey,
    };
    let scope = evaluator.scope(module, None, key);
    Ok(args
        .refs
        .iter()
        .map(|reference| {
            let (value, diags) = scope.resolve_str(reference, "<eval>");
            (reference.clone(), value, diags)
        })
        .collect())
}

fn run_decode(ty: &Type, file: &Path) -> Result<Value> {
    if !ty.is_object() {
        bail!("decode type must be an object type, got {}", ty.friendly_name());
    }
    let src = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let flat: Flatmap =
        serde_json::from_str(&src).with_context(|| format!("parsing flatmap {}", file.display()))?;
    Ok(value_from_flatmap(&flat, ty)?)
}

struct FsLoader;
impl Loader for FsLoader {
    fn load(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }
}
