use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};

use fieldlens::buffer::FileSource;
use fieldlens::manifest::SchemaManifest;
use fieldlens::paths::expand_paths;
use fieldlens::{fields, LensMap, ManifestSet};

/// Name of the defaults file picked up from the working directory.
const DEFAULTS_FILE: &str = "Knot8file";

#[derive(Parser)]
#[command(name = "fieldlens")]
#[command(about = "Edit annotated fields of manifests in place", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set field values.
    Set(SetCmd),
    /// Like set, but always stream the result to stdout.
    Cat(SetCmd),
    /// Show available fields and their values.
    Values {
        #[command(flatten)]
        common: CommonFlags,
        /// Print only field names, not their values.
        #[arg(short = 'k', long)]
        names_only: bool,
        /// Print the value of one specific field.
        field: Option<String>,
    },
    /// Show the values that differ from the frozen original.
    Diff {
        #[command(flatten)]
        common: CommonFlags,
    },
    /// Pull an upstream revision and merge local edits into it.
    Pull {
        #[command(flatten)]
        common: CommonFlags,
        /// Upstream file to merge.
        upstream: PathBuf,
    },
    /// Check that the manifests follow the field rules.
    Lint {
        #[command(flatten)]
        common: CommonFlags,
    },
    /// Emit the schema: every manifest that declares fields, reduced to its
    /// identity and annotations.
    Schema {
        #[command(flatten)]
        common: CommonFlags,
    },
}

#[derive(Args, Clone)]
struct CommonFlags {
    /// Filenames, directories or globs containing manifests with fields;
    /// `-` reads stdin.
    #[arg(short = 'f', long = "filename")]
    paths: Vec<String>,

    /// File with out-of-band field declarations, mirroring real manifests
    /// but carrying only identity and field annotations.
    #[arg(long)]
    schema: Option<PathBuf>,
}

#[derive(Args)]
struct SetCmd {
    #[command(flatten)]
    common: CommonFlags,

    /// Values to set: field=value, or field=@file to read the value from a
    /// file (escape a literal leading @ with a backslash).
    values: Vec<String>,

    /// Read values from one or more plain `field: value` YAML files.
    #[arg(long)]
    from: Vec<PathBuf>,

    /// Save the resulting values to the frozen-original annotation.
    #[arg(long)]
    freeze: bool,

    /// Output to stdout instead of updating files in place.
    #[arg(long)]
    stdout: bool,

    /// Show a unified diff of every change.
    #[arg(long)]
    diff: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Set(cmd) => cmd_set(cmd, false),
        Commands::Cat(cmd) => cmd_set(cmd, true),
        Commands::Values {
            common,
            names_only,
            field,
        } => cmd_values(common, names_only, field),
        Commands::Diff { common } => cmd_diff(common),
        Commands::Pull { common, upstream } => cmd_pull(common, upstream),
        Commands::Lint { common } => cmd_lint(common),
        Commands::Schema { common } => cmd_schema(common),
    }
}

/// Resolves the manifest sources and the effective schema file: an explicit
/// --schema wins, otherwise a Knot8file in the working directory is used.
fn open(common: &CommonFlags) -> Result<ManifestSet> {
    let mut paths = common.paths.clone();
    if paths.is_empty() {
        paths.push("-".to_string());
    }
    let sources = expand_paths(&paths)?;
    if sources.is_empty() {
        bail!("cannot find any manifest in {:?}", common.paths);
    }

    let schema = common
        .schema
        .clone()
        .or_else(|| {
            let defaults = Path::new(DEFAULTS_FILE);
            defaults.exists().then(|| defaults.to_path_buf())
        })
        .map(FileSource::Path);

    Ok(fieldlens::open_set(sources, schema)?)
}

fn cmd_set(cmd: SetCmd, force_stdout: bool) -> Result<()> {
    let lenses = LensMap::default();
    let set = open(&cmd.common)?;
    set.fields.check_uniqueness(&lenses)?;

    if force_stdout || cmd.stdout {
        for file in set.manifests.files() {
            file.borrow_mut().redirect_to_stdout();
        }
    }

    // Assignment precedence: Knot8file, then --from files in order, then
    // explicit arguments.
    let mut assignments: BTreeMap<String, String> = BTreeMap::new();
    let mut from = Vec::new();
    if Path::new(DEFAULTS_FILE).exists() {
        from.push(PathBuf::from(DEFAULTS_FILE));
    }
    from.extend(cmd.from.iter().cloned());
    for path in &from {
        for (k, v) in simplified_values(path)? {
            assignments.insert(k, v);
        }
    }
    for arg in &cmd.values {
        let (field, value) = parse_assignment(arg)?;
        assignments.insert(field, value);
    }

    let before = cmd.diff.then(|| snapshot_contents(&set));

    let mut batch = set.fields.new_edit_batch(&lenses);
    let mut failed = false;
    for (field, value) in &assignments {
        if let Err(e) = batch.set(field, value) {
            eprintln!("{} {field}: {e}", "✗".red());
            failed = true;
        }
    }
    if failed {
        bail!("not all fields could be set");
    }
    batch.commit()?;

    if cmd.freeze {
        fields::freeze(&set, &lenses)?;
    }

    if let Some(before) = before {
        for (name, old) in &before {
            let file = set
                .manifests
                .files()
                .into_iter()
                .find(|f| f.borrow().name() == *name);
            if let Some(file) = file {
                let new = file.borrow().contents();
                if *old != new {
                    display_diff(name, old, &new);
                }
            }
        }
    }

    set.manifests.commit()?;
    Ok(())
}

fn cmd_values(common: CommonFlags, names_only: bool, field: Option<String>) -> Result<()> {
    let lenses = LensMap::default();
    let set = open(&common)?;

    // Non-unique values only block the full listing; the name listing and
    // single-field reads go through with a warning.
    if let Err(e) = set.fields.check_uniqueness(&lenses) {
        if !(e.is_values_not_unique() && (names_only || field.is_some())) {
            return Err(e.into());
        }
        eprintln!("{} {e}", "warning:".yellow());
    }

    if names_only {
        for name in set.fields.names() {
            println!("{name}");
        }
        return Ok(());
    }
    if let Some(field) = field {
        println!("{}", set.fields.get_value(&field, &lenses)?);
        return Ok(());
    }
    print!("{}", fields::render_values(&set.fields, &lenses)?);
    Ok(())
}

fn cmd_diff(common: CommonFlags) -> Result<()> {
    let lenses = LensMap::default();
    let set = open(&common)?;
    let dirty = fields::diff(&set, &lenses)?;
    print!("{}", serde_yaml::to_string(&dirty)?);
    Ok(())
}

fn cmd_pull(common: CommonFlags, upstream: PathBuf) -> Result<()> {
    let lenses = LensMap::default();
    let local = open(&common)?;

    let upstream_set = fieldlens::open_set(
        vec![FileSource::Path(upstream.clone())],
        common.schema.clone().map(FileSource::Path),
    )
    .with_context(|| format!("opening upstream {}", upstream.display()))?;

    fields::pull(&local, &upstream_set, &lenses)?;
    local.manifests.commit()?;
    Ok(())
}

fn cmd_lint(common: CommonFlags) -> Result<()> {
    let lenses = LensMap::default();
    let set = open(&common)?;
    set.fields.check_uniqueness(&lenses)?;
    println!(
        "{} {} fields checked",
        "✓".green(),
        set.fields.names().len()
    );
    Ok(())
}

fn cmd_schema(common: CommonFlags) -> Result<()> {
    let set = open(&common)?;
    for m in &set.manifests.0 {
        if m.annotations.borrow().is_empty() {
            continue;
        }
        println!("---");
        print!(
            "{}",
            serde_yaml::to_string(&SchemaManifest::from_manifest(m))?
        );
    }
    Ok(())
}

/// Parses a `field=value` argument. `field=@path` reads the value from a
/// file; a leading `\@` escapes a literal `@`.
fn parse_assignment(arg: &str) -> Result<(String, String)> {
    let (field, value) = arg
        .split_once('=')
        .with_context(|| format!("bad assignment {arg:?}, missing '='"))?;

    let value = if let Some(rest) = value.strip_prefix("\\@") {
        format!("@{rest}")
    } else if let Some(path) = value.strip_prefix('@') {
        fs::read_to_string(path).with_context(|| format!("reading value from {path:?}"))?
    } else {
        value.to_string()
    };

    Ok((field.to_string(), value))
}

/// Reads a simplified values file: a plain `field: value` mapping with no
/// manifest shape. Manifest-shaped files are skipped.
fn simplified_values(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading values from {}", path.display()))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing values from {}", path.display()))?;

    let mapping = match &value {
        serde_yaml::Value::Mapping(m) => m,
        _ => return Ok(BTreeMap::new()),
    };
    let is_manifest = ["apiVersion", "kind"]
        .iter()
        .any(|k| mapping.contains_key(&serde_yaml::Value::String((*k).to_string())));
    if is_manifest {
        return Ok(BTreeMap::new());
    }

    let mut res = BTreeMap::new();
    for (k, v) in mapping {
        res.insert(scalar_to_string(k)?, scalar_to_string(v)?);
    }
    Ok(res)
}

fn scalar_to_string(v: &serde_yaml::Value) -> Result<String> {
    match v {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        other => bail!("value {other:?} is not a scalar"),
    }
}

fn snapshot_contents(set: &ManifestSet) -> BTreeMap<String, String> {
    set.manifests
        .files()
        .into_iter()
        .map(|f| {
            let f = f.borrow();
            (f.name(), f.contents())
        })
        .collect()
}

/// Prints a unified diff between the original and edited content of a file.
fn display_diff(name: &str, original: &str, modified: &str) {
    println!("{}", format!("--- {name} (original)").dimmed());
    println!("{}", format!("+++ {name} (edited)").dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("-{change}").red(),
            ChangeTag::Insert => format!("+{change}").green(),
            ChangeTag::Equal => format!(" {change}").normal(),
        };
        print!("{line}");
    }
}
