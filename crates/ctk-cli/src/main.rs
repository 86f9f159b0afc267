use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use ctk_core::config::{self, ArtifactFormat, CONFIG_FILE_NAME, CtkConfig, PropertyPolicy};
use ctk_core::index::{self, IndexEntry, IndexStore};
use ctk_core::ir::IrDocument;
use ctk_core::parse::{self, ContractDocument};
use ctk_core::transform::{self, NormalizeOptions, ServiceFormat};
use ctk_core::{ArtifactGenerator, GeneratedFile, snapshot};
use ctk_mock::MockConfigGenerator;
use ctk_scenario::ScenarioGenerator;

#[derive(Parser)]
#[command(name = "ctk", about = "API contract normalizer and artifact generator", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize contracts into IR snapshots and merge them into the index
    Intake {
        /// OpenAPI 3.x / Swagger 2.0 contract (YAML or JSON), `.wsdl` or `.proto`
        #[arg(short, long = "spec", required = true)]
        specs: Vec<PathBuf>,

        /// Service name to use instead of the contract title
        #[arg(long)]
        service_name: Option<String>,

        /// Policy file (YAML or JSON) stored with the IR metadata
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Directory for IR snapshots
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Index file to merge into
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Generate mock-server configuration from IR snapshots
    Mock {
        /// IR snapshot produced by `ctk intake`
        #[arg(long = "ir", required = true)]
        irs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output format
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Host the mock server binds to
        #[arg(long)]
        host: Option<String>,

        /// Port per protocol kind, e.g. `rest=9100`
        #[arg(long = "port", value_parser = parse_key_val::<u16>)]
        ports: Vec<(String, u16)>,

        /// Synthesize only required response properties
        #[arg(long)]
        required_only: bool,
    },

    /// Generate smoke-test scenario bundles from IR snapshots
    Scenario {
        /// IR snapshot produced by `ctk intake`
        #[arg(long = "ir", required = true)]
        irs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Scenario id prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Extra tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Custom metadata entry, e.g. `owner=billing` (repeatable)
        #[arg(long = "meta", value_parser = parse_key_val::<String>)]
        metadata: Vec<(String, String)>,

        /// Synthesize only required request properties
        #[arg(long)]
        required_only: bool,
    },

    /// Print a summary of a contract's normalized operations
    Inspect {
        /// Contract file
        #[arg(short, long = "spec")]
        spec: PathBuf,

        /// Output format
        #[arg(long, default_value = "yaml")]
        format: OutputFormat,
    },

    /// Check that a contract normalizes without errors
    Validate {
        /// Contract file
        #[arg(short, long = "spec")]
        spec: PathBuf,
    },

    /// Search the index for operations matching every term
    Search {
        /// Index file
        #[arg(long)]
        index: Option<PathBuf>,

        /// Search terms
        terms: Vec<String>,
    },

    /// Initialize a new ctk configuration
    Init {
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

impl From<OutputFormat> for ArtifactFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Yaml => ArtifactFormat::Yaml,
            OutputFormat::Json => ArtifactFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Intake {
            specs,
            service_name,
            policy,
            output_dir,
            index,
        } => cmd_intake(specs, service_name, policy, output_dir, index),

        Commands::Mock {
            irs,
            output_dir,
            format,
            host,
            ports,
            required_only,
        } => {
            let mut cfg = try_load_config()?.unwrap_or_default();
            if let Some(format) = format {
                cfg.mock.format = format.into();
            }
            if let Some(host) = host {
                cfg.mock.host = host;
            }
            cfg.mock
                .ports
                .extend(ports.into_iter().map(|(kind, port)| (kind.to_lowercase(), port)));
            if required_only {
                cfg.synthesis.response_properties = PropertyPolicy::RequiredOnly;
            }
            let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(&cfg.mock.output_dir));
            cmd_generate("mock config", &MockConfigGenerator, &irs, &cfg, &output_dir)
        }

        Commands::Scenario {
            irs,
            output_dir,
            prefix,
            tags,
            metadata,
            required_only,
        } => {
            let mut cfg = try_load_config()?.unwrap_or_default();
            if let Some(prefix) = prefix {
                cfg.scenario.prefix = prefix;
            }
            cfg.scenario.tags.extend(tags);
            cfg.scenario.metadata.extend(metadata);
            if required_only {
                cfg.synthesis.request_properties = PropertyPolicy::RequiredOnly;
            }
            let output_dir =
                output_dir.unwrap_or_else(|| PathBuf::from(&cfg.scenario.output_dir));
            cmd_generate("scenario", &ScenarioGenerator, &irs, &cfg, &output_dir)
        }

        Commands::Inspect { spec, format } => cmd_inspect(spec, format),

        Commands::Validate { spec } => cmd_validate(spec),

        Commands::Search { index, terms } => cmd_search(index, terms),

        Commands::Init { force } => cmd_init(force),

        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::generate(shell, &mut cmd, "ctk", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Parse a `key=value` argument.
fn parse_key_val<T>(arg: &str) -> Result<(String, T), String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{arg}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{arg}`"));
    }
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value in `{arg}`: {e}"))?;
    Ok((key.to_string(), value))
}

/// Try to load the project config file from the current directory.
fn try_load_config() -> Result<Option<CtkConfig>> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);
    config::load_config(&config_path).map_err(|e| anyhow::anyhow!(e))
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

fn read_contract(path: &Path) -> Result<ContractDocument> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = if is_json(path) {
        parse::from_json(&content)
    } else {
        parse::from_yaml(&content)
    };
    parsed.with_context(|| format!("failed to parse {}", path.display()))
}

fn read_policy(path: &Path) -> Result<serde_json::Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value = if is_json(path) {
        serde_json::from_str(&content).map_err(anyhow::Error::from)
    } else {
        parse::yaml_value(&content).map_err(anyhow::Error::from)
    };
    value.with_context(|| format!("failed to parse policy {}", path.display()))
}

fn normalize_options(cfg: &CtkConfig) -> NormalizeOptions {
    NormalizeOptions {
        naming_strategy: cfg.naming.strategy,
        aliases: cfg.naming.aliases.clone(),
        ..NormalizeOptions::default()
    }
}

/// Normalize an OpenAPI document, or a `.wsdl` / `.proto` service definition.
fn load_ir(path: &Path, options: &NormalizeOptions) -> Result<IrDocument> {
    let options = NormalizeOptions {
        source: Some(path.display().to_string()),
        ..options.clone()
    };
    let normalized = match ServiceFormat::from_path(path) {
        Some(format) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            transform::normalize_service(&content, format, &options)
        }
        None => transform::normalize_with_options(&read_contract(path)?, &options),
    };
    normalized.with_context(|| format!("failed to normalize {}", path.display()))
}

fn report_operation_errors(ir: &IrDocument) {
    for err in &ir.errors {
        eprintln!("  warning: skipped {err}");
    }
}

/// Write generated files to disk under the given base directory.
fn write_files(base: &Path, files: &[GeneratedFile]) -> Result<()> {
    for file in files {
        let path = base.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        fs::write(&path, &file.content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("  wrote {}", path.display());
    }
    Ok(())
}

fn cmd_intake(
    specs: Vec<PathBuf>,
    service_name: Option<String>,
    policy: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    index: Option<PathBuf>,
) -> Result<()> {
    if service_name.is_some() && specs.len() > 1 {
        anyhow::bail!("--service-name applies to a single --spec");
    }

    let cfg = try_load_config()?.unwrap_or_default();
    let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(&cfg.intake.output_dir));
    let index_path = index.unwrap_or_else(|| PathBuf::from(&cfg.intake.index_path));
    let options = NormalizeOptions {
        service_name,
        policy: policy.as_deref().map(read_policy).transpose()?,
        ..normalize_options(&cfg)
    };

    let (entries, failed) = intake_specs(&specs, &options, &output_dir);

    if !entries.is_empty() {
        let added = entries.len();
        let merged = IndexStore::new(&index_path)
            .merge(entries)
            .with_context(|| format!("failed to update index {}", index_path.display()))?;
        eprintln!(
            "Indexed {added} operations into {} ({} total)",
            index_path.display(),
            merged.len()
        );
    }

    if !failed.is_empty() {
        anyhow::bail!("{} of {} contracts failed: {}", failed.len(), specs.len(), failed.join(", "));
    }
    Ok(())
}

/// Normalize and snapshot each contract. A contract that fails either step
/// is reported and skipped; the rest still reach the index.
fn intake_specs(
    specs: &[PathBuf],
    options: &NormalizeOptions,
    output_dir: &Path,
) -> (Vec<IndexEntry>, Vec<String>) {
    let mut entries = Vec::new();
    let mut failed = Vec::new();
    for spec in specs {
        eprintln!("Normalizing {}", spec.display());
        match intake_spec(spec, options, output_dir) {
            Ok(ir) => entries.extend(index::entries(&ir)),
            Err(e) => {
                eprintln!("  error: {e:#}");
                failed.push(spec.display().to_string());
            }
        }
    }
    (entries, failed)
}

fn intake_spec(spec: &Path, options: &NormalizeOptions, output_dir: &Path) -> Result<IrDocument> {
    let ir = load_ir(spec, options)?;
    report_operation_errors(&ir);

    let path = snapshot::save(output_dir, &ir)
        .with_context(|| format!("failed to save snapshot of {}", spec.display()))?;
    eprintln!("  wrote {}", path.display());
    eprintln!(
        "  {} {}: {} operations, {} skipped",
        ir.service,
        ir.version,
        ir.operations.len(),
        ir.errors.len()
    );
    Ok(ir)
}

fn cmd_generate<G>(
    label: &str,
    generator: &G,
    irs: &[PathBuf],
    cfg: &CtkConfig,
    output_dir: &Path,
) -> Result<()>
where
    G: ArtifactGenerator<Config = CtkConfig>,
    G::Error: Send + Sync + 'static,
{
    for path in irs {
        let ir = snapshot::load(path)
            .with_context(|| format!("failed to load IR snapshot {}", path.display()))?;
        eprintln!(
            "Generating {label} for {} {} → {}",
            ir.service,
            ir.version,
            output_dir.display()
        );
        let files = generator
            .generate(&ir, cfg)
            .with_context(|| format!("failed to generate {label} for {}", path.display()))?;
        write_files(output_dir, &files)?;
        eprintln!("Generated {} files", files.len());
    }
    Ok(())
}

fn cmd_inspect(spec: PathBuf, format: OutputFormat) -> Result<()> {
    let cfg = try_load_config()?.unwrap_or_default();
    let ir = load_ir(&spec, &normalize_options(&cfg))?;
    let summary = build_inspect_summary(&ir);

    match format {
        OutputFormat::Yaml => {
            let yaml = serde_yaml_ng::to_string(&summary)?;
            print!("{}", yaml);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn build_inspect_summary(ir: &IrDocument) -> serde_json::Value {
    let operations: Vec<serde_json::Value> = ir
        .operations
        .iter()
        .map(|op| {
            serde_json::json!({
                "operation": op.operation_id,
                "method": op.method.as_str(),
                "path": op.path,
                "parameters": op.parameters.iter().map(|p| &p.name).collect::<Vec<_>>(),
                "request_body": op.request_body.as_ref().map(|b| &b.content_type),
                "responses": op.responses.keys().collect::<Vec<_>>(),
                "tags": op.tags,
            })
        })
        .collect();

    serde_json::json!({
        "service": ir.service,
        "version": ir.version,
        "protocol": ir.protocol,
        "operations": operations,
        "errors": ir.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    })
}

fn cmd_validate(spec: PathBuf) -> Result<()> {
    if let Some(format) = ServiceFormat::from_path(&spec) {
        let cfg = try_load_config()?.unwrap_or_default();
        let ir = load_ir(&spec, &normalize_options(&cfg))?;
        eprintln!("Valid {} service definition: {}", format.protocol(), ir.service);
        eprintln!("  Operations: {}", ir.operations.len());
        report_operation_errors(&ir);
        if ir.has_errors() {
            anyhow::bail!("{} operations failed to normalize", ir.errors.len());
        }
        eprintln!("Validation successful.");
        return Ok(());
    }

    let parsed = read_contract(&spec)?;
    let contract = &parsed.spec;
    eprintln!(
        "Valid {} {} contract: {}",
        contract.protocol(),
        contract.spec_version(),
        contract.info.title
    );
    eprintln!("  Version: {}", contract.info.version);
    eprintln!("  Paths: {}", contract.paths.len());
    eprintln!("  Schemas: {}", contract.schema_count());

    let cfg = try_load_config()?.unwrap_or_default();
    let ir = transform::normalize_with_options(&parsed, &normalize_options(&cfg))?;
    eprintln!("  Operations: {}", ir.operations.len());
    report_operation_errors(&ir);

    if ir.has_errors() {
        anyhow::bail!("{} operations failed to normalize", ir.errors.len());
    }
    eprintln!("Validation successful.");
    Ok(())
}

fn cmd_search(index: Option<PathBuf>, terms: Vec<String>) -> Result<()> {
    let index_path = match index {
        Some(path) => path,
        None => {
            let cfg = try_load_config()?.unwrap_or_default();
            PathBuf::from(cfg.intake.index_path)
        }
    };
    let loaded = IndexStore::new(&index_path)
        .load()
        .with_context(|| format!("failed to load index {}", index_path.display()))?;

    let hits = loaded.search(terms.as_slice());
    for entry in &hits {
        let description = entry.description.as_deref().unwrap_or_default();
        println!(
            "{}\t{}\t{}\t{} {}\t{}",
            entry.service, entry.version, entry.operation, entry.method, entry.path, description
        );
    }
    eprintln!("{} of {} operations match", hits.len(), loaded.len());
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        );
    }

    fs::write(&config_path, config::default_config_content())?;
    eprintln!("Created {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val::<u16>("rest=9100").unwrap(),
            ("rest".to_string(), 9100)
        );
        assert_eq!(
            parse_key_val::<String>("owner = billing").unwrap(),
            ("owner".to_string(), "billing".to_string())
        );
        assert!(parse_key_val::<u16>("rest").is_err());
        assert!(parse_key_val::<u16>("rest=high").is_err());
        assert!(parse_key_val::<u16>("=1").is_err());
    }

    #[test]
    fn test_cli_definition() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_intake_args() {
        let cli = Cli::try_parse_from([
            "ctk", "intake", "--spec", "a.yaml", "--spec", "b.json", "--index", "idx.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Intake { specs, index, .. } => {
                assert_eq!(specs.len(), 2);
                assert_eq!(index, Some(PathBuf::from("idx.json")));
            }
            _ => panic!("expected intake"),
        }
    }

    #[test]
    fn test_intake_continues_past_failed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let payments = dir.path().join("payments.yaml");
        let org = dir.path().join("org.yaml");
        fs::write(&payments, include_str!("../../ctk-core/tests/fixtures/payments.yaml")).unwrap();
        fs::write(&org, include_str!("../../ctk-core/tests/fixtures/recursive.yaml")).unwrap();

        // A directory where the payments snapshot belongs cannot be replaced.
        let out = dir.path().join("contracts");
        fs::create_dir_all(out.join("payments-api").join("1.4.0.json").join("blocked")).unwrap();

        let specs = vec![payments.clone(), org];
        let (entries, failed) = intake_specs(&specs, &NormalizeOptions::default(), &out);
        assert_eq!(failed, vec![payments.display().to_string()]);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.service == "Org Chart"));
        assert!(out.join("org-chart").join("2.json").is_file());
    }

    #[test]
    fn test_intake_service_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let wsdl = dir.path().join("orders.wsdl");
        let proto = dir.path().join("greeter.proto");
        fs::write(&wsdl, include_str!("../../ctk-core/tests/fixtures/orders.wsdl")).unwrap();
        fs::write(&proto, include_str!("../../ctk-core/tests/fixtures/greeter.proto")).unwrap();

        let out = dir.path().join("contracts");
        let (entries, failed) =
            intake_specs(&[wsdl, proto.clone()], &NormalizeOptions::default(), &out);
        assert!(failed.is_empty());
        assert_eq!(entries.len(), 5);

        let snapshot = snapshot::load(&out.join("greeter").join("1.0.json")).unwrap();
        assert_eq!(snapshot.protocol, "proto");
        assert_eq!(snapshot.source, Some(proto.display().to_string()));
    }
}
