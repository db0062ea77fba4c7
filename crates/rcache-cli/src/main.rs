#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgGroup, Parser, Subcommand};
use rcache_config::{Mode, RcConfig};
use rcache_engine::{
    ArtifactProcessor, AssetsSourcesCheck, BuildContext, CacheDecisionEngine, CacheVerdict,
    CompilationFingerprinter, DependenciesCheck, DependenciesReader,
    EnvironmentFingerprintGenerator, FileDependenciesReader, HeaderArtifactProcessor, MetaDetails,
    RawFingerprint, Sha256Accumulator, DEFAULT_REMAPPING_DIRS,
};
use rcache_util::LocalFs;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "RCACHE_LOG";

#[derive(Debug, Parser)]
#[command(name = "rcache", about = "Remote build cache decisions for Xcode build phases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decide whether the compiled artifact can replace compilation
    Check {
        /// Directory of the downloaded artifact
        #[arg(long)]
        artifact: PathBuf,
    },
    /// Decide whether the asset catalog output can be reused
    Assets {
        /// Directory of the downloaded artifact
        #[arg(long)]
        artifact: PathBuf,
    },
    /// Rewrite artifact content between generic and local paths
    #[command(group(ArgGroup::new("form").args(["raw", "local"])))]
    Adapt {
        /// Artifact directory
        dir: PathBuf,
        /// The artifact was downloaded and holds generic paths
        #[arg(long)]
        raw: bool,
        /// The artifact was built here and holds local paths
        #[arg(long)]
        local: bool,
    },
    /// Classify the dependencies listed in `.d` files
    Classify {
        /// Dependency files
        #[arg(required = true)]
        depfiles: Vec<PathBuf>,
    },
    /// Print the environment fingerprint of the current build step
    EnvFingerprint,
    /// Fingerprint a finished compilation and write its meta record
    Fingerprint {
        /// Output file map of the compilation
        #[arg(long)]
        filemap: PathBuf,
        /// Where to write the meta record
        #[arg(long)]
        output: PathBuf,
        /// VFS overlay used by the compilation
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Check { artifact } => cmd_check(&artifact),
        Command::Assets { artifact } => cmd_assets(&artifact),
        Command::Adapt { dir, raw, local } => cmd_adapt(&dir, raw, local),
        Command::Classify { depfiles } => cmd_classify(&depfiles),
        Command::EnvFingerprint => cmd_env_fingerprint(),
        Command::Fingerprint {
            filemap,
            output,
            overlay,
        } => cmd_fingerprint(&filemap, &output, overlay.as_deref()),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Configuration from `.rcinfo` in `SRCROOT`, or the current directory.
fn load_config(env: &HashMap<String, String>) -> Result<RcConfig, Box<dyn Error>> {
    let root = match env.get("SRCROOT") {
        Some(root) => PathBuf::from(root),
        None => std::env::current_dir()?,
    };
    tracing::debug!(root = %root.display(), "loading configuration");
    Ok(RcConfig::load(&root)?)
}

struct Step {
    config: RcConfig,
    context: BuildContext,
}

fn current_step() -> Result<Step, Box<dyn Error>> {
    let env: HashMap<String, String> = std::env::vars().collect();
    let config = load_config(&env)?;
    let context = BuildContext::from_env(env, &config)?;
    Ok(Step { config, context })
}

fn env_fingerprint(env: &HashMap<String, String>, config: &RcConfig) -> RawFingerprint {
    EnvironmentFingerprintGenerator::new(
        env.clone(),
        config.custom_fingerprint_envs.clone(),
        Sha256Accumulator::new(LocalFs),
    )
    .generate()
}

fn report(step_name: &str, verdict: &CacheVerdict) {
    match verdict {
        CacheVerdict::Hit(dependencies) => {
            eprintln!("         Hit {step_name} ({} dependencies)", dependencies.len());
        }
        CacheVerdict::Miss => eprintln!("        Miss {step_name}"),
    }
}

fn cmd_check(artifact: &Path) -> CliResult {
    let step = current_step()?;
    let check = DependenciesCheck::new(
        LocalFs,
        step.context.classifier(&step.config)?,
        step.context.remapper.clone(),
        env_fingerprint(&step.context.env, &step.config),
    );
    let mut engine =
        CacheDecisionEngine::new(check, true, artifact, &step.context.marker_path, LocalFs);
    let verdict = engine
        .run()
        .map_err(|e| format!("cannot record cache decision: {e}"))?;
    report("compilation", &verdict);
    Ok(())
}

fn cmd_assets(artifact: &Path) -> CliResult {
    let step = current_step()?;
    let check = AssetsSourcesCheck::new(LocalFs, step.context.remapper.clone());
    let mut engine = CacheDecisionEngine::new(
        check,
        step.config.assets_caching,
        artifact,
        &step.context.marker_path,
        LocalFs,
    );
    let verdict = engine
        .run()
        .map_err(|e| format!("cannot record cache decision: {e}"))?;
    report("asset catalog", &verdict);
    Ok(())
}

/// Which form an artifact is in: explicit flags win over the configured mode.
fn artifact_is_raw(raw: bool, local: bool, mode: Mode) -> bool {
    if raw || local {
        return raw;
    }
    mode == Mode::Consumer
}

fn cmd_adapt(dir: &Path, raw: bool, local: bool) -> CliResult {
    let step = current_step()?;
    let processor = HeaderArtifactProcessor::new(
        step.context.remapper.clone(),
        DEFAULT_REMAPPING_DIRS.iter().map(|d| (*d).to_owned()).collect(),
        step.config.override_extension.clone(),
        LocalFs,
    );
    if artifact_is_raw(raw, local, step.config.mode) {
        processor.process_raw(dir)?;
        eprintln!("     Adapted {} for this machine", dir.display());
    } else {
        processor.process_local(dir)?;
        eprintln!("     Adapted {} for publishing", dir.display());
    }
    Ok(())
}

fn cmd_classify(depfiles: &[PathBuf]) -> CliResult {
    let step = current_step()?;
    let classifier = step.context.classifier(&step.config)?;

    let mut paths = Vec::new();
    for depfile in depfiles {
        let dependencies = FileDependenciesReader::new(depfile, LocalFs).find_dependencies()?;
        paths.extend(dependencies.into_iter().map(PathBuf::from));
    }
    let result = classifier.classify(&paths);

    for (bucket, dependencies) in [
        ("fingerprint", &result.fingerprint_scoped),
        ("assets", &result.asset_source),
        ("extra", &result.extra),
    ] {
        for dependency in dependencies {
            println!("{bucket}\t{:?}\t{}", dependency.kind, dependency.path.display());
        }
    }
    Ok(())
}

fn cmd_env_fingerprint() -> CliResult {
    let env: HashMap<String, String> = std::env::vars().collect();
    let config = load_config(&env)?;
    println!("{}", env_fingerprint(&env, &config));
    Ok(())
}

fn cmd_fingerprint(filemap: &Path, output: &Path, overlay: Option<&Path>) -> CliResult {
    let step = current_step()?;
    let classifier = step.context.classifier(&step.config)?;
    let mut fingerprinter = CompilationFingerprinter::new(
        LocalFs,
        &classifier,
        &step.context.remapper,
        env_fingerprint(&step.context.env, &step.config),
    );
    if let Some(overlay) = overlay {
        fingerprinter = fingerprinter.with_overlay(overlay, step.config.overlay_merge);
    }

    let var = |name: &str| step.context.var(name).unwrap_or_default().to_owned();
    let details = MetaDetails {
        generation_commit: var("RCACHE_COMMIT"),
        target_name: var("TARGET_NAME"),
        configuration: var("CONFIGURATION"),
        platform: var("PLATFORM_NAME"),
        xcode: var("XCODE_PRODUCT_BUILD_VERSION"),
    };
    let meta = fingerprinter.fingerprint(filemap, details)?;
    meta.write(output, &LocalFs)?;

    eprintln!(
        " Fingerprint {} written to {}",
        meta.fingerprint,
        output.display()
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_check() {
        let cli = Cli::try_parse_from(["rcache", "check", "--artifact", "/tmp/a"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Check { artifact } if artifact == Path::new("/tmp/a")
        ));
    }

    #[test]
    fn check_requires_artifact() {
        let err = Cli::try_parse_from(["rcache", "check"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parse_assets() {
        let cli = Cli::try_parse_from(["rcache", "assets", "--artifact", "art"]).unwrap();
        assert!(matches!(cli.command, Command::Assets { .. }));
    }

    #[test]
    fn parse_adapt_raw() {
        let cli = Cli::try_parse_from(["rcache", "adapt", "--raw", "art"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Adapt { raw: true, local: false, .. }
        ));
    }

    #[test]
    fn adapt_without_form_is_allowed() {
        let cli = Cli::try_parse_from(["rcache", "adapt", "art"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Adapt { raw: false, local: false, .. }
        ));
    }

    #[test]
    fn adapt_rejects_both_forms() {
        let err = Cli::try_parse_from(["rcache", "adapt", "--raw", "--local", "art"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn classify_needs_a_depfile() {
        let err = Cli::try_parse_from(["rcache", "classify"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from(["rcache", "classify", "A.d", "B.d"]).unwrap();
        assert!(matches!(cli.command, Command::Classify { depfiles } if depfiles.len() == 2));
    }

    #[test]
    fn parse_env_fingerprint() {
        let cli = Cli::try_parse_from(["rcache", "env-fingerprint"]).unwrap();
        assert!(matches!(cli.command, Command::EnvFingerprint));
    }

    #[test]
    fn parse_fingerprint_with_overlay() {
        let cli = Cli::try_parse_from([
            "rcache",
            "fingerprint",
            "--filemap",
            "map.json",
            "--output",
            "meta.json",
            "--overlay",
            "overlay.json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Fingerprint { overlay: Some(_), .. }
        ));
    }

    #[test]
    fn unknown_subcommand_is_error() {
        let err = Cli::try_parse_from(["rcache", "upload"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn adapt_form_follows_flags_then_mode() {
        assert!(artifact_is_raw(true, false, Mode::Producer));
        assert!(!artifact_is_raw(false, true, Mode::Consumer));
        assert!(artifact_is_raw(false, false, Mode::Consumer));
        assert!(!artifact_is_raw(false, false, Mode::Producer));
    }

    #[test]
    fn config_defaults_without_rcinfo() {
        let tmp = tempfile::tempdir().unwrap();
        let env: HashMap<String, String> = [(
            "SRCROOT".to_owned(),
            tmp.path().to_string_lossy().into_owned(),
        )]
        .into_iter()
        .collect();
        assert_eq!(load_config(&env).unwrap(), RcConfig::default());
    }

    #[test]
    fn env_fingerprint_is_stable() {
        let env = HashMap::from([("TARGET_NAME".to_owned(), "App".to_owned())]);
        let config = RcConfig::default();
        assert_eq!(env_fingerprint(&env, &config), env_fingerprint(&env, &config));
    }
}
