// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use envconfig::Envconfig;
use log::info;
use olm_crds::{Approval, InstallModeType};
use olm_harness::resources::{OperatorGroup, PackageManifestSnapshot, Subscription, TargetScope};
use olm_harness::scenario::{self, DEFAULT_WATCH_NAMESPACE, OperatorProfile};
use olm_harness::{CliConfig, TestContext};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Cluster CLI binary (overrides OLM_E2E_CLI)
    #[arg(long, global = true)]
    cli: Option<String>,

    /// Test namespace (overrides OLM_E2E_NAMESPACE; generated when unset)
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Namespace of the package manifests (overrides OLM_E2E_CATALOG_NAMESPACE)
    #[arg(long, global = true)]
    catalog_namespace: Option<String>,

    /// Namespace AllNamespaces operators go to (overrides OLM_E2E_GLOBAL_NAMESPACE)
    #[arg(long, global = true)]
    global_namespace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the Subscription and OperatorGroup manifests without a cluster
    Render {
        #[command(flatten)]
        package: PackageArgs,

        /// Catalog source the package comes from
        #[arg(long)]
        source: String,

        /// Channel to subscribe to
        #[arg(long)]
        channel: String,

        /// Output directory to save rendered YAML
        #[arg(long, default_value = "manifests")]
        output_dir: PathBuf,
    },
    /// Print what the catalog offers for a package
    Inspect {
        /// Package name
        package: String,

        /// Channel to describe instead of the default one
        #[arg(long)]
        channel: Option<String>,
    },
    /// Install a package, verify its CSV and tear everything down
    Install {
        #[command(flatten)]
        package: PackageArgs,

        /// Catalog source overriding the one in the package manifest
        #[arg(long)]
        source: Option<String>,

        /// Channel overriding the package's default channel
        #[arg(long)]
        channel: Option<String>,

        /// Leave the installed objects on the cluster
        #[arg(long)]
        keep: bool,

        /// Use an existing test namespace instead of creating a project
        #[arg(long)]
        existing_namespace: bool,
    },
}

#[derive(Args, Debug)]
struct PackageArgs {
    /// Package name
    package: String,

    #[arg(long, default_value = "Automatic")]
    approval: Approval,

    #[arg(long)]
    starting_csv: Option<String>,

    /// Namespace of the catalog source
    #[arg(long)]
    source_namespace: Option<String>,

    /// Install mode; picked from the package manifest when unset
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Namespace watched in single-namespace mode
    #[arg(long)]
    watch_namespace: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Own,
    Single,
    All,
}

impl From<Mode> for InstallModeType {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Own => InstallModeType::OwnNamespace,
            Mode::Single => InstallModeType::SingleNamespace,
            Mode::All => InstallModeType::AllNamespaces,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallReport {
    package: String,
    channel: String,
    install_mode: InstallModeType,
    namespace: String,
    installed_csv: String,
    kept: bool,
}

fn load_config(cli: &Cli) -> Result<CliConfig> {
    let mut config = CliConfig::init_from_env().context("reading OLM_E2E_* environment")?;
    if let Some(binary) = &cli.cli {
        config.binary = binary.clone();
    }
    if let Some(namespace) = &cli.namespace {
        config.namespace = Some(namespace.clone());
    }
    if let Some(namespace) = &cli.catalog_namespace {
        config.catalog_namespace = namespace.clone();
    }
    if let Some(namespace) = &cli.global_namespace {
        config.global_namespace = namespace.clone();
    }
    Ok(config)
}

fn render(
    config: &CliConfig,
    package: &PackageArgs,
    source: &str,
    channel: &str,
    output_dir: &Path,
) -> Result<()> {
    let mode = package.mode.map(InstallModeType::from).unwrap_or(InstallModeType::OwnNamespace);
    let namespace = match mode {
        InstallModeType::AllNamespaces => config.global_namespace.clone(),
        _ => config
            .namespace
            .clone()
            .unwrap_or_else(olm_harness::context::test_namespace_name),
    };
    fs::create_dir_all(output_dir)?;

    let mut subscription = Subscription::new(
        &package.package,
        &namespace,
        &package.package,
        channel,
        source,
        package
            .source_namespace
            .as_deref()
            .unwrap_or(&config.catalog_namespace),
    )
    .with_approval(package.approval);
    if let Some(csv) = &package.starting_csv {
        subscription = subscription.with_starting_csv(csv);
    }
    let path = output_dir.join("subscription.yaml");
    fs::write(&path, subscription.manifest()?)?;
    info!("Wrote {}", path.display());

    let scope = match mode {
        InstallModeType::OwnNamespace => Some(TargetScope::Own),
        InstallModeType::SingleNamespace => Some(TargetScope::Single(
            package
                .watch_namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_WATCH_NAMESPACE.to_string()),
        )),
        _ => None,
    };
    if let Some(scope) = scope {
        let og = OperatorGroup::new(format!("{}-og", package.package), &namespace, scope);
        let path = output_dir.join("operatorgroup.yaml");
        fs::write(&path, og.manifest()?)?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

async fn inspect(config: &CliConfig, package: &str, channel: Option<&str>) -> Result<()> {
    let ctx = TestContext::from_config("inspect", config);
    let snapshot = PackageManifestSnapshot::fetch(&ctx, package, channel).await?;
    print!("{}", serde_yaml::to_string(&snapshot)?);
    Ok(())
}

async fn install(
    config: &CliConfig,
    package: &PackageArgs,
    source: Option<String>,
    channel: Option<String>,
    keep: bool,
    existing_namespace: bool,
) -> Result<()> {
    let mut ctx = TestContext::from_config(&format!("install-{}", package.package), config);
    let mut profile = OperatorProfile::new(&package.package);
    profile.channel = channel;
    profile.approval = package.approval;
    profile.source = source;
    profile.source_namespace = package.source_namespace.clone();
    profile.starting_csv = package.starting_csv.clone();
    profile.install_mode = package.mode.map(InstallModeType::from);
    profile.watch_namespace = package.watch_namespace.clone();
    profile.create_namespace = !existing_namespace;

    let installation = if keep {
        scenario::install_and_verify(&mut ctx, &profile).await?
    } else {
        scenario::run(&mut ctx, &profile).await?
    };

    let report = InstallReport {
        package: package.package.clone(),
        channel: installation.snapshot.channel.clone(),
        install_mode: installation.install_mode,
        namespace: installation.namespace().to_string(),
        installed_csv: installation.installed_csv()?.to_string(),
        kept: keep,
    };
    print!("{}", serde_yaml::to_string(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    match &cli.command {
        Command::Render {
            package,
            source,
            channel,
            output_dir,
        } => render(&config, package, source, channel, output_dir),
        Command::Inspect { package, channel } => {
            inspect(&config, package, channel.as_deref()).await
        }
        Command::Install {
            package,
            source,
            channel,
            keep,
            existing_namespace,
        } => {
            install(
                &config,
                package,
                source.clone(),
                channel.clone(),
                *keep,
                *existing_namespace,
            )
            .await
        }
    }
}
