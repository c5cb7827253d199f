use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser};

use ghcr_prune::{parse_bool, Config, FileConfig, OwnerType, Pruner};

/// Delete untagged container image versions that no tagged multi-platform image depends on.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// GitHub token with delete:packages permissions.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,

    /// The repository owner name.
    #[arg(long)]
    owner: String,

    /// Delete containers only from this repository (`repo` or `owner/repo`).
    #[arg(long, default_value = "")]
    repo_name: String,

    /// Delete only from this package.
    #[arg(long, default_value = "")]
    package_name: String,

    #[arg(long, value_enum, default_value_t = OwnerType::Org)]
    owner_type: OwnerType,

    /// Keep untagged versions that are themselves multi-platform manifest lists.
    #[arg(long, action = ArgAction::Set, value_parser = parse_bool, default_value = "false")]
    except_untagged_multiplatform: bool,

    /// Report what would be deleted without deleting anything.
    #[arg(long, action = ArgAction::Set, value_parser = parse_bool, default_value = "false")]
    dry_run: bool,

    #[arg(long, env = "GITHUB_API_URL")]
    api_url: Option<String>,

    /// YAML file with client tunables (api_url, registry_url, per_page, request_timeout_secs,
    /// delete_concurrency).
    #[arg(short, long)]
    config_file: Option<PathBuf>,
}

impl Cli {
    fn config(self) -> Result<Config> {
        let mut config = Config::new(self.token, self.owner);
        if let Some(path) = &self.config_file {
            config.apply_file(FileConfig::load(path)?);
        }
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }
        config.owner_type = self.owner_type;
        config.repo_name = self.repo_name;
        config.package_name = self.package_name;
        config.except_untagged_multiplatform = self.except_untagged_multiplatform;
        config.dry_run = self.dry_run;
        Ok(config.normalize()?)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    let pruner = Pruner::from_config(cli.config()?)?;
    let report = pruner.run().await?;

    for line in report.summary() {
        println!("{line}");
    }
    Ok(report.exit_code())
}
