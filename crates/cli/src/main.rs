mod cli;
mod commands;

use anyhow::{bail, Result};
use clap::Parser;

use webacl_core::config::{load_dotenv, Config};

use crate::cli::{CliArgs, Command};
use crate::commands::PreviewInput;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let args = CliArgs::parse();
    let config = match args.profile {
        Some(ref profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };

    match args.command {
        Command::Render {
            rules,
            name,
            scope,
            compact,
        } => {
            let path = rules.rules.unwrap_or_else(|| config.rules.path.clone());
            let set = commands::load_rule_set(&path, rules.default_action.into())?;
            let name = name.unwrap_or_else(|| config.service.web_acl_name());
            println!("{}", commands::render(&set, &name, scope.into(), compact)?);
        }
        Command::Check { path } => {
            let path = path.unwrap_or_else(|| config.rules.path.clone());
            for line in commands::check(&path)? {
                println!("{line}");
            }
        }
        Command::Preview {
            rules,
            path,
            method,
            query,
            headers,
            body,
            count,
        } => {
            let rules_path = rules.rules.unwrap_or_else(|| config.rules.path.clone());
            let set = commands::load_rule_set(&rules_path, rules.default_action.into())?;
            let verdict = commands::preview(
                &set,
                PreviewInput {
                    method: &method,
                    path: &path,
                    query: query.as_deref(),
                    headers: &headers,
                    body: body.as_deref(),
                    count,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Command::Associate { resource } => {
            let result = commands::associate(&config, &resource).await?;
            println!("{resource}: {result}");
            if !result.is_bound() {
                bail!("association failed: {result}");
            }
        }
    }

    Ok(())
}
