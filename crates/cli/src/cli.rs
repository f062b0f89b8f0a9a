use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use webacl_rules::{DefaultAction, Scope};

/// Web ACL rule tooling.
///
/// Renders the web ACL description handed to provisioning, validates rule
/// files, previews requests offline and runs one-shot associations.
#[derive(Parser, Debug)]
#[command(name = "webacl", version, about = "Web ACL rule tooling and one-shot remediation")]
pub struct CliArgs {
    /// Config profile (overrides WEBACL_PROFILE)
    #[arg(long, global = true, env = "WEBACL_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the web ACL description as JSON
    Render {
        #[command(flatten)]
        rules: RuleArgs,

        /// Web ACL name (default: {service}-{environment})
        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_enum, default_value_t = ScopeArg::Regional)]
        scope: ScopeArg,

        /// Single-line output
        #[arg(long)]
        compact: bool,
    },

    /// Validate rule files and the assembled rule set
    Check {
        /// Rule file or directory (default: RULES_PATH)
        path: Option<PathBuf>,
    },

    /// Show what the web ACL would do to a sample request
    Preview {
        #[command(flatten)]
        rules: RuleArgs,

        /// Request path, e.g. /login
        #[arg(long)]
        path: String,

        #[arg(long, default_value = "GET")]
        method: String,

        /// Raw query string without the leading '?'
        #[arg(long)]
        query: Option<String>,

        /// Request header as "Name: value" (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,

        #[arg(long)]
        body: Option<String>,

        /// Requests already observed from this source in the rate window
        #[arg(long, default_value_t = 0)]
        count: u64,
    },

    /// Associate the web ACL with one resource and report the outcome
    Associate {
        /// Resource ARN
        resource: String,
    },
}

#[derive(clap::Args, Debug)]
pub struct RuleArgs {
    /// Rule file or directory (default: RULES_PATH)
    #[arg(long)]
    pub rules: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = DefaultActionArg::Allow)]
    pub default_action: DefaultActionArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DefaultActionArg {
    Allow,
    Block,
}

impl From<DefaultActionArg> for DefaultAction {
    fn from(arg: DefaultActionArg) -> Self {
        match arg {
            DefaultActionArg::Allow => DefaultAction::Allow,
            DefaultActionArg::Block => DefaultAction::Block,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    Regional,
    Cloudfront,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Regional => Scope::Regional,
            ScopeArg::Cloudfront => Scope::Cloudfront,
        }
    }
}
