use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use openapi_mcp_runtime::{McpCommands, RuntimeConfig, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "openapi-mcp",
    version,
    about = "Expose the operations of an OpenAPI 3.x document as MCP tools over stdio"
)]
struct Cli {
    /// OpenAPI document to serve (defaults to openapi.yaml next to the binary or in the working directory)
    #[arg(long = "spec", env = "OPENAPI_FILE")]
    spec: Option<PathBuf>,

    /// Value sent as X-Api-Key on every outbound request
    #[arg(long, env = "HTTP_HEADERS_X_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Verbose logging to stderr
    #[arg(long, env = "DEBUG", action = ArgAction::SetTrue, value_parser = debug_enabled)]
    debug: bool,

    #[command(subcommand)]
    command: Option<McpCommands>,
}

impl Cli {
    fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            spec_path: self.spec.clone(),
            api_key: self.api_key.clone().filter(|key| !key.trim().is_empty()),
            debug: self.debug,
        }
    }
}

/// Any `DEBUG` value turns verbose logging on, except the usual "off" spellings.
fn debug_enabled(value: &str) -> Result<bool, String> {
    let value = value.trim().to_ascii_lowercase();
    Ok(!matches!(value.as_str(), "" | "0" | "false" | "no" | "off"))
}

// stdout carries the protocol; logs go to stderr only.
fn init_tracing(config: &RuntimeConfig) {
    let default_filter = if config.debug {
        "openapi_mcp=debug,openapi_mcp_runtime=debug,openapi_mcp_core=debug"
    } else {
        "openapi_mcp=info,openapi_mcp_runtime=info,openapi_mcp_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = cli.runtime_config();
    init_tracing(&config);

    let command = cli.command.unwrap_or(McpCommands::Serve);
    let code = run_mcp(&config, command).await;
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["openapi-mcp", "--spec", "api.yaml"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.runtime_config().spec_path, Some(PathBuf::from("api.yaml")));
    }

    #[test]
    fn inspect_and_flags_parse() {
        let cli = Cli::try_parse_from(["openapi-mcp", "--debug", "--api-key", "  ", "inspect"])
            .unwrap();
        assert!(matches!(cli.command, Some(McpCommands::Inspect)));
        let config = cli.runtime_config();
        assert!(config.debug);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn debug_accepts_any_value() {
        for (value, expected) in [
            ("*", true),
            ("app:*", true),
            ("1", true),
            ("off", false),
            ("0", false),
            ("", false),
        ] {
            assert_eq!(debug_enabled(value), Ok(expected), "DEBUG={value:?}");
        }

        // SAFETY: no other test here asserts on DEBUG being unset.
        unsafe { std::env::set_var("DEBUG", "*") };
        let parsed = Cli::try_parse_from(["openapi-mcp"]);
        unsafe { std::env::remove_var("DEBUG") };
        assert!(parsed.unwrap().runtime_config().debug);
    }
}
