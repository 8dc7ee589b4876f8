//! 命令行
//!
//! - `serve`: 启动 Web 服务
//! - `llm ...`: 模型工具的命令（日志、模型列表、直接调用）

use crate::config::{default_config_path, load_config, resolve_db_path, save_config, Config};
use crate::database::dao::ConversationDao;
use crate::database::LogDatabase;
use crate::providers::{ModelRegistry, Prompt, PromptEvent};
use crate::server::{serve, AppState};
use crate::streaming::{stream_prompt, BridgeItem};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;

/// Chat with large language models from a browser.
#[derive(Parser, Debug)]
#[command(name = "datasette-llm", version, about)]
pub struct Cli {
    /// Path to the YAML config file.
    #[arg(long, global = true, env = "DATASETTE_LLM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web server.
    Serve(ServeArgs),
    /// Access the llm tool.
    Llm {
        #[command(subcommand)]
        action: LlmCommand,
    },
    /// Manage the config file.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

/// Config management subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Write the current configuration (defaults included) to the config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct ServeArgs {
    /// Host to bind to.
    #[arg(long)]
    pub host: Option<String>,
    /// Port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Path to the llm log database.
    #[arg(long)]
    pub db_path: Option<String>,
    /// Create the log database if it does not exist yet.
    #[arg(long)]
    pub create_db: bool,
}

/// llm subcommands.
#[derive(Subcommand, Debug)]
pub enum LlmCommand {
    /// Tools for exploring logged prompts and responses.
    Logs {
        #[command(subcommand)]
        action: LogsCommand,
    },
    /// List available models.
    Models,
    /// Execute a prompt.
    Prompt {
        /// The prompt text.
        prompt: String,
        /// Model to use.
        #[arg(short, long)]
        model: Option<String>,
        /// System prompt to use.
        #[arg(short, long)]
        system: Option<String>,
        /// Don't log the response to the database.
        #[arg(short, long)]
        no_log: bool,
    },
}

/// logs subcommands.
#[derive(Subcommand, Debug)]
pub enum LogsCommand {
    /// Output the path to the logs.db file.
    Path,
    /// Show recent logged prompts and responses.
    List {
        /// Number of entries to show.
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    /// 加载配置文件，未指定时使用默认位置
    pub fn load_config(&self) -> Result<Config> {
        let path = self.config_path();
        load_config(&path).with_context(|| format!("failed to load config from {:?}", path))
    }

    pub async fn run(self, config: Config) -> Result<()> {
        let config_path = self.config_path();
        match self.command {
            Command::Serve(args) => run_serve(config, args).await,
            Command::Llm { action } => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                run_llm(&config, action, &mut out).await
            }
            Command::Config { action } => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                run_config(&config, &config_path, action, &mut out)
            }
        }
    }
}

/// 执行 config 子命令
pub fn run_config<W: Write>(
    config: &Config,
    path: &std::path::Path,
    action: ConfigCommand,
    out: &mut W,
) -> Result<()> {
    match action {
        ConfigCommand::Path => writeln!(out, "{}", path.display())?,
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists, use --force to overwrite", path.display());
            }
            save_config(config, path)?;
            writeln!(out, "Wrote {}", path.display())?;
        }
    }
    Ok(())
}

async fn run_serve(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.db_path.is_some() {
        config.plugins.llm.db_path = args.db_path;
    }

    let db_path = resolve_db_path(config.plugins.llm.db_path.as_deref());
    let db = if args.create_db {
        Some(LogDatabase::open(&db_path)?)
    } else {
        LogDatabase::attach_if_exists(&db_path)?
    };

    let models = ModelRegistry::from_config(&config);
    let state = AppState::new(config, db, models)?;
    serve(state).await?;
    Ok(())
}

/// 执行 llm 子命令，输出写入 `out`
pub async fn run_llm<W: Write>(config: &Config, action: LlmCommand, out: &mut W) -> Result<()> {
    let db_path = resolve_db_path(config.plugins.llm.db_path.as_deref());
    match action {
        LlmCommand::Logs {
            action: LogsCommand::Path,
        } => {
            writeln!(out, "{}", db_path.display())?;
        }
        LlmCommand::Logs {
            action: LogsCommand::List { count },
        } => {
            let Some(db) = LogDatabase::attach_if_exists(&db_path)? else {
                return Ok(());
            };
            let mut responses =
                db.execute_blocking(|conn| Ok(ConversationDao::recent_responses(conn, count)?))?;
            responses.reverse();
            for response in responses {
                writeln!(
                    out,
                    "# {}    conversation: {}\n\nModel: **{}**\n\n## Prompt\n\n{}\n\n## Response\n\n{}\n",
                    response.datetime_utc.unwrap_or_default(),
                    response.conversation_id,
                    response.model_id,
                    response.prompt.unwrap_or_default(),
                    response.response.unwrap_or_default(),
                )?;
            }
        }
        LlmCommand::Models => {
            let models = ModelRegistry::from_config(config);
            for info in models.list() {
                if info.aliases.is_empty() {
                    writeln!(out, "{}: {}", info.name, info.model_id)?;
                } else {
                    writeln!(
                        out,
                        "{}: {} (aliases: {})",
                        info.name,
                        info.model_id,
                        info.aliases.join(", ")
                    )?;
                }
            }
        }
        LlmCommand::Prompt {
            prompt,
            model,
            system,
            no_log,
        } => {
            let models = ModelRegistry::from_config(config);
            let model_id = model.unwrap_or_else(|| config.plugins.llm.default_model.clone());
            let model = models.get(&model_id)?;

            let mut events = stream_prompt(model, Prompt::new(prompt).with_system(system))?;
            let mut completed = None;
            while let Some(item) = events.next().await {
                match item {
                    BridgeItem::Item(PromptEvent::Chunk(text)) => {
                        write!(out, "{}", text)?;
                        out.flush()?;
                    }
                    BridgeItem::Item(PromptEvent::Done(response)) => completed = Some(response),
                    BridgeItem::Error(message) => bail!("Error: {}", message),
                }
            }
            writeln!(out)?;

            if let (Some(response), false) = (completed, no_log) {
                let db = LogDatabase::open(&db_path)?;
                db.execute_write_fn(move |conn| Ok(response.log_to_db(conn)?))
                    .await?;
            }
        }
    }
    Ok(())
}
