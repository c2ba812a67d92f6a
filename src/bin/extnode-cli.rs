//! CLI для отладки шины
//!
//! Подписка на топики с выводом сообщений, разовая публикация из файла или
//! аргумента и отправка управляющих команд узлам.

use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use extnode::{
    init_logging, logging::LogFormat, ErrorExt, LoggingConfig, Message, Node, NodeConfig,
    OperateAction, PublishError,
};
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Сколько ждать отправки очереди перед выходом.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Пауза между повторами публикации при временной ошибке.
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Аргументы командной строки
#[derive(Parser)]
#[command(name = "extnode-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Debug tools for the extension message bus", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Хост брокера
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "EXTNODE_HOST")]
    host: String,
    /// Порт брокера для подписчиков
    #[arg(long, default_value_t = 16103, env = "EXTNODE_SUBSCRIBER_PORT")]
    sub_port: u16,
    /// Порт брокера для публикующих
    #[arg(long, default_value_t = 16130, env = "EXTNODE_PUBLISHER_PORT")]
    pub_port: u16,
    /// Имя узла, под которым подключается CLI
    #[arg(short, long, default_value = "extnode-cli")]
    name: String,
    /// Подробный вывод (debug)
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Только ошибки
    #[arg(short, long)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Печатать все сообщения, чей топик начинается с TOPIC
    #[command(alias = "m")]
    Monitor {
        /// Префикс топика; по умолчанию все топики
        topic: Option<String>,
        /// Печатать каждое сообщение одной JSON-строкой
        #[arg(long)]
        json: bool,
    },
    /// Опубликовать `{topic, payload}` из JSON-файла
    Trigger {
        file: PathBuf,
    },
    /// Опубликовать `{topic, payload}` из аргумента
    Pub {
        json: String,
    },
    /// Отправить узлу команду start / stop
    Operate {
        node: String,
        #[arg(value_enum)]
        action: ActionArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ActionArg {
    Start,
    Stop,
}

impl From<ActionArg> for OperateAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Start => OperateAction::Start,
            ActionArg::Stop => OperateAction::Stop,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let logging = init_logging(LoggingConfig {
        level: level.to_string(),
        format: LogFormat::Compact,
        ..Default::default()
    })
    .context("Failed to initialize logging")?;

    let config = NodeConfig::new(cli.name.clone()).with_broker(&cli.host, cli.sub_port, cli.pub_port);
    debug!(?config, "CLI configuration");

    let result = match &cli.command {
        Commands::Monitor { topic, json } => monitor(config, topic.as_deref().unwrap_or(""), *json).await,
        Commands::Trigger { file } => {
            let text = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let message = parse_message(&text)?;
            publish_once(config, |node| node.publish_message(&message)).await
        }
        Commands::Pub { json } => {
            let message = parse_message(json)?;
            publish_once(config, |node| node.publish_message(&message)).await
        }
        Commands::Operate { node, action } => {
            let action = OperateAction::from(*action);
            publish_once(config, |n| n.send_operate(node, action)).await
        }
    };

    logging.shutdown();
    result
}

fn parse_message(text: &str) -> Result<Message> {
    let message = Message::from_json(text).context("Expected JSON of the form {\"topic\": ..., \"payload\": ...}")?;
    if !message.has_valid_topic() {
        bail!("topic must be a non-empty string");
    }
    Ok(message)
}

/// Подписывается на префикс и печатает сообщения до Ctrl-C.
async fn monitor(
    config: NodeConfig,
    topic: &str,
    json: bool,
) -> Result<()> {
    let node = extnode::connect(config).await?;
    node.subscribe(topic, move |msg| {
        if json {
            println!("{}", serde_json::to_string(msg)?);
        } else {
            println!("{}  {}", msg.topic, msg.payload);
        }
        Ok(())
    });
    node.start().await?;
    eprintln!("monitoring '{topic}' (Ctrl-C to stop)");

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl-C")?,
        _ = node.join() => {}
    }

    node.stop();
    node.join().await;
    Ok(())
}

/// Подключается, выполняет одну публикацию и ждёт её отправки.
///
/// Временные ошибки (переполненная очередь во время обрыва) повторяются
/// до истечения `FLUSH_TIMEOUT`.
async fn publish_once<F>(
    config: NodeConfig,
    publish: F,
) -> Result<()>
where
    F: Fn(&Node) -> Result<(), PublishError>,
{
    let node = extnode::connect(config).await?;
    let deadline = Instant::now() + FLUSH_TIMEOUT;
    loop {
        match publish(&node) {
            Ok(()) => break,
            Err(e) if e.status_code().is_retryable() && Instant::now() < deadline => {
                debug!(error = %e, "Publish deferred, retrying");
                sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    node.flush(FLUSH_TIMEOUT).await?;
    node.stop();
    node.join().await;
    Ok(())
}
