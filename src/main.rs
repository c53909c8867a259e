use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use matrix_rooms::actions::{run_menu, ActionContext};
use matrix_rooms::ask::InquireAsk;
use matrix_rooms::classifier::Bucket;
use matrix_rooms::client::ChatClient;
use matrix_rooms::config::{Config, ConnectionArgs};
use matrix_rooms::report::OperationReport;
use matrix_rooms::room::RoomRef;
use matrix_rooms::service::{OutgoingMessage, RoomService};
use matrix_rooms::{logging, sdk};

#[derive(Parser)]
#[command(name = "mrooms", version)]
#[command(about = "Bulk room housekeeping for Matrix accounts", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Without a subcommand an interactive menu is shown
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to every room whose name contains ROOM
    Send {
        /// Part of the room name
        #[arg(short, long)]
        room: String,

        /// Message text
        #[arg(short, long)]
        message: String,

        /// HTML version of the message
        #[arg(long)]
        html: Option<String>,
    },
    /// Print how many rooms fall in each group
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.connection)?;

    let log_path = logging::init_logging(&config.data_dir, &config.own_user_id())
        .context("Failed to initialize logging")?;
    eprintln!("Logging to {}", log_path.display());

    tokio::runtime::Runtime::new()
        .context("Failed to create Tokio runtime")?
        .block_on(run(cli.command, config))
}

async fn run(command: Option<Commands>, config: Config) -> Result<()> {
    let client = sdk::connect(&config).await?;
    let service = RoomService::from_config(client, &config).with_progress(true);

    match command {
        None => {
            let ask = InquireAsk;
            let ctx = ActionContext {
                service: &service,
                ask: &ask,
                export_dir: config.data_dir.join("exports"),
            };
            run_menu(&ctx).await
        }
        Some(Commands::Send {
            room,
            message,
            html,
        }) => {
            let message = match html {
                Some(html) => OutgoingMessage::html(&message, &html),
                None => OutgoingMessage::text(&message),
            };
            let result = send(&service, &room, &message).await;
            service.stop().await;
            result
        }
        Some(Commands::Info) => {
            let buckets = service.buckets().await;
            for bucket in Bucket::ALL {
                println!("{:<28} {}", bucket.label(), buckets.get(bucket).len());
            }
            service.stop().await;
            Ok(())
        }
    }
}

async fn send<C: ChatClient>(
    service: &RoomService<C>,
    fragment: &str,
    message: &OutgoingMessage,
) -> Result<()> {
    let rooms: Vec<RoomRef> = service
        .rooms_by_name(fragment)
        .await
        .iter()
        .map(RoomRef::from)
        .collect();
    if rooms.is_empty() {
        anyhow::bail!("No rooms matching \"{}\"", fragment);
    }

    let report = service.send_message_to_rooms(rooms, message).await;
    eprintln!(
        "Sent to {} rooms, failed: {}",
        report.done().len(),
        report.failed().len()
    );
    for error in report.errors() {
        eprintln!("  {}", error);
    }
    if !report.failed().is_empty() {
        anyhow::bail!("Message not delivered to {} rooms", report.failed().len());
    }
    Ok(())
}
