use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate};
use clap::{Parser, Subcommand};
use inquire::Text;

use crate::clients::google_auth::{self, TokenStore};
use crate::config::Settings;
use crate::models::event::EventRecord;
use crate::runtime;
use crate::service::slots::render_slot_list;

#[derive(Parser)]
#[command(name = "calendarBot", about = "Free slots and meeting booking on Google Calendar")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show free slots for a date
    #[command(name = "get_slots")]
    GetSlots {
        /// Date in YYYY-MM-DD format
        #[arg(long)]
        date: NaiveDate,
    },
    /// Create a meeting with a conference link
    #[command(name = "create_event")]
    CreateEvent {
        /// Start in ISO format, e.g. 2025-08-01T14:00:00+03:00
        #[arg(long)]
        start: DateTime<FixedOffset>,
        /// End in ISO format, e.g. 2025-08-01T14:30:00+03:00
        #[arg(long)]
        end: DateTime<FixedOffset>,
        /// Attendee email
        #[arg(long)]
        email: String,
    },
    /// Ask the assistant in free text
    Ask {
        text: Option<String>,
    },
    /// Authorize calendar access and cache the token
    Authorize,
}

pub async fn cli(settings: Settings) -> anyhow::Result<()> {
    // Fine to exit here on bad arguments
    let cli = Cli::parse();
    run(cli.command, settings).await
}

pub async fn run(command: Commands, settings: Settings) -> anyhow::Result<()> {
    match command {
        Commands::GetSlots { date } => {
            let calendar = runtime::build_calendar(&settings);
            let slots = calendar
                .free_slots(date)
                .await
                .with_context(|| format!("Failed to list free slots for {}", date))?;
            println!("{}", render_slot_list(date, &slots, &settings.scheduling.offset));
        }
        Commands::CreateEvent { start, end, email } => {
            let calendar = runtime::build_calendar(&settings);
            let record = calendar
                .create_event(start, end, &email)
                .await
                .context("Failed to create event")?;
            println!("{}", render_event(&record));
        }
        Commands::Ask { text } => {
            let text = match text {
                Some(text) => text,
                None => Text::new("What should I schedule?")
                    .prompt()
                    .context("No request supplied")?,
            };
            let calendar = runtime::build_calendar(&settings);
            let agent = runtime::build_agent(&settings, calendar)?;
            let mut conversation = runtime::conversation_store(&settings).fresh();
            let reply = agent.run(&mut conversation, &text).await?;
            println!("{}", reply);
        }
        Commands::Authorize => authorize(&settings).await?,
    }
    Ok(())
}

pub fn render_event(record: &EventRecord) -> String {
    match (&record.conference_link, &record.html_link) {
        (Some(link), _) => format!("Meeting link: {}", link),
        (None, Some(link)) => format!("Event created: {}", link),
        (None, None) => format!("Event created: {}", record.id),
    }
}

async fn authorize(settings: &Settings) -> anyhow::Result<()> {
    let store = TokenStore::new(
        settings.google.token_file.clone(),
        settings.google.credentials_file.clone(),
    );
    let secrets = store.client_secrets()?;

    println!("Open this URL in a browser and grant calendar access:\n\n{}\n", secrets.authorization_url());
    let pasted = Text::new("Paste the URL you were redirected to (or just the code):")
        .prompt()
        .context("No authorization code supplied")?;
    let code = google_auth::extract_code(&pasted)
        .context("The pasted text does not contain an authorization code")?;

    store.exchange_code(&secrets, &code).await?;
    println!("Token saved to {}", store.token_path().display());
    Ok(())
}
