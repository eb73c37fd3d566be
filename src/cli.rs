use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::{
    AvailabilityFilter, BookingRequest, CustomerInput, Engine, EngineError, RoomInput,
    RoomTypeInput, today,
};
use crate::model::{BookingId, Channel, CustomerId, Money, RoomId, RoomTypeId};

#[derive(Debug, Parser)]
#[command(name = "innkeep")]
#[command(about = "Hotel room reservations without double bookings", version)]
pub struct Cli {
    /// Directory holding the write-ahead log (overrides INNKEEP_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run background maintenance: elapsed-stay sweep, WAL compaction, metrics endpoint
    Run,
    #[command(flatten)]
    Op(Operation),
}

/// One-shot operations. Each prints its result as JSON.
#[derive(Debug, Subcommand)]
pub enum Operation {
    #[command(subcommand)]
    RoomType(RoomTypeCommand),
    #[command(subcommand)]
    Room(RoomCommand),
    #[command(subcommand)]
    Customer(CustomerCommand),
    #[command(subcommand)]
    Booking(BookingCommand),
    /// Rooms free for every night of [start, end)
    Available {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        room_type: Option<RoomTypeId>,
        #[arg(long)]
        min_capacity: Option<u8>,
    },
    /// Complete active bookings whose checkout day has passed
    CompleteElapsed {
        /// Sweep as of this day instead of today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Revenue and booking counts for bookings made between two days, inclusive
    Report {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Rewrite the write-ahead log as a minimal snapshot
    Compact,
}

#[derive(Debug, Args)]
pub struct RoomTypeArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, default_value = "")]
    pub note: String,
}

impl From<RoomTypeArgs> for RoomTypeInput {
    fn from(a: RoomTypeArgs) -> Self {
        RoomTypeInput {
            name: a.name,
            description: a.description,
            note: a.note,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum RoomTypeCommand {
    Create(RoomTypeArgs),
    Update {
        id: RoomTypeId,
        #[command(flatten)]
        args: RoomTypeArgs,
    },
    Delete { id: RoomTypeId },
    Get { id: RoomTypeId },
    List,
    Search { query: String },
}

#[derive(Debug, Args)]
pub struct RoomArgs {
    #[arg(long)]
    pub number: String,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long)]
    pub capacity: u8,
    /// Nightly rate, e.g. 120.50
    #[arg(long)]
    pub rate: Money,
    #[arg(long)]
    pub room_type: RoomTypeId,
}

impl From<RoomArgs> for RoomInput {
    fn from(a: RoomArgs) -> Self {
        RoomInput {
            number: a.number,
            description: a.description,
            max_capacity: a.capacity,
            nightly_rate: a.rate,
            room_type_id: a.room_type,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum RoomCommand {
    Create(RoomArgs),
    Update {
        id: RoomId,
        #[command(flatten)]
        args: RoomArgs,
    },
    Delete { id: RoomId },
    Get { id: RoomId },
    List,
    ByType { room_type: RoomTypeId },
    Search { query: String },
}

#[derive(Debug, Args)]
pub struct CustomerArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long, default_value = "")]
    pub phone: String,
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub birthday: NaiveDate,
}

impl From<CustomerArgs> for CustomerInput {
    fn from(a: CustomerArgs) -> Self {
        CustomerInput {
            full_name: a.name,
            phone: a.phone,
            email: a.email,
            birthday: a.birthday,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CustomerCommand {
    Create(CustomerArgs),
    Update {
        id: CustomerId,
        #[command(flatten)]
        args: CustomerArgs,
    },
    Delete { id: CustomerId },
    Get { id: CustomerId },
    ByEmail { email: String },
    List,
    Search { query: String },
}

#[derive(Debug, Args)]
pub struct BookingArgs {
    #[arg(long)]
    pub customer: CustomerId,
    #[arg(long)]
    pub room: RoomId,
    #[arg(long)]
    pub start: NaiveDate,
    #[arg(long)]
    pub end: NaiveDate,
    #[arg(long, default_value = "offline")]
    pub channel: Channel,
}

impl From<BookingArgs> for BookingRequest {
    fn from(a: BookingArgs) -> Self {
        BookingRequest {
            customer_id: a.customer,
            room_id: a.room,
            start: a.start,
            end: a.end,
            channel: a.channel,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum BookingCommand {
    Create(BookingArgs),
    Update {
        id: BookingId,
        #[command(flatten)]
        args: BookingArgs,
    },
    Cancel { id: BookingId },
    Complete { id: BookingId },
    Get { id: BookingId },
    List,
    ByCustomer { customer: CustomerId },
    ByRoom { room: RoomId },
    /// Bookings whose stay overlaps [from, to)
    ByDates {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    ByChannel { channel: Channel },
    /// Bookings made between two days, inclusive
    BookedBetween {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot render output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

impl CliError {
    /// Process exit code, one per failure kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Engine(e) => match e {
                EngineError::Validation { .. } => 2,
                EngineError::NotFound { .. } => 3,
                EngineError::Conflict { .. } => 4,
                EngineError::DuplicateKey { .. } => 5,
                EngineError::InvalidTransition { .. } => 6,
                EngineError::InUse { .. } => 7,
                EngineError::Timeout(_) => 8,
                EngineError::WalError(_) => 9,
            },
            CliError::Config(_) => 10,
            CliError::Io(_) | CliError::Json(_) | CliError::Metrics(_) => 1,
        }
    }
}

fn render(value: impl Serialize) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Run one operation against the engine and render its result.
pub async fn execute(engine: &Engine, op: Operation) -> Result<String, CliError> {
    match op {
        Operation::RoomType(cmd) => match cmd {
            RoomTypeCommand::Create(args) => render(engine.create_room_type(args.into()).await?),
            RoomTypeCommand::Update { id, args } => {
                render(engine.update_room_type(id, args.into()).await?)
            }
            RoomTypeCommand::Delete { id } => {
                engine.delete_room_type(id).await?;
                render(json!({ "deleted": id }))
            }
            RoomTypeCommand::Get { id } => render(engine.get_room_type(id)?),
            RoomTypeCommand::List => render(engine.list_room_types()),
            RoomTypeCommand::Search { query } => render(engine.search_room_types(&query)),
        },
        Operation::Room(cmd) => match cmd {
            RoomCommand::Create(args) => render(engine.create_room(args.into()).await?),
            RoomCommand::Update { id, args } => render(engine.update_room(id, args.into()).await?),
            RoomCommand::Delete { id } => {
                engine.delete_room(id).await?;
                render(json!({ "deleted": id }))
            }
            RoomCommand::Get { id } => render(engine.get_room(id).await?),
            RoomCommand::List => render(engine.list_rooms().await?),
            RoomCommand::ByType { room_type } => render(engine.rooms_by_type(room_type).await?),
            RoomCommand::Search { query } => render(engine.search_rooms(&query).await?),
        },
        Operation::Customer(cmd) => match cmd {
            CustomerCommand::Create(args) => render(engine.create_customer(args.into()).await?),
            CustomerCommand::Update { id, args } => {
                render(engine.update_customer(id, args.into()).await?)
            }
            CustomerCommand::Delete { id } => {
                engine.delete_customer(id).await?;
                render(json!({ "deleted": id }))
            }
            CustomerCommand::Get { id } => render(engine.get_customer(id)?),
            CustomerCommand::ByEmail { email } => render(engine.customer_by_email(&email)),
            CustomerCommand::List => render(engine.list_customers()),
            CustomerCommand::Search { query } => render(engine.search_customers(&query)),
        },
        Operation::Booking(cmd) => match cmd {
            BookingCommand::Create(args) => render(engine.create_booking(args.into()).await?),
            BookingCommand::Update { id, args } => {
                render(engine.update_booking(id, args.into()).await?)
            }
            BookingCommand::Cancel { id } => render(engine.cancel_booking(id).await?),
            BookingCommand::Complete { id } => render(engine.complete_booking(id).await?),
            BookingCommand::Get { id } => render(engine.get_booking(id).await?),
            BookingCommand::List => render(engine.list_bookings().await?),
            BookingCommand::ByCustomer { customer } => {
                render(engine.bookings_by_customer(customer).await?)
            }
            BookingCommand::ByRoom { room } => render(engine.bookings_by_room(room).await?),
            BookingCommand::ByDates { from, to } => {
                render(engine.bookings_by_date_range(from, to).await?)
            }
            BookingCommand::ByChannel { channel } => {
                render(engine.bookings_by_channel(channel).await?)
            }
            BookingCommand::BookedBetween { from, to } => {
                render(engine.bookings_booked_between(from, to).await?)
            }
        },
        Operation::Available {
            start,
            end,
            room_type,
            min_capacity,
        } => {
            let filter = AvailabilityFilter {
                room_type_id: room_type,
                min_capacity,
            };
            render(engine.available_rooms(start, end, filter).await?)
        }
        Operation::CompleteElapsed { as_of } => {
            let ids = engine
                .complete_elapsed_bookings(as_of.unwrap_or_else(today))
                .await?;
            render(json!({ "completed": ids }))
        }
        Operation::Report { from, to } => render(engine.booking_summary(from, to).await?),
        Operation::Compact => {
            engine.compact_wal().await?;
            render(json!({ "compacted": true }))
        }
    }
}
