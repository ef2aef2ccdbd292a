//! CLI command definitions for the `pchat` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod config;
pub mod roster;

use clap::{Args, Parser, Subcommand};
use peerchat_types::filter::GenderFilter;

/// Chat with a roster of simulated peers.
#[derive(Parser)]
#[command(name = "pchat", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use a VIP account (reactions, replies, translation, read receipts).
    #[arg(long, global = true, env = "PEERCHAT_VIP")]
    pub vip: bool,

    /// Skip country detection and use the default roster order.
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the visible roster.
    #[command(alias = "ls")]
    Roster(RosterArgs),

    /// Start an interactive chat session.
    Chat {
        /// Persona id or name to open first.
        persona: Option<String>,

        /// Your nickname; conversations are stored per nickname.
        #[arg(short, long, default_value = "guest")]
        nickname: String,

        /// Keep the session in memory only.
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show the effective configuration and data directory.
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct RosterArgs {
    /// Case-insensitive name search.
    #[arg(short, long)]
    pub search: Option<String>,

    /// Gender filter: any, male, female.
    #[arg(short, long, default_value_t = GenderFilter::Any)]
    pub gender: GenderFilter,

    /// Minimum age (inclusive).
    #[arg(long, default_value_t = 18)]
    pub min_age: u8,

    /// Maximum age (inclusive).
    #[arg(long, default_value_t = 99)]
    pub max_age: u8,

    /// Country code or name; repeat for several.
    #[arg(short, long = "country")]
    pub countries: Vec<String>,
}
