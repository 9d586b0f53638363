use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "tripwire", version, about = "Quote ingestion and price-anomaly triggers")]
pub struct Cli {
    /// Trigger profile; overrides TRIGGER_PROFILE
    #[clap(long, global = true)]
    pub profile: Option<String>,

    /// Keep quotes and signals in memory instead of DATABASE_URL
    #[clap(long, global = true)]
    pub memory: bool,

    /// Print machine-readable JSON instead of text
    #[clap(long, global = true)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run trigger cycles every CYCLE_INTERVAL_SECS until Ctrl-C
    Run,

    /// Run a single trigger cycle and print its report
    Cycle,

    /// Fetch one quote, with fallback or from a forced source
    Fetch {
        symbol: String,

        /// Bypass health and priority and use only this source
        #[clap(long)]
        source: Option<String>,

        /// Also append the quote to the store
        #[clap(long)]
        store: bool,
    },

    /// Evaluate the stored window of one instrument
    Evaluate { symbol: String },

    /// List the named trigger profiles
    Profiles,

    /// Probe every quote source and show its priority and health
    Sources,
}
