use clap::{Parser, Subcommand};

/// integration-guard: protection layer for partner webhooks, OAuth and API calls
#[derive(Parser)]
#[command(name = "integration-guard", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind
        #[arg(short, long, env = "GUARD_PORT")]
        port: Option<u16>,
    },

    /// Print a fresh 64-hex-char ENCRYPTION_KEY
    GenKey,

    /// Encrypt a value with ENCRYPTION_KEY
    Encrypt {
        value: String,
    },

    /// Decrypt a stored value (legacy plaintext passes through)
    Decrypt {
        value: String,
    },

    /// Backfill: read stored values from stdin, one per line, and print
    /// the encrypted form (already-encrypted lines are printed unchanged)
    Migrate,
}
