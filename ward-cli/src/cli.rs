use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wardctl", version)]
#[command(about = "Inspect device/patient reconciliation, alerts and cached predictions")]
pub struct Cli {
    /// Device directory document (`{ deviceId: device }`)
    #[arg(long, env = "WARDCTL_DEVICES", default_value = "devices.json", global = true)]
    pub devices: PathBuf,

    /// Patient directory document (`{ patientId: patient }`)
    #[arg(long, env = "WARDCTL_PATIENTS", default_value = "patients.json", global = true)]
    pub patients: PathBuf,

    /// Latest live reading per device (`{ deviceId: reading }`)
    #[arg(long, global = true)]
    pub live: Option<PathBuf>,

    /// Engine configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show which device serves a patient and why
    Resolve { patient_id: String },

    /// Show a patient's current vitals
    Vitals {
        patient_id: String,
        /// Also list the stored history on the resolved device
        #[arg(long)]
        history: bool,
    },

    /// List unresolved alerts, newest first
    Alerts(AlertFilter),

    /// Latest room conditions from environmental sensors
    Environment { room_id: String },

    /// Inspect or maintain the local prediction cache
    #[command(subcommand)]
    Prediction(PredictionCommand),
}

#[derive(Args, Debug, Default)]
pub struct AlertFilter {
    /// Only critical alerts
    #[arg(long, conflicts_with = "warning")]
    pub critical: bool,

    /// Only warnings
    #[arg(long)]
    pub warning: bool,
}

#[derive(Subcommand, Debug)]
pub enum PredictionCommand {
    /// Show cached entries (all, or one patient)
    Show { patient_id: Option<String> },

    /// Drop one patient's entry, or every stale entry when no id is given
    Evict { patient_id: Option<String> },

    /// Request a fresh assessment from the backend and cache it
    Assess { patient_id: String },
}
