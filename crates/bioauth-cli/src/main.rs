//! Bioauth CLI - terminal front-end for the biometric preference toggle
//!
//! Reads and flips the stored biometric preference and, when it is enabled,
//! runs an authentication through the configured subsystem.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use bioauth_core::auth::{DetachedPrompt, PromptRegistration, ScriptedResponse, SignalCallback};
use bioauth_core::store::PREFERENCES_FILE_NAME;
use bioauth_core::{
    default_data_dir, get_store, AuthOutcome, Availability, BiometricBridge, BiometricSubsystem,
    BiometricToggle, CommandSpec, NativeSignal, PlatformContext, PreferenceStore,
    ProcessSubsystem, PromptRequest, ScriptedSubsystem, SettingsManager, ToggleState,
    UiThreadHost,
};

/// Bioauth - biometric preference toggle
#[derive(Parser, Debug)]
#[command(name = "bioauth")]
#[command(version)]
#[command(about = "Toggle and exercise biometric authentication")]
struct Args {
    /// Directory holding preferences and settings
    #[arg(long, env = "BIOAUTH_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the stored biometric preference
    Status,
    /// Enable biometric authentication
    Enable,
    /// Disable biometric authentication
    Disable,
    /// Authenticate if the preference is enabled
    Authenticate {
        /// Use an in-process simulated subsystem instead of the configured one
        #[arg(long, value_enum)]
        simulate: Option<Simulation>,

        /// Trigger the prompt from a dedicated UI thread
        #[arg(long)]
        ui_thread: bool,
    },
    /// Configure the external-command subsystem and prompt text
    Configure {
        /// Capability probe command line (whitespace separated)
        #[arg(long)]
        probe_command: Option<String>,

        /// Prompt command line (whitespace separated)
        #[arg(long)]
        prompt_command: Option<String>,

        /// Prompt title
        #[arg(long)]
        title: Option<String>,

        /// Prompt subtitle
        #[arg(long)]
        subtitle: Option<String>,
    },
}

/// Simulated native behavior
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Simulation {
    Success,
    Reject,
    Cancel,
    Error,
    Unavailable,
    DoubleFire,
}

impl Simulation {
    fn subsystem(self) -> ScriptedSubsystem {
        match self {
            Simulation::Success => ScriptedSubsystem::with_signals(vec![NativeSignal::Succeeded]),
            Simulation::Reject => ScriptedSubsystem::with_signals(vec![NativeSignal::Failed]),
            Simulation::Cancel => ScriptedSubsystem::with_signals(vec![NativeSignal::Cancelled]),
            Simulation::Error => ScriptedSubsystem::with_signals(vec![NativeSignal::Error {
                code: 7,
                message: "Too many attempts. Try again later.".to_string(),
            }]),
            Simulation::Unavailable => {
                ScriptedSubsystem::unavailable("No biometric credential enrolled")
            }
            Simulation::DoubleFire => ScriptedSubsystem::new(
                Availability::Available,
                ScriptedResponse::Immediate(vec![NativeSignal::Succeeded, NativeSignal::Failed]),
            ),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    state: ToggleState,
    stored_value: Option<String>,
    store: PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthReport {
    state: ToggleState,
    outcome: Option<AuthOutcome>,
}

/// Subsystem used when no prompt command is configured
struct Unconfigured;

impl BiometricSubsystem for Unconfigured {
    fn can_authenticate(&self) -> Availability {
        Availability::Unavailable("No biometric subsystem configured".to_string())
    }

    fn present_prompt(
        &self,
        _request: &PromptRequest,
        _on_result: SignalCallback,
    ) -> Box<dyn PromptRegistration> {
        Box::new(DetachedPrompt)
    }

    fn backend_name(&self) -> &'static str {
        "Unconfigured"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let data_dir = match args.data_dir.clone() {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    debug!("Using data directory {:?}", data_dir);

    let mut settings = SettingsManager::new(&data_dir);

    if let Command::Configure {
        probe_command,
        prompt_command,
        title,
        subtitle,
    } = &args.command
    {
        let current = settings.get_mut();
        if let Some(line) = probe_command {
            current.subsystem.probe_command = Some(CommandSpec::parse(line)?);
        }
        if let Some(line) = prompt_command {
            current.subsystem.prompt_command = Some(CommandSpec::parse(line)?);
        }
        if let Some(title) = title {
            current.prompt.title = title.clone();
        }
        if let Some(subtitle) = subtitle {
            current.prompt.subtitle = subtitle.clone();
        }
        settings.save().await?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(settings.get())?);
        } else {
            println!("Settings saved to {}", settings.path().display());
        }
        return Ok(());
    }

    let store = get_store(|| data_dir.join(PREFERENCES_FILE_NAME))
        .map_err(|e| format!("Failed to open preferences: {}", e))?;

    let subsystem: Arc<dyn BiometricSubsystem> = match &args.command {
        Command::Authenticate {
            simulate: Some(simulation),
            ..
        } => Arc::new(simulation.subsystem()),
        Command::Authenticate { .. } => match settings.get().subsystem.prompt_command.clone() {
            Some(prompt) => {
                // The probe runs here; keep it off the runtime threads
                let probe = settings.get().subsystem.probe_command.clone();
                let subsystem =
                    tokio::task::spawn_blocking(move || ProcessSubsystem::new(probe, prompt))
                        .await?;
                Arc::new(subsystem)
            }
            None => Arc::new(Unconfigured),
        },
        // Only authentication needs the configured subsystem
        _ => Arc::new(Unconfigured),
    };
    let bridge = BiometricBridge::new(subsystem).with_request(settings.get().prompt.clone());
    info!("Using {} biometric subsystem", bridge.backend_name());

    let toggle = BiometricToggle::new(store.clone(), Arc::new(bridge));

    match args.command {
        Command::Status => {
            if args.json {
                let report = StatusReport {
                    state: toggle.state(),
                    stored_value: toggle.stored_value(),
                    store: store.location().to_path_buf(),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                // Absent values print as an empty string
                println!(
                    "Biometric preference is: {}",
                    toggle.stored_value().unwrap_or_default()
                );
            }
        }
        Command::Enable | Command::Disable => {
            let enabled = matches!(args.command, Command::Enable);
            let state = toggle.set_enabled(enabled).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                println!("Biometric preference is: {}", state);
            }
        }
        Command::Authenticate { ui_thread, .. } => {
            let context = if ui_thread {
                PlatformContext::UiThread(Arc::new(UiThreadHost::spawn("bioauth-ui")?))
            } else {
                PlatformContext::FreeThreaded
            };

            let outcome = toggle.authenticate(&context).await;
            if args.json {
                let report = AuthReport {
                    state: toggle.state(),
                    outcome,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_outcome(outcome.as_ref());
            }
        }
        Command::Configure { .. } => {}
    }

    Ok(())
}

fn print_outcome(outcome: Option<&AuthOutcome>) {
    match outcome {
        None => println!("Biometric authentication is disabled. Run `bioauth enable` first."),
        Some(AuthOutcome::Authenticated) => println!("Authenticated successfully!"),
        Some(AuthOutcome::Unavailable(reason)) => {
            println!("Your device does not support biometric authentication ({}).", reason)
        }
        Some(AuthOutcome::Rejected) => println!("Authentication failed: not recognized"),
        Some(AuthOutcome::Error(message)) => println!("Authentication failed: {}", message),
    }
}
