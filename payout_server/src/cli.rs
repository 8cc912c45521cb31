use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
        std::process::exit(0);
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // VPS_RAIL_API_KEY is deliberately absent
    const DISPLAY_ENVS: [&str; 18] = [
        "RUST_LOG",
        "VPS_HOST",
        "VPS_PORT",
        "VPS_DATABASE_URL",
        "VPS_HOLDING_PERIOD_DAYS",
        "VPS_SETTLEMENT_INTERVAL_SECS",
        "VPS_RUN_SETTLEMENT_ON_STARTUP",
        "VPS_PROCESSING_FEE_RATE",
        "VPS_PROCESSING_FEE_FIXED",
        "VPS_TRANSFER_FEE",
        "VPS_CURRENCY",
        "VPS_RAIL_MODE",
        "VPS_RAIL_API_URL",
        "VPS_RAIL_TIMEOUT_SECS",
        "VPS_STUCK_PAYOUT_MINUTES",
        "VPS_LOW_BALANCE_THRESHOLD",
        "VPS_SIMULATED_RAIL_BALANCE",
        "VPS_ALERT_WEBHOOK_URL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
