//! `proof`: operaciones de prueba de existencia desde la terminal.
//!
//! El store y el proveedor TSA salen de la configuración (`PROOF_STORE`,
//! `PROOF_DIR`, `TSA_PROVIDER`, `TSA_CA_FILE`, `OPENSSL_BIN`, `DATABASE_URL`).

mod args;
mod commands;
mod error;

use std::process::ExitCode;

use args::Flags;
use error::CliError;
use proofchain_rust::config::AppConfig;

fn run(argv: &[String]) -> Result<String, CliError> {
    let Some(command) = argv.first() else {
        return Err(CliError::Usage(commands::USAGE.into()));
    };
    if command == "help" || command == "--help" || command == "-h" {
        return Ok(commands::USAGE.into());
    }
    let flags = Flags::parse(&argv[1..])?;
    let cfg = AppConfig::from_env()?;
    proofchain_rust::startup::run(&cfg);
    commands::dispatch(command, &flags, &cfg)
}

fn main() -> ExitCode {
    // Cargar .env si existe (DATABASE_URL, PROOF_*)
    let _ = dotenvy::dotenv();
    proofchain_rust::init_logging();
    let argv: Vec<String> = std::env::args().skip(1).collect();
    match run(&argv) {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("[proof] {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
