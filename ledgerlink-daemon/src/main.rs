//! LedgerLink sync daemon
//!
//! Usage:
//!   ledgerlink keygen --token <TOKEN>
//!   ledgerlink show
//!   ledgerlink link --target <ID> --public-key <KEY>
//!   ledgerlink run

use anyhow::Result;
use clap::Parser;
use ledgerlink_daemon::{Args, Command, Session};
use ledgerlink_sync::Identity;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    // RUST_LOG wins over --verbose when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    match &args.command {
        Command::Keygen { token, force } => {
            let identity = ledgerlink_daemon::keygen(&args.identity, token, *force)?;
            print_identity(&identity);
        }
        Command::Show => {
            let identity = Identity::load(&args.identity)?;
            print_identity(&identity);
        }
        Command::Link { target, public_key } => {
            let session = Session::open(&args)?;
            ledgerlink_daemon::link(&session, *target, public_key).await?;
            println!("Handshake sent to {target}. Run `ledgerlink run` to finish linking.");
        }
        Command::Status => {
            let session = Session::open(&args)?;
            let (state, linked) = ledgerlink_daemon::status(&session)?;
            println!("State: {state:?}");
            for id in linked {
                println!("  linked: {id}");
            }
        }
        Command::Sync => {
            let session = Session::open(&args)?;
            let report = ledgerlink_daemon::sync_once(&session).await;
            println!("{report:#?}");
            if !report.errors.is_empty() {
                anyhow::bail!("sync finished with {} error(s)", report.errors.len());
            }
        }
        Command::Run => {
            let session = Session::open(&args)?;
            info!(
                relay = %session.config.relay_url,
                interval = ?session.config.sync_interval(),
                "LedgerLink sync starting"
            );
            ledgerlink_daemon::run(&session, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("failed to listen for ctrl-c: {e}");
                    std::future::pending::<()>().await;
                }
            })
            .await;
        }
        Command::Verify => {
            let session = Session::open(&args)?;
            let drift = ledgerlink_daemon::verify(&session)?;
            if drift.is_empty() {
                println!("All balances match their lines.");
            } else {
                for d in &drift {
                    println!("  {}: cached {} actual {}", d.account_id, d.cached, d.actual);
                }
                anyhow::bail!("{} account(s) out of balance", drift.len());
            }
        }
    }
    Ok(())
}

fn print_identity(identity: &Identity) {
    println!("Installation: {}", identity.installation_id());
    println!("Public key:   {}", identity.public_key());
}
